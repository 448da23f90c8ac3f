//! Backend endpoint table and front-end routes
//!
//! Defaults match the e-learning backend's REST layout. All paths are
//! relative to the backend base URL (which already ends in `/api`).

use serde::Deserialize;

/// Backend base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Exchanges email + password for a credential pair.
pub const SIGN_IN_PATH: &str = "/users/login";

/// Creates an account. Never carries credentials worth renewing.
pub const SIGN_UP_PATH: &str = "/users/register";

/// Exchanges a renewal token for a fresh credential pair.
pub const RENEWAL_PATH: &str = "/auth/refresh";

/// Ends the backend session.
pub const SIGN_OUT_PATH: &str = "/users/logout";

/// Front-end route of the re-authentication entry point.
pub const SIGN_IN_ROUTE: &str = "/login";

/// Authentication endpoints of the backend.
///
/// Sign-in, sign-up and renewal are excluded from expiry recovery: a 401
/// from any of them is final.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub sign_in: String,
    pub sign_up: String,
    pub renewal: String,
    pub sign_out: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            sign_in: SIGN_IN_PATH.to_string(),
            sign_up: SIGN_UP_PATH.to_string(),
            renewal: RENEWAL_PATH.to_string(),
            sign_out: SIGN_OUT_PATH.to_string(),
        }
    }
}

impl Endpoints {
    /// Whether `route` (a path without query string) is one of the endpoints
    /// that must never trigger a renewal.
    pub fn is_excluded(&self, route: &str) -> bool {
        let route = normalize(route);
        [&self.sign_in, &self.sign_up, &self.renewal]
            .iter()
            .any(|endpoint| normalize(endpoint) == route)
    }

    /// All configured paths, for validation.
    pub fn paths(&self) -> [(&'static str, &str); 4] {
        [
            ("sign_in", &self.sign_in),
            ("sign_up", &self.sign_up),
            ("renewal", &self.renewal),
            ("sign_out", &self.sign_out),
        ]
    }
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_routes() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.sign_in, "/users/login");
        assert_eq!(endpoints.sign_up, "/users/register");
        assert_eq!(endpoints.renewal, "/auth/refresh");
        assert_eq!(endpoints.sign_out, "/users/logout");
    }

    #[test]
    fn auth_endpoints_are_excluded() {
        let endpoints = Endpoints::default();
        assert!(endpoints.is_excluded("/users/login"));
        assert!(endpoints.is_excluded("/users/register"));
        assert!(endpoints.is_excluded("/auth/refresh"));
        assert!(endpoints.is_excluded("/auth/refresh/"));
    }

    #[test]
    fn domain_endpoints_are_not_excluded() {
        let endpoints = Endpoints::default();
        assert!(!endpoints.is_excluded("/courses/1"));
        assert!(!endpoints.is_excluded("/users/me"));
        assert!(!endpoints.is_excluded("/users/logout"));
        assert!(!endpoints.is_excluded("/users/login/extra"));
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let endpoints: Endpoints = serde_json::from_str(r#"{"renewal":"/api/v2/refresh"}"#).unwrap();
        assert_eq!(endpoints.renewal, "/api/v2/refresh");
        assert_eq!(endpoints.sign_in, SIGN_IN_PATH);
        assert!(endpoints.is_excluded("/api/v2/refresh"));
        assert!(!endpoints.is_excluded("/auth/refresh"));
    }
}
