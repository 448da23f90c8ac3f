//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The sign-in password is loaded from the SESSION_PASSWORD env var or
//! `session.password_file`, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use session_auth::{DEFAULT_BASE_URL, Endpoints, SIGN_IN_ROUTE};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// E-learning backend location
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Session handling
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Where the token pair is persisted. Without it the session lives in
    /// memory only.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub renewal_timeout_secs: u64,
    #[serde(default = "default_sign_in_route")]
    pub sign_in_route: String,
    /// Account to sign in with at startup.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            renewal_timeout_secs: default_timeout(),
            sign_in_route: default_sign_in_route(),
            email: None,
            password_file: None,
            password: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_sign_in_route() -> String {
    SIGN_IN_ROUTE.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. SESSION_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(password) = std::env::var("SESSION_PASSWORD") {
            config.session.password = Secret::from_trimmed(&password);
        } else if let Some(ref password_file) = config.session.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            config.session.password = Secret::from_trimmed(&password);
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.backend.base_url
            )));
        }

        if self.backend.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.session.renewal_timeout_secs == 0 {
            return Err(common::Error::Config(
                "renewal_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if !self.session.sign_in_route.starts_with('/') {
            return Err(common::Error::Config(format!(
                "sign_in_route must start with /, got: {}",
                self.session.sign_in_route
            )));
        }

        for (name, path) in self.endpoints.paths() {
            if !path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "endpoints.{name} must start with /, got: {path}"
                )));
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("elearning-session-proxy.toml")
    }
}
