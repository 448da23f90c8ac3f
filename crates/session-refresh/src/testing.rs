//! Scripted backend shared by the unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use tokio::sync::Semaphore;
use transport::{RequestDescriptor, Response, SendFuture, Transport};

/// In-process stand-in for the e-learning backend.
///
/// Accepts exactly one access token at a time (initially `at_old`). Domain
/// routes answer 200 with `{"path": ..}` for that token and 401 otherwise;
/// routes under `/missing` answer 404. The renewal endpoint can be gated so
/// tests decide when it settles.
pub(crate) struct FakeBackend {
    valid_token: Mutex<String>,
    next_access: String,
    renewal_ok: bool,
    accept_renewed: bool,
    gate: Option<Semaphore>,
    renewal_calls: AtomicUsize,
    renewal_tokens: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeBackend {
    fn build(next_access: &str, renewal_ok: bool, gated: bool) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            valid_token: Mutex::new("at_old".into()),
            next_access: next_access.into(),
            renewal_ok,
            accept_renewed: true,
            gate: gated.then(|| Semaphore::new(0)),
            renewal_calls: AtomicUsize::new(0),
            renewal_tokens: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn new(next_access: &str) -> std::sync::Arc<Self> {
        Self::build(next_access, true, false)
    }

    /// Renewal succeeds only after `release_renewal`.
    pub fn gated(next_access: &str) -> std::sync::Arc<Self> {
        Self::build(next_access, true, true)
    }

    /// Renewal answers 401, as for a revoked renewal token.
    pub fn rejecting_renewal() -> std::sync::Arc<Self> {
        Self::build("unused", false, false)
    }

    pub fn gated_rejecting() -> std::sync::Arc<Self> {
        Self::build("unused", false, true)
    }

    /// Renewal succeeds but the issued token is still refused.
    pub fn refusing_renewed_token(next_access: &str) -> std::sync::Arc<Self> {
        let mut backend = Self::build(next_access, true, false);
        if let Some(inner) = std::sync::Arc::get_mut(&mut backend) {
            inner.accept_renewed = false;
        }
        backend
    }

    /// Stop accepting the current token, as if it had just expired.
    pub fn expire_current_token(&self) {
        *self.valid_token.lock().unwrap() = "at_expired".into();
    }

    pub fn release_renewal(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn renewal_calls(&self) -> usize {
        self.renewal_calls.load(Ordering::SeqCst)
    }

    pub fn renewal_tokens(&self) -> Vec<String> {
        self.renewal_tokens.lock().unwrap().clone()
    }

    /// Every non-renewal request as ("METHOD /path", bearer token).
    pub fn sent(&self) -> Vec<(String, Option<String>)> {
        self.sent.lock().unwrap().clone()
    }

    async fn handle_renewal(&self, request: &RequestDescriptor) -> Response {
        self.renewal_calls.fetch_add(1, Ordering::SeqCst);
        let body: serde_json::Value =
            serde_json::from_slice(request.body.as_deref().unwrap_or_default()).unwrap_or_default();
        if let Some(token) = body["refreshToken"].as_str() {
            self.renewal_tokens.lock().unwrap().push(token.to_string());
        }

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if !self.renewal_ok {
            return Response::new(StatusCode::UNAUTHORIZED, "");
        }
        if self.accept_renewed {
            *self.valid_token.lock().unwrap() = self.next_access.clone();
        }
        let body = serde_json::json!({
            "accessToken": self.next_access,
            "refreshToken": "rt_new",
            "tokenType": "Bearer",
            "expiresIn": 900000
        });
        Response::new(StatusCode::OK, body.to_string())
    }

    fn handle_domain(&self, request: &RequestDescriptor) -> Response {
        let bearer = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
        self.sent
            .lock()
            .unwrap()
            .push((request.describe(), bearer.clone()));

        let valid = self.valid_token.lock().unwrap().clone();
        if bearer.as_deref() != Some(valid.as_str()) {
            return Response::new(StatusCode::UNAUTHORIZED, "");
        }
        if request.route().starts_with("/missing") {
            let body = serde_json::json!({"status": 404, "message": "Course not found"});
            return Response::new(StatusCode::NOT_FOUND, body.to_string());
        }
        let body = serde_json::json!({"path": request.path});
        Response::new(StatusCode::OK, body.to_string())
    }
}

impl Transport for FakeBackend {
    fn send<'a>(&'a self, request: &'a RequestDescriptor) -> SendFuture<'a> {
        Box::pin(async move {
            if request.route() == session_auth::RENEWAL_PATH {
                Ok(self.handle_renewal(request).await)
            } else {
                Ok(self.handle_domain(request))
            }
        })
    }
}
