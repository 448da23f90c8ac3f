//! Session endpoints and expiry notifications
//!
//! Endpoints:
//! - GET  /session         signed-in flag, refresh state, last session event
//! - POST /session/login   sign in with email + password, store the pair
//! - POST /session/logout  best-effort backend sign-out, then clear the pair
//!
//! Tokens never leave the proxy: none of these responses carry them.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use serde::Deserialize;
use session_refresh::{AuthenticatedClient, SessionEvent};
use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::error::{Error, Result, json_response, request_id};

/// Shared state for the session handlers.
#[derive(Clone)]
pub struct SessionState {
    client: AuthenticatedClient,
    last_event: Arc<RwLock<Option<SessionEvent>>>,
}

impl SessionState {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self {
            client,
            last_event: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn is_signed_in(&self) -> bool {
        self.client.coordinator().store().is_signed_in().await
    }

    /// Follow session events for the lifetime of the process.
    ///
    /// Expiry is logged at warn with the sign-in route the front end should
    /// send the user to. The latest event is kept for `GET /session`.
    pub fn spawn_event_watcher(&self) -> tokio::task::JoinHandle<()> {
        let mut events = self.client.coordinator().subscribe();
        let sign_in_route = self.client.coordinator().sign_in_route().to_string();
        let last_event = self.last_event.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        match &event {
                            SessionEvent::Expired { reason } => {
                                warn!(reason = %reason, sign_in = %sign_in_route, "session expired, sign-in required");
                            }
                            SessionEvent::Renewed => info!("session renewed"),
                        }
                        *last_event.write().await = Some(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session event watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Routes under `/session`.
pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/session", get(session_status))
        .route("/session/login", post(login))
        .route("/session/logout", post(logout))
        .with_state(state)
}

fn event_json(event: &Option<SessionEvent>) -> serde_json::Value {
    match event {
        None => serde_json::Value::Null,
        Some(SessionEvent::Renewed) => serde_json::json!({ "type": "renewed" }),
        Some(SessionEvent::Expired { reason }) => {
            serde_json::json!({ "type": "expired", "reason": reason })
        }
    }
}

/// GET /session
async fn session_status(State(state): State<SessionState>) -> Response {
    let coordinator = state.client.coordinator();
    let last_event = state.last_event.read().await.clone();

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "signed_in": state.is_signed_in().await,
            "refresh_state": coordinator.state().await.label(),
            "queued": coordinator.queued().await.len(),
            "renewals": coordinator.renewals(),
            "last_event": event_json(&last_event),
            "sign_in_route": coordinator.sign_in_route(),
        }),
    )
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// POST /session/login
async fn login(
    State(state): State<SessionState>,
    axum::Json(body): axum::Json<LoginRequest>,
) -> Response {
    let request_id = request_id();
    match sign_in(&state, &body.email, &body.password).await {
        Ok(profile) => json_response(StatusCode::OK, profile),
        Err(e) => {
            warn!(request_id, error = %e, "sign-in failed");
            e.into_error_response(&request_id)
        }
    }
}

async fn sign_in(state: &SessionState, email: &str, password: &str) -> Result<serde_json::Value> {
    let coordinator = state.client.coordinator();
    let auth = session_auth::sign_in(
        coordinator.transport().as_ref(),
        coordinator.endpoints(),
        email,
        password,
    )
    .await?;

    let profile = serde_json::json!({
        "signed_in": true,
        "user": {
            "user_id": auth.user_id,
            "email": auth.email,
            "first_name": auth.first_name,
            "last_name": auth.last_name,
            "role": auth.role,
        },
        "expires_in_ms": auth.expires_in,
    });
    coordinator.store().set(auth.into()).await?;
    *state.last_event.write().await = None;
    info!(email, "signed in");
    Ok(profile)
}

/// POST /session/logout
async fn logout(State(state): State<SessionState>) -> Response {
    let request_id = request_id();
    let coordinator = state.client.coordinator();

    if let Some(access_token) = coordinator.store().access_token().await
        && let Err(e) = session_auth::sign_out(
            coordinator.transport().as_ref(),
            coordinator.endpoints(),
            &access_token,
        )
        .await
    {
        warn!(request_id, error = %e, "backend sign-out failed, clearing local session anyway");
    }

    match coordinator.store().clear().await {
        Ok(()) => {
            info!("signed out");
            json_response(StatusCode::OK, serde_json::json!({ "signed_in": false }))
        }
        Err(e) => Error::from(e).into_error_response(&request_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_shapes() {
        assert!(event_json(&None).is_null());
        assert_eq!(event_json(&Some(SessionEvent::Renewed))["type"], "renewed");
        let expired = event_json(&Some(SessionEvent::Expired {
            reason: "renewal token rejected".into(),
        }));
        assert_eq!(expired["type"], "expired");
        assert_eq!(expired["reason"], "renewal token rejected");
    }
}
