//! Authenticated send: decorate, send, classify, renew, replay

use std::sync::Arc;

use tracing::debug;
use transport::{RequestDescriptor, Response, Transport};

use crate::classify::{Classification, classify, is_expiry_signal};
use crate::coordinator::RefreshCoordinator;
use crate::decorate::decorate;
use crate::error::{Error, Result};
use crate::replay::replay;

/// Drop-in replacement for an unauthenticated send.
///
/// Callers get the response they asked for, including ordinary 4xx/5xx
/// failures, or `Error::SessionExpired` once the session cannot be
/// recovered. Renewals are invisible to them.
#[derive(Clone)]
pub struct AuthenticatedClient {
    coordinator: RefreshCoordinator,
}

impl AuthenticatedClient {
    pub fn new(coordinator: RefreshCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    fn transport(&self) -> &Arc<dyn Transport> {
        self.coordinator.transport()
    }

    pub async fn send(&self, request: RequestDescriptor) -> Result<Response> {
        let credentials = self.coordinator.store().get().await;
        let mut request = decorate(request, credentials.as_ref())?;

        let outcome = self.transport().send(&request).await;
        match classify(&outcome, &request, self.coordinator.endpoints()) {
            Classification::NotRecoverable => self.finish(outcome, &request),
            Classification::Recoverable => {
                debug!(request = %request.describe(), "access token rejected");
                let access_token = self.coordinator.request_access(&mut request).await?;
                replay(self.transport().as_ref(), &request, &access_token).await
            }
        }
    }

    /// Hand back an outcome that will not be recovered.
    ///
    /// An expiry signal on a request that already used its replay is a
    /// terminal session failure. On an auth endpoint it is just the
    /// backend's answer.
    fn finish(
        &self,
        outcome: transport::Result<Response>,
        request: &RequestDescriptor,
    ) -> Result<Response> {
        if is_expiry_signal(&outcome)
            && request.is_retried()
            && !self.coordinator.endpoints().is_excluded(request.route())
        {
            return Err(Error::SessionExpired(
                "request already replayed once".into(),
            ));
        }
        Ok(outcome?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;
    use session_auth::{CredentialStore, Credentials, Endpoints};

    use super::*;
    use crate::coordinator::{RefreshOptions, RefreshState, SessionEvent};
    use crate::testing::FakeBackend;

    async fn client(backend: &Arc<FakeBackend>) -> (AuthenticatedClient, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::in_memory());
        store
            .set(Credentials::new("at_old", "rt_old"))
            .await
            .unwrap();
        let coordinator = RefreshCoordinator::new(
            backend.clone(),
            store.clone(),
            Endpoints::default(),
            RefreshOptions::default(),
        );
        (AuthenticatedClient::new(coordinator), store)
    }

    fn body(response: &Response) -> serde_json::Value {
        response.json().unwrap()
    }

    async fn wait_for_queue(client: &AuthenticatedClient, len: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.coordinator().queued().await.len() < len {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("queue never reached expected length");
    }

    fn three_requests() -> Vec<RequestDescriptor> {
        vec![
            RequestDescriptor::get("/courses/1"),
            RequestDescriptor::get("/users/me"),
            RequestDescriptor::post("/enrollments")
                .with_json(&serde_json::json!({"courseId": 1}))
                .unwrap(),
        ]
    }

    #[tokio::test]
    async fn valid_token_passes_straight_through() {
        let backend = FakeBackend::new("at_new");
        let (client, _store) = client(&backend).await;

        let response = client.send(RequestDescriptor::get("/courses/1")).await;
        let response = response.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(body(&response)["path"], "/courses/1");
        assert_eq!(backend.renewal_calls(), 0);
        assert_eq!(
            backend.sent(),
            vec![("GET /courses/1".to_string(), Some("at_old".to_string()))]
        );
    }

    #[tokio::test]
    async fn concurrent_expiry_renews_once_and_replays_all() {
        let backend = FakeBackend::gated("at_new");
        let (client, store) = client(&backend).await;
        let mut events = client.coordinator().subscribe();

        // Backend already refuses the stored token.
        backend.expire_current_token();

        let mut handles = Vec::new();
        for request in three_requests() {
            let client = client.clone();
            handles.push(tokio::spawn(async move { client.send(request).await }));
        }
        wait_for_queue(&client, 3).await;
        assert_eq!(client.coordinator().state().await, RefreshState::Refreshing);

        backend.release_renewal();
        let mut paths = Vec::new();
        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.status, StatusCode::OK);
            paths.push(body(&response)["path"].as_str().unwrap().to_string());
        }
        paths.sort();
        assert_eq!(paths, vec!["/courses/1", "/enrollments", "/users/me"]);

        assert_eq!(backend.renewal_calls(), 1);
        assert_eq!(client.coordinator().renewals(), 1);
        assert_eq!(store.get().await, Some(Credentials::new("at_new", "rt_new")));
        let replayed: Vec<_> = backend
            .sent()
            .into_iter()
            .filter(|(_, token)| token.as_deref() == Some("at_new"))
            .collect();
        assert_eq!(replayed.len(), 3);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Renewed);
    }

    #[tokio::test]
    async fn failed_renewal_expires_every_waiter_once() {
        let backend = FakeBackend::gated_rejecting();
        let (client, store) = client(&backend).await;
        let mut events = client.coordinator().subscribe();
        backend.expire_current_token();

        let mut handles = Vec::new();
        for request in three_requests() {
            let client = client.clone();
            handles.push(tokio::spawn(async move { client.send(request).await }));
        }
        wait_for_queue(&client, 3).await;
        backend.release_renewal();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(err.is_session_expired(), "got {err:?}");
        }
        assert_eq!(backend.renewal_calls(), 1);
        assert!(store.get().await.is_none());
        assert!(matches!(events.try_recv(), Ok(SessionEvent::Expired { .. })));
        assert!(events.try_recv().is_err(), "exactly one expiry notification");
    }

    #[tokio::test]
    async fn replayed_request_never_renews_twice() {
        let backend = FakeBackend::refusing_renewed_token("at_new");
        let (client, store) = client(&backend).await;
        let mut events = client.coordinator().subscribe();
        backend.expire_current_token();

        let err = client
            .send(RequestDescriptor::get("/users/me"))
            .await
            .unwrap_err();

        assert!(err.is_session_expired());
        assert_eq!(backend.renewal_calls(), 1);
        assert_eq!(
            store.get().await,
            Some(Credentials::new("at_new", "rt_new")),
            "a rejected replay does not clear the store"
        );
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Renewed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn pre_marked_request_is_terminal() {
        let backend = FakeBackend::new("at_new");
        let (client, _store) = client(&backend).await;
        backend.expire_current_token();

        let mut request = RequestDescriptor::get("/courses/1");
        request.mark_retried();
        let err = client.send(request).await.unwrap_err();

        assert!(err.is_session_expired());
        assert_eq!(backend.renewal_calls(), 0);
    }

    #[tokio::test]
    async fn excluded_endpoints_return_401_unchanged() {
        let backend = FakeBackend::new("at_new");
        let (client, store) = client(&backend).await;
        backend.expire_current_token();

        for request in [
            RequestDescriptor::post("/users/login"),
            RequestDescriptor::post("/users/register"),
        ] {
            let response = client.send(request).await.unwrap();
            assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        }
        assert_eq!(backend.renewal_calls(), 0);
        assert!(store.is_signed_in().await);
    }

    #[tokio::test]
    async fn ordinary_failure_is_returned() {
        let backend = FakeBackend::new("at_new");
        let (client, _store) = client(&backend).await;

        let response = client
            .send(RequestDescriptor::get("/missing/42"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(backend.renewal_calls(), 0);
    }

    #[tokio::test]
    async fn late_expiry_reuses_finished_renewal() {
        let backend = FakeBackend::new("at_new");
        let (client, store) = client(&backend).await;
        backend.expire_current_token();

        client.send(RequestDescriptor::get("/courses/1")).await.unwrap();
        assert_eq!(backend.renewal_calls(), 1);

        // A request decorated before the renewal finished reports its 401 late.
        let mut late = decorate(
            RequestDescriptor::get("/users/me"),
            Some(&Credentials::new("at_old", "rt_old")),
        )
        .unwrap();
        let token = client.coordinator().request_access(&mut late).await.unwrap();
        assert_eq!(token, "at_new");
        assert_eq!(backend.renewal_calls(), 1);
        assert_eq!(store.access_token().await.as_deref(), Some("at_new"));
    }

    #[tokio::test]
    async fn signed_out_request_expires_session() {
        let backend = FakeBackend::new("at_new");
        let (client, store) = client(&backend).await;
        store.clear().await.unwrap();

        let err = client
            .send(RequestDescriptor::get("/users/me"))
            .await
            .unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(backend.renewal_calls(), 0);
        assert_eq!(backend.sent()[0].1, None, "sent without a bearer token");
    }
}
