//! Single-flight session renewal
//!
//! The coordinator is a two-state machine (Idle, Refreshing) guarding the
//! renewal exchange. The first request to see an expired access token moves
//! it to Refreshing and starts the exchange; every request that arrives while
//! Refreshing joins the wait queue instead of starting another one. When the
//! exchange settles, every waiter is resumed with the new access token or
//! rejected with the same terminal failure.
//!
//! State and queue sit behind one tokio Mutex so the Idle → Refreshing
//! transition is a single check-and-set even on a multi-threaded runtime.
//! The exchange itself runs on a spawned task: if the caller that started it
//! goes away, the queue is still drained.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use session_auth::{CredentialStore, Credentials, Endpoints, SIGN_IN_ROUTE};
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};
use transport::{DEFAULT_TIMEOUT, RequestDescriptor, Transport};

use crate::error::{Error, Result};

/// Capacity of the session event channel. Events are rare; a lagging
/// subscriber only needs the latest one.
const EVENT_CAPACITY: usize = 16;

/// Whether a renewal exchange is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

impl RefreshState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::Refreshing => "refreshing",
        }
    }
}

/// Notifications for the application shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A renewal succeeded and the store holds a fresh pair.
    Renewed,
    /// A renewal failed; the store is empty and the user must sign in.
    /// Sent once per failed renewal, however many requests were waiting.
    Expired { reason: String },
}

/// Tunables for the coordinator.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Upper bound on one renewal exchange. A timeout is a renewal failure.
    pub renewal_timeout: Duration,
    /// Front-end route of the sign-in page. Failures whose waiters all came
    /// from here do not emit `Expired`.
    pub sign_in_route: String,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            renewal_timeout: DEFAULT_TIMEOUT,
            sign_in_route: SIGN_IN_ROUTE.to_string(),
        }
    }
}

/// Reason given to waiters whose renewal finished after a sign-out or sign-in.
const SESSION_CHANGED: &str = "session changed during renewal";

/// A request suspended until the in-flight renewal settles.
struct PendingRequest {
    request: RequestDescriptor,
    resume: oneshot::Sender<Result<String>>,
}

/// Outcome of one renewal exchange and the renewal token it was sent with.
struct Renewal {
    from: Option<String>,
    outcome: std::result::Result<Credentials, String>,
}

fn reject(waiters: Vec<PendingRequest>, reason: &str) {
    for waiter in waiters {
        let _ = waiter.resume.send(Err(Error::SessionExpired(reason.to_string())));
    }
}

struct Inner {
    state: RefreshState,
    queue: Vec<PendingRequest>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    endpoints: Endpoints,
    options: RefreshOptions,
    inner: Mutex<Inner>,
    renewals: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

/// Per-session renewal coordinator. Clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        endpoints: Endpoints,
        options: RefreshOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                transport,
                store,
                endpoints,
                options,
                inner: Mutex::new(Inner {
                    state: RefreshState::Idle,
                    queue: Vec::new(),
                }),
                renewals: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Obtain a fresh access token for a request that hit the expiry signal.
    ///
    /// Sets the request's RetryMark. If no renewal is running one is started,
    /// otherwise the request joins the queue of the running one. Resolves
    /// once that renewal settles.
    ///
    /// If a renewal already completed after the request was sent, the stored
    /// token is returned straight away without a new exchange.
    pub async fn request_access(&self, request: &mut RequestDescriptor) -> Result<String> {
        let receiver = {
            let mut inner = self.shared.inner.lock().await;
            request.mark_retried();

            if inner.state == RefreshState::Idle
                && let Some(current) = self.shared.store.access_token().await
                && request.authorized_with() != Some(current.as_str())
            {
                debug!(
                    request = %request.describe(),
                    "token renewed since request was sent, reusing it"
                );
                return Ok(current);
            }

            let (resume, receiver) = oneshot::channel();
            inner.queue.push(PendingRequest {
                request: request.clone(),
                resume,
            });

            if inner.state == RefreshState::Idle {
                inner.state = RefreshState::Refreshing;
                info!(request = %request.describe(), "access token rejected, starting renewal");
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    let renewal = shared.renew().await;
                    shared.settle(renewal).await;
                });
            } else {
                debug!(
                    request = %request.describe(),
                    queued = inner.queue.len(),
                    "renewal in flight, queued"
                );
            }
            receiver
        };

        receiver
            .await
            .unwrap_or_else(|_| Err(Error::SessionExpired("renewal aborted".into())))
    }

    pub async fn state(&self) -> RefreshState {
        self.shared.inner.lock().await.state
    }

    /// Queued requests as "METHOD /path", in arrival order.
    pub async fn queued(&self) -> Vec<String> {
        let inner = self.shared.inner.lock().await;
        inner.queue.iter().map(|p| p.request.describe()).collect()
    }

    /// Number of renewal exchanges sent to the backend so far.
    pub fn renewals(&self) -> u64 {
        self.shared.renewals.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.shared.store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.shared.transport
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.shared.endpoints
    }

    pub fn sign_in_route(&self) -> &str {
        &self.shared.options.sign_in_route
    }
}

impl Shared {
    /// Run the renewal exchange.
    async fn renew(&self) -> Renewal {
        let Some(credentials) = self.store.get().await else {
            return Renewal {
                from: None,
                outcome: Err("no renewal token stored".into()),
            };
        };

        self.renewals.fetch_add(1, Ordering::Relaxed);
        let exchange = session_auth::renew(
            self.transport.as_ref(),
            &self.endpoints,
            &credentials.renewal_token,
        );
        let outcome = match tokio::time::timeout(self.options.renewal_timeout, exchange).await {
            Ok(Ok(auth)) => Ok(auth.into()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "renewal timed out after {}s",
                self.options.renewal_timeout.as_secs()
            )),
        };
        Renewal {
            from: Some(credentials.renewal_token),
            outcome,
        }
    }

    /// Store or clear credentials, then drain the queue and go Idle.
    ///
    /// Runs under the state lock, so a waiter that resumes already sees the
    /// store in its final state. The store is only written while it still
    /// holds the session the exchange started from; a sign-out or sign-in
    /// that happened meanwhile wins, and no event is sent.
    async fn settle(&self, renewal: Renewal) {
        let mut inner = self.inner.lock().await;
        let waiters = std::mem::take(&mut inner.queue);
        let from = renewal.from.as_deref();

        match renewal.outcome {
            Ok(credentials) => {
                let access_token = credentials.access_token.clone();
                let applied = match from {
                    Some(expected) => self.store.replace_if(expected, credentials).await,
                    None => Ok(false),
                };
                let applied = applied.unwrap_or_else(|e| {
                    warn!(error = %e, "failed to persist renewed credentials");
                    true
                });

                if applied {
                    metrics::counter!("session_renewals_total", "outcome" => "success").increment(1);
                    info!(waiters = waiters.len(), "session renewed");
                    let _ = self.events.send(SessionEvent::Renewed);
                    for waiter in waiters {
                        let _ = waiter.resume.send(Ok(access_token.clone()));
                    }
                } else {
                    metrics::counter!("session_renewals_total", "outcome" => "discarded").increment(1);
                    info!(waiters = waiters.len(), "session changed during renewal, discarding result");
                    reject(waiters, SESSION_CHANGED);
                }
            }
            Err(reason) => {
                let cleared = self.store.clear_if(from).await.unwrap_or_else(|e| {
                    warn!(error = %e, "failed to clear credentials");
                    true
                });
                metrics::counter!("session_renewals_total", "outcome" => "failure").increment(1);
                warn!(waiters = waiters.len(), reason = %reason, "session renewal failed");

                if !cleared {
                    info!("session changed during renewal, keeping current credentials");
                } else if waiters
                    .iter()
                    .any(|w| !self.is_sign_in_route(w.request.origin.as_deref()))
                {
                    let _ = self.events.send(SessionEvent::Expired {
                        reason: reason.clone(),
                    });
                } else {
                    debug!("all waiters came from the sign-in route, not redirecting");
                }
                reject(waiters, &reason);
            }
        }

        inner.state = RefreshState::Idle;
    }

    fn is_sign_in_route(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return false;
        };
        let origin = origin.split('?').next().unwrap_or(origin);
        origin.trim_end_matches('/') == self.options.sign_in_route.trim_end_matches('/')
    }
}
