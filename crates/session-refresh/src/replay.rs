//! One-shot replay of a request after renewal

use tracing::debug;
use transport::{RequestDescriptor, Response, Transport};

use crate::classify::is_expiry_signal;
use crate::decorate::authorize;
use crate::error::{Error, Result};

/// Re-issue `request` with a fresh access token.
///
/// The replayed request always carries the RetryMark, so a second expiry
/// signal is terminal and never starts another renewal. Any other outcome
/// is handed back as if it came from the first attempt.
pub async fn replay(
    transport: &dyn Transport,
    request: &RequestDescriptor,
    access_token: &str,
) -> Result<Response> {
    let mut replayed = authorize(request.clone(), access_token)?;
    replayed.mark_retried();
    debug!(request = %replayed.describe(), "replaying with renewed token");

    let outcome = transport.send(&replayed).await;
    if is_expiry_signal(&outcome) {
        return Err(Error::SessionExpired(
            "request rejected again after session renewal".into(),
        ));
    }
    Ok(outcome?)
}
