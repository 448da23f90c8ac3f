//! Credential storage for the signed-in session
//!
//! Holds exactly one access/renewal token pair. The pair lives behind a
//! single tokio Mutex and is always replaced as a unit, so readers never see
//! an access token from one exchange next to a renewal token from another.
//!
//! A store opened with `load` also persists the pair to a JSON file using
//! atomic temp-file + rename, so a restarted process resumes the session.
//! A missing file means "signed out".

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The current access token and the renewal token that can replace it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    pub renewal_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, renewal_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            renewal_token: renewal_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("renewal_token", &"[REDACTED]")
            .finish()
    }
}

/// Thread-safe holder of the session's credential pair.
///
/// Writes to disk happen while the lock is held, so the file and the
/// in-memory pair change together.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<Option<Credentials>>,
}

impl CredentialStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(None),
        }
    }

    /// Open a file-backed store, reading any pair left by a previous run.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let credentials: Credentials = serde_json::from_str(&contents)
                    .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
                info!(path = %path.display(), "loaded session credentials");
                Some(credentials)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "credential file not found, starting signed out");
                None
            }
            Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// File backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Clone of the current pair.
    pub async fn get(&self) -> Option<Credentials> {
        self.state.lock().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub async fn is_signed_in(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Replace the pair.
    ///
    /// The in-memory pair is replaced even when persisting fails; the error
    /// only reports that the file is now behind.
    pub async fn set(&self, credentials: Credentials) -> Result<()> {
        let mut state = self.state.lock().await;
        self.store_locked(&mut state, credentials).await
    }

    /// Replace the pair only while the store still holds `expected` as its
    /// renewal token. Returns `false` without touching the store when the
    /// session was signed out or replaced in the meantime.
    ///
    /// Persistence errors behave as in [`set`](Self::set).
    pub async fn replace_if(&self, expected: &str, credentials: Credentials) -> Result<bool> {
        let mut state = self.state.lock().await;
        if renewal_token(&state) != Some(expected) {
            debug!("session changed, dropping credential update");
            return Ok(false);
        }
        self.store_locked(&mut state, credentials).await?;
        Ok(true)
    }

    /// Forget the pair. Clearing an empty store is not an error.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.clear_locked(&mut state).await
    }

    /// Forget the pair only while the store still holds `expected` as its
    /// renewal token (`None`: still signed out). Returns `false` without
    /// touching the store when a different session is present.
    pub async fn clear_if(&self, expected: Option<&str>) -> Result<bool> {
        let mut state = self.state.lock().await;
        if renewal_token(&state) != expected {
            debug!("session changed, keeping current credentials");
            return Ok(false);
        }
        self.clear_locked(&mut state).await?;
        Ok(true)
    }

    async fn store_locked(
        &self,
        state: &mut Option<Credentials>,
        credentials: Credentials,
    ) -> Result<()> {
        let credentials = state.insert(credentials);
        debug!("stored session credentials");
        match &self.path {
            Some(path) => write_atomic(path, credentials).await,
            None => Ok(()),
        }
    }

    async fn clear_locked(&self, state: &mut Option<Credentials>) -> Result<()> {
        if state.take().is_some() {
            debug!("cleared session credentials");
        }
        let Some(path) = &self.path else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing credential file: {e}"))),
        }
    }
}

fn renewal_token(state: &Option<Credentials>) -> Option<&str> {
    state.as_ref().map(|c| c.renewal_token.as_str())
}

/// Write the pair to a file atomically with 0600 permissions.
async fn write_atomic(path: &Path, credentials: &Credentials) -> Result<()> {
    let json = serde_json::to_string_pretty(credentials)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted session credentials");
    Ok(())
}
