//! On-disk persistence of the authenticated browser session.
//!
//! The store is deliberately dumb: it reads and writes whatever
//! [`SessionState`] the browser substrate exports. Deciding whether a
//! session is still valid is the authenticator's job.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::browser::SessionState;
use crate::error::{Result, WatchError};

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Stored session, or `None` when there is no file.
    ///
    /// A file that no longer parses is treated as absent; the next
    /// successful login overwrites it.
    pub async fn load(&self) -> Result<Option<SessionState>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WatchError::Io(e)),
        };

        match serde_json::from_str::<SessionState>(&raw) {
            Ok(state) => {
                debug!(path = %self.path.display(), cookies = state.cookies.len(), "Loaded session");
                Ok(Some(state))
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Ignoring unreadable session file: {}", e);
                Ok(None)
            }
        }
    }

    /// Write the session atomically (temp file + rename).
    pub async fn save(&self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), cookies = state.cookies.len(), "Saved session");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WatchError::Io(e)),
        }
    }
}
