use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::CredentialStore;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            saved_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.saved_at
    }
}

/// Access token persisted as `session.json` in the cache directory.
///
/// Token lifetime is not tracked here: an expired token is detected by the
/// server answering 401, which the client handles by refreshing.
pub struct FileCredentialStore {
    cache_dir: PathBuf,
    // Serializes read-modify-write of the session file within this process
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    /// Load the full session record, if one has been saved.
    pub fn load(&self) -> Result<Option<SessionData>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("Session lock poisoned"))?;
        Self::read(&self.session_path())
    }

    fn read(path: &Path) -> Result<Option<SessionData>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        let data = serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(data))
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Result<Option<String>> {
        Ok(self.load()?.map(|data| data.token))
    }

    fn set_token(&self, token: &str) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("Session lock poisoned"))?;
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(&SessionData::new(token))?;
        std::fs::write(&path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("Session lock poisoned"))?;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}
