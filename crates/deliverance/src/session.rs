//! Persisted authentication state (cookies plus browser storage).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything needed to restore a logged-in browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Raw CDP cookie objects.
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
    #[serde(default)]
    pub session_storage: BTreeMap<String, String>,
}

impl SessionData {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty() && self.session_storage.is_empty()
    }
}

pub trait SessionStore {
    fn load(&self) -> anyhow::Result<Option<SessionData>>;
    fn save(&self, data: &SessionData) -> anyhow::Result<()>;
}

/// Stores the session as JSON in a single file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `session.json` in the user data directory.
    pub fn default_location() -> anyhow::Result<Self> {
        let dir = crate::utils::get_user_data_dir()?;
        Ok(Self::new(dir.join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            log::info!("Removed stored session: {:?}", self.path);
        }
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> anyhow::Result<Option<SessionData>> {
        if !self.path.exists() {
            return Ok(None);
        }
        log::info!("[*] Reading session data from: {:?}", self.path);
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, data: &SessionData) -> anyhow::Result<()> {
        if data.is_empty() {
            log::warn!("[!] No session data found");
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        log::info!("[*] Writing session data to: {:?}", self.path);
        fs::write(&self.path, serde_json::to_string_pretty(data)?)?;
        Ok(())
    }
}
