use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` in short steps. Returns `true` if cancelled
    /// before or during the wait.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep((deadline - now).min(Duration::from_millis(250)));
        }
    }
}

/// Platform-relative path from the home directory to the deliverance data directory.
#[cfg(target_os = "linux")]
const DATA_SUBPATH: &str = ".local/share/deliverance";

#[cfg(target_os = "macos")]
const DATA_SUBPATH: &str = "Library/Application Support/deliverance";

#[cfg(target_os = "windows")]
const DATA_SUBPATH: &str = "AppData/Roaming/deliverance";

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const DATA_SUBPATH: &str = ".deliverance";

/// Returns the platform-appropriate data directory holding the stored
/// session and the Chrome profile.
///
/// - **Linux:** `~/.local/share/deliverance`
/// - **macOS:** `~/Library/Application Support/deliverance`
/// - **Windows:** `%USERPROFILE%\AppData\Roaming\deliverance`
///
/// Creates the directory if it does not already exist.
pub fn get_user_data_dir() -> anyhow::Result<PathBuf> {
    let home_dir = env::var("HOME").or_else(|_| env::var("USERPROFILE"))?;
    let user_data_dir = PathBuf::from(&home_dir).join(DATA_SUBPATH);

    if !user_data_dir.exists() {
        std::fs::create_dir_all(&user_data_dir)?;
        log::info!("User data directory created at: {:?}", user_data_dir);
    }

    Ok(user_data_dir)
}

/// The Chrome profile directory inside the data directory.
pub fn get_profile_dir() -> anyhow::Result<PathBuf> {
    let profile = get_user_data_dir()?.join("profile");
    std::fs::create_dir_all(&profile)?;
    Ok(profile)
}

/// Completely removes the Chrome profile directory
pub fn wipe_profile_dir() -> anyhow::Result<()> {
    let path = get_profile_dir()?;
    if path.exists() {
        std::fs::remove_dir_all(&path)?;
        log::info!("Wiped profile directory: {:?}", path);
    }
    Ok(())
}

/// Escapes JavaScript strings to prevent injection.
pub fn js_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
