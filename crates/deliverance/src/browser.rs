use headless_chrome::browser::default_executable;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

/// Creates a browser instance that keeps its profile in the data directory.
///
/// The browser is launched with the following settings:
/// - **Headless or visible** based on the `headless` parameter. Logging in
///   by hand needs a visible window.
/// - **Persistent profile** so the site recognises the machine across runs.
/// - **Sandbox disabled** and a long idle timeout, since the polling loop
///   can leave the browser quiet for minutes.
///
/// `DELIVERANCE_CHROME_PATH` overrides the Chrome executable. A launch that
/// fails is retried once with a wiped profile.
pub fn create_browser(headless: bool) -> anyhow::Result<Browser> {
    let mut attempts = 0;
    loop {
        let profile_dir = crate::utils::get_profile_dir()?;

        let mut options = LaunchOptions::default_builder();
        let mut launch_options = options
            .headless(headless)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(60 * 60))
            .window_size(Some((1280, 1000)))
            .args(vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-session-crashed-bubble"),
                OsStr::new("--lang=en-US"),
            ])
            .user_data_dir(Some(profile_dir));

        if let Ok(path) = std::env::var("DELIVERANCE_CHROME_PATH") {
            launch_options = launch_options.path(Some(path.into()));
        } else if let Ok(executable_path) = default_executable() {
            launch_options = launch_options.path(Some(executable_path));
        }

        let launch_options = launch_options
            .build()
            .map_err(|e| anyhow::anyhow!("invalid browser options: {}", e))?;
        match Browser::new(launch_options) {
            Ok(browser) => return Ok(browser),
            Err(e) => {
                attempts += 1;
                if attempts >= 2 {
                    return Err(anyhow::anyhow!("Browser failed even after wipe: {}", e));
                }
                log::warn!("[!] Browser connection failed. Wiping profile and retrying...");
                crate::utils::wipe_profile_dir()?;
            }
        }
    }
}

/// The tab Chrome opened with, or a new one if it never shows up.
pub fn initial_tab(browser: &Browser) -> anyhow::Result<Arc<Tab>> {
    for _ in 0..10 {
        if let Ok(tabs) = browser.get_tabs().lock() {
            if let Some(t) = tabs.first() {
                return Ok(Arc::clone(t));
            }
        }
        sleep(Duration::from_millis(200));
    }
    browser.new_tab()
}
