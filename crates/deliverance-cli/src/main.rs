//! # Delivery Slot Watcher
//!
//! This application logs into a grocery site in Chrome, polls the delivery
//! slot page until windows open up, tells the operator, and optionally
//! checks out using the best slot.

mod args;

use args::Args;
use clap::Parser;
use deliverance::browser::{create_browser, initial_tab};
use deliverance::session::SessionStore;
use deliverance::{
    init_logger, CancellationToken, ChromePage, Config, FileSessionStore, Funnel, Notifier,
    Operator, RunOutcome, Urgency,
};
use log::{error, info, warn};
use std::process::ExitCode;
use std::time::Duration;

/// How long the browser stays open afterwards for finishing up by hand.
const GRACE_PERIOD: Duration = Duration::from_secs(15 * 60);

/// The main entry point of the application.
fn main() -> ExitCode {
    // Parse command-line arguments.
    let args = Args::parse();
    init_logger(args.log_level());

    // Handle the clean session option.
    if args.clean {
        return match clean() {
            Ok(()) => {
                info!("Session information successfully removed.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to remove session information: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn clean() -> anyhow::Result<()> {
    deliverance::utils::wipe_profile_dir()?;
    FileSessionStore::default_location()?.clear()
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut config = Config::load(&args.service, Some(&args.conf))?;
    config.options.checkout |= args.checkout;
    config.options.ignore_oos |= args.ignore_oos;
    config.options.save_cart |= args.save_cart;
    config.output_dir = args.output_dir.clone();
    std::fs::create_dir_all(&config.output_dir)?;
    if config.options.checkout {
        warn!("[!] Automatic checkout is enabled");
    }

    let store = FileSessionStore::default_location()?;
    // A manual login needs a window to log in through.
    let needs_login = args.force_login || store.load().ok().flatten().is_none();
    let headless = !args.disable_headless && !needs_login;
    if needs_login {
        info!("[*] No usable stored session, opening a browser window for login");
    }

    let mut notifier = Notifier::from_config(&config);
    let browser = create_browser(headless)?;
    let tab = initial_tab(&browser)?;
    tab.set_default_timeout(Duration::from_secs(30));
    let page = ChromePage::new(tab);
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("[!] Interrupt received, shutting down");
            cancel.cancel();
        })?;
    }
    let funnel = Funnel::new(&page, &config, &notifier, &store)?.with_cancellation(cancel.clone());

    let result = funnel.run(args.force_login);
    let failed = match &result {
        Ok(RunOutcome::Cancelled) => {
            info!("Polling stopped");
            false
        }
        Ok(RunOutcome::Notified) => {
            info!("[✓] Slots found, the rest is up to you");
            false
        }
        Ok(RunOutcome::CheckedOut { slot }) => {
            info!("[✓] Order placed for slot: {}", slot);
            false
        }
        Err(e) => {
            error!("[!] {}", e);
            notifier.alert(&e.alert_text(), Urgency::Failure);
            funnel.dump_source();
            true
        }
    };

    if !matches!(result, Ok(RunOutcome::Cancelled)) && !cancel.is_cancelled() {
        info!(
            "[*] Leaving the browser open for {} minutes for manual checkout. Press Ctrl-C to exit.",
            GRACE_PERIOD.as_secs() / 60
        );
        cancel.sleep(GRACE_PERIOD);
    }

    notifier.shutdown();
    drop(browser);
    if failed {
        anyhow::bail!("run ended with an error");
    }
    Ok(())
}
