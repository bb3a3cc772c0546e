//! # Delivery Slot Watcher Library
//!
//! This library drives a grocery site's checkout funnel in a real browser:
//! it walks the configured routes, recovers from the redirects the site
//! throws in the way, watches the slot-select page for delivery windows and,
//! when asked to, checks out using the best one.

pub mod artifacts;
pub mod auth;
pub mod browser;
pub mod checkout;
pub mod config;
pub mod control;
pub mod error;
pub mod funnel;
pub mod locator;
pub mod logger;
pub mod nav;
pub mod notify;
pub mod page;
pub mod poll;
pub mod session;
pub mod slots;
pub mod tab;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use checkout::CheckoutResult;
pub use config::Config;
pub use control::{generate_message, RunOutcome};
pub use error::{Error, ErrorCategory, Result};
pub use funnel::Funnel;
pub use logger::init_logger;
pub use notify::{Notifier, Operator, Urgency};
pub use session::FileSessionStore;
pub use slots::Slot;
pub use tab::ChromePage;
pub use utils::{get_user_data_dir, CancellationToken};
