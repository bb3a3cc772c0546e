use std::time::Duration;

/// High-level error category, used to word operator alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The funnel went somewhere we could not recover from.
    Navigation,
    /// A human was needed and did not show up in time.
    Operator,
    /// The page no longer looks the way the locators assume.
    Structure,
    /// Browser, filesystem or configuration problems.
    System,
}

/// Errors produced by the navigation engine and everything built on it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A waypoint click did not land on any acceptable destination.
    /// Always routed through the redirect handler before surfacing.
    #[error("navigation to {expected:?} failed (landed on '{location}')")]
    NavigationFailure {
        expected: Vec<String>,
        location: String,
    },

    /// No redirect classification matched, or its recovery timed out.
    #[error("unhandled redirect to '{location}': {reason}")]
    Unhandled { location: String, reason: String },

    #[error(
        "encountered an out-of-stock alert and timed out after {}s waiting for input; \
         use `--ignore-oos` to bypass these alerts",
        waited.as_secs()
    )]
    ItemOutOfStock { waited: Duration },

    #[error("timed out waiting for login (>= {}min)", waited.as_secs() / 60)]
    AuthTimeout { waited: Duration },

    #[error("expected 1 date element for slot but found {found}")]
    SlotDateElementAmbiguous { found: usize },

    #[error("timed out waiting for element {locator}")]
    ElementTimeout { locator: String },

    #[error("expected element {locator} is missing")]
    MissingElement { locator: String },

    #[error("slot '{name}' is no longer attached to the page")]
    StaleSlot { name: String },

    /// The operator interrupted the run.
    #[error("interrupted")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn unhandled(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Unhandled {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Returns the high-level category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NavigationFailure { .. } | Error::Unhandled { .. } => ErrorCategory::Navigation,
            Error::ItemOutOfStock { .. } | Error::AuthTimeout { .. } => ErrorCategory::Operator,
            Error::SlotDateElementAmbiguous { .. }
            | Error::ElementTimeout { .. }
            | Error::MissingElement { .. }
            | Error::StaleSlot { .. } => ErrorCategory::Structure,
            Error::Cancelled | Error::Config(_) | Error::Io(_) | Error::Driver(_) => {
                ErrorCategory::System
            }
        }
    }

    /// True when the bot stopped because it needs a human to do something.
    pub fn is_operator_actionable(&self) -> bool {
        self.category() == ErrorCategory::Operator
    }

    /// Short text suitable for a spoken or push alert.
    pub fn alert_text(&self) -> String {
        match self.category() {
            ErrorCategory::Operator => format!("Manual intervention needed. {}", self),
            ErrorCategory::Structure => "Page layout changed. Check the logs".to_string(),
            ErrorCategory::Navigation | ErrorCategory::System => "Encountered an error".to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_variants() {
        assert_eq!(
            Error::unhandled("https://x/", "nope").category(),
            ErrorCategory::Navigation
        );
        assert!(Error::ItemOutOfStock {
            waited: Duration::from_secs(600)
        }
        .is_operator_actionable());
        assert_eq!(
            Error::SlotDateElementAmbiguous { found: 2 }.category(),
            ErrorCategory::Structure
        );
        assert_eq!(
            Error::from(anyhow::anyhow!("tab crashed")).category(),
            ErrorCategory::System
        );
        assert!(!Error::Cancelled.is_operator_actionable());
    }

    #[test]
    fn auth_timeout_message_reports_minutes() {
        let err = Error::AuthTimeout {
            waited: Duration::from_secs(660),
        };
        assert_eq!(err.to_string(), "timed out waiting for login (>= 11min)");
    }
}
