//! Deciding what an unexpected location means and recovering from it.

use super::Route;
use crate::config::Patterns;
use crate::error::{Error, Result};
use crate::funnel::Funnel;
use crate::locator::match_destination;
use crate::notify::Urgency;
use crate::page::{click_when_enabled, find_any, wait_present, ElementHandle};
use std::time::Duration;

/// What the current location turned out to be. Checked in declaration order;
/// the first that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Login required.
    Auth,
    OutOfStock,
    Throttle,
    /// Back at the route start before any waypoint was passed.
    RouteStart,
    /// Already somewhere in the remaining funnel.
    AlreadyValid,
    /// Somewhere unknown; wait for the page to settle on a valid destination.
    AwaitValid,
    Unknown,
}

/// What the caller knows about the navigation that went astray.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectContext<'r> {
    pub valid_dest: &'r [String],
    /// Budget for waiting on a late arrival. `None` disables waiting.
    pub timeout: Option<Duration>,
    pub route: Option<&'r Route>,
    pub refresh_on_restart: bool,
}

/// How the caller should carry on after a handled redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Obstruction cleared; try the same waypoint again.
    Retry,
    /// Route state is invalid; start over from the route start.
    Restart,
}

/// Classifies `location` (query string already removed).
pub fn classify(location: &str, patterns: &Patterns, ctx: &RedirectContext<'_>) -> RedirectKind {
    if location.contains(&patterns.auth_url) {
        RedirectKind::Auth
    } else if location.contains(&patterns.oos_url) {
        RedirectKind::OutOfStock
    } else if location.contains(&patterns.throttle_url) {
        RedirectKind::Throttle
    } else if ctx
        .route
        .is_some_and(|r| r.is_start(location) && r.progress() == 0)
    {
        RedirectKind::RouteStart
    } else if ctx.timeout.is_some() && !ctx.valid_dest.is_empty() {
        if match_destination(location, ctx.valid_dest).is_some() {
            RedirectKind::AlreadyValid
        } else {
            RedirectKind::AwaitValid
        }
    } else {
        RedirectKind::Unknown
    }
}

impl Funnel<'_> {
    pub fn handle_redirect(&self, ctx: &RedirectContext<'_>) -> Result<Recovery> {
        let location = self.page.location()?;
        log::warn!("[!] Redirected to: '{}'", location);

        match classify(&location, &self.config.site.patterns, ctx) {
            RedirectKind::Auth => {
                self.ensure_authenticated()?;
                Ok(Recovery::Retry)
            }
            RedirectKind::OutOfStock => {
                self.handle_oos()?;
                Ok(Recovery::Retry)
            }
            RedirectKind::Throttle => {
                self.handle_throttle()?;
                log::warn!("[!] Redirected after throttle");
                Ok(Recovery::Restart)
            }
            RedirectKind::RouteStart => {
                if ctx.refresh_on_restart {
                    self.page.refresh()?;
                }
                Ok(Recovery::Restart)
            }
            RedirectKind::AlreadyValid => {
                log::info!("[*] Already at valid dest '{}'", location);
                Ok(Recovery::Retry)
            }
            RedirectKind::AwaitValid => self.await_valid_dest(ctx),
            RedirectKind::Unknown => Err(Error::unhandled(
                location,
                "no recovery strategy for this location",
            )),
        }
    }

    fn await_valid_dest(&self, ctx: &RedirectContext<'_>) -> Result<Recovery> {
        let timeout = ctx.timeout.unwrap_or(self.config.timing.nav_timeout);
        log::warn!(
            "[!] Handling unknown redirect (timeout in {}s)",
            timeout.as_secs_f32()
        );
        let arrived = self.poll(self.config.timing.poll_interval, timeout).until(|| {
            let location = self.page.location()?;
            Ok::<_, Error>(match_destination(&location, ctx.valid_dest).map(|_| ()))
        })?;
        if arrived.is_some() {
            return Ok(Recovery::Retry);
        }

        let location = self.page.location()?;
        // Bounced to the start after partial progress and stayed there.
        if ctx.route.is_some_and(|r| r.is_start(&location)) {
            log::warn!("[!] Still at route start after partial progress");
            return Ok(Recovery::Restart);
        }
        Err(Error::unhandled(
            location,
            "timed out waiting for redirect to a valid dest",
        ))
    }

    fn on_oos_page(&self) -> Result<bool> {
        Ok(self
            .page
            .location()?
            .contains(&self.config.site.patterns.oos_url))
    }

    fn handle_oos(&self) -> Result<()> {
        if let Err(e) = self.save_removed_items() {
            log::error!("[!] Could not save removed items: {:#}", e);
        }

        let timing = &self.config.timing;
        let poll = self.poll(timing.poll_interval, timing.oos_timeout);
        let cleared = if self.config.options.ignore_oos {
            log::warn!("[!] Attempting to proceed through OOS alert");
            // Every OOS page gets its own continue button; click each once.
            let mut clicked: Option<ElementHandle> = None;
            poll.until(|| {
                if !self.on_oos_page()? {
                    return Ok::<_, Error>(Some(()));
                }
                let button = find_any(self.page, &self.config.site.locators.oos_continue)?
                    .into_iter()
                    .next();
                if let Some(button) = button.filter(|b| clicked.as_ref() != Some(b)) {
                    match click_when_enabled(
                        self.page,
                        &button,
                        timing.click_timeout,
                        timing.poll_interval,
                        timing.intercept_retry_delay,
                    ) {
                        Ok(()) => clicked = Some(button),
                        Err(e) => log::warn!("[!] Could not click OOS continue: {}", e),
                    }
                }
                Ok(None)
            })?
        } else {
            self.operator.alert(
                "An item is out of stock. Press continue if you'd like to proceed",
                Urgency::Attention,
            );
            poll.until(|| Ok::<_, Error>((!self.on_oos_page()?).then_some(())))?
        };

        cleared.ok_or(Error::ItemOutOfStock {
            waited: timing.oos_timeout,
        })
    }

    fn handle_throttle(&self) -> Result<()> {
        let timing = &self.config.timing;
        let patterns = &self.config.site.patterns;
        self.operator.alert("Throttled", Urgency::Attention);
        // Keep the markup until the continue locator is known to be right.
        self.dump_source();

        let continued = wait_present(
            self.page,
            &self.config.site.locators.throttle_continue,
            timing.element_timeout,
            timing.poll_interval,
        )
        .and_then(|button| {
            click_when_enabled(
                self.page,
                &button,
                timing.throttle_continue_timeout,
                timing.poll_interval,
                timing.intercept_retry_delay,
            )
        });
        if let Err(e) = continued {
            log::error!("[!] {}", e);
        }

        let cleared = self.poll(timing.poll_interval, timing.throttle_timeout).until(|| {
            Ok::<_, Error>((!self.page.location()?.contains(&patterns.throttle_url)).then_some(()))
        })?;
        match cleared {
            Some(()) => Ok(()),
            None => Err(Error::unhandled(
                self.page.location()?,
                "throttled and timed out waiting for user input",
            )),
        }
    }
}
