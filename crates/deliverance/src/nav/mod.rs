//! Declarative routes through the checkout funnel and the engine that walks them.

pub mod redirect;

use crate::config::{RouteConfig, SiteConfig};
use crate::error::{Error, Result};
use crate::funnel::Funnel;
use crate::locator::{match_destination, same_location, LocatorSet};
use crate::page::{click_when_enabled, wait_present, wait_until_stale};
use crate::poll::jitter;
use redirect::{Recovery, RedirectContext};
use std::cell::Cell;
use std::fmt;

/// Named operations a waypoint can run right before its click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreAction {
    SelectPaymentMethod,
}

impl PreAction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "select_payment_method" => Some(PreAction::SelectPaymentMethod),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PreAction::SelectPaymentMethod => "select_payment_method",
        }
    }
}

impl fmt::Display for PreAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One click-driven step: the element to click and where it may land.
#[derive(Debug, Clone)]
pub struct Waypoint {
    pub locator: LocatorSet,
    destinations: Vec<String>,
    pub pre_action: Option<PreAction>,
}

impl Waypoint {
    pub fn new(locator: impl Into<LocatorSet>, destinations: Vec<String>) -> Result<Self> {
        if destinations.is_empty() || destinations.iter().any(String::is_empty) {
            return Err(Error::Config(
                "waypoint needs at least one destination".to_string(),
            ));
        }
        Ok(Self {
            locator: locator.into(),
            destinations,
            pre_action: None,
        })
    }

    pub fn with_pre_action(mut self, action: PreAction) -> Self {
        self.pre_action = Some(action);
        self
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// The destination `location` satisfies, if any.
    pub fn check_current<'w>(&'w self, location: &str) -> Option<&'w str> {
        match_destination(location, &self.destinations)
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Waypoint {} -> {:?}>", self.locator, self.destinations)
    }
}

/// An ordered chain of waypoints from a fixed start.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub start: String,
    waypoints: Vec<Waypoint>,
    progress: Cell<usize>,
}

impl Route {
    pub fn new(name: impl Into<String>, start: impl Into<String>, waypoints: Vec<Waypoint>) -> Result<Self> {
        let name = name.into();
        if waypoints.is_empty() {
            return Err(Error::Config(format!("route '{name}' has no waypoints")));
        }
        Ok(Self {
            name,
            start: start.into(),
            waypoints,
            progress: Cell::new(0),
        })
    }

    /// Builds a route from its declarative form, resolving paths against the site.
    pub fn from_config(name: &str, config: &RouteConfig, site: &SiteConfig) -> Result<Self> {
        log::debug!("Building route: '{}'", name);
        let waypoints = config
            .waypoints
            .iter()
            .map(|w| {
                let waypoint = Waypoint::new(w.locator.clone(), w.dest.clone())?;
                Ok(match &w.pre_action {
                    None => waypoint,
                    Some(action) => waypoint.with_pre_action(PreAction::from_name(action).ok_or_else(
                        || Error::Config(format!("unknown pre-action '{action}'")),
                    )?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, site.url(&config.start), waypoints)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// The last waypoint; reaching its destination completes the route.
    pub fn terminal(&self) -> &Waypoint {
        &self.waypoints[self.waypoints.len() - 1]
    }

    /// Waypoints passed during the current traversal.
    pub fn progress(&self) -> usize {
        self.progress.get()
    }

    pub fn is_start(&self, location: &str) -> bool {
        same_location(location, &self.start)
    }

    /// Destinations of the waypoint at `index` and of every waypoint after it.
    pub fn valid_dest(&self, index: usize) -> Vec<String> {
        self.waypoints[index..]
            .iter()
            .flat_map(|w| w.destinations.iter().cloned())
            .collect()
    }

    fn reset(&self) {
        self.progress.set(0);
    }

    fn advance(&self) {
        self.progress.set(self.progress.get() + 1);
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Route {} beginning at '{}' with {} stops>",
            self.name,
            self.start,
            self.waypoints.len()
        )
    }
}

/// Result of walking a route.
#[derive(Debug)]
pub enum RouteOutcome {
    Completed,
    /// The funnel sent us back to the start of the route.
    RestartRequested,
    Failed(Error),
}

impl RouteOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RouteOutcome::Completed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NavOptions {
    /// Walk the route again from the top when it is restarted.
    pub retry_on_restart: bool,
    /// Reload the start page before declaring a restart.
    pub refresh_on_restart: bool,
}

impl NavOptions {
    pub fn retrying() -> Self {
        Self {
            retry_on_restart: true,
            refresh_on_restart: true,
        }
    }
}

enum Traversal {
    Completed,
    Restart,
}

impl Funnel<'_> {
    /// Walks `route` from its start, handling redirects along the way.
    pub fn navigate(&self, route: &Route, opts: NavOptions) -> RouteOutcome {
        let max_restarts = self.config.timing.max_route_restarts;
        let mut restarts = 0;
        loop {
            match self.traverse(route, opts) {
                Ok(Traversal::Completed) => return RouteOutcome::Completed,
                Ok(Traversal::Restart) if opts.retry_on_restart && restarts < max_restarts => {
                    restarts += 1;
                    log::warn!("[!] Retrying route ({}/{})", restarts, max_restarts);
                }
                Ok(Traversal::Restart) => return RouteOutcome::RestartRequested,
                Err(e) => return RouteOutcome::Failed(e),
            }
        }
    }

    /// [`Funnel::navigate`] for a route looked up by name.
    pub fn navigate_named(&self, name: &str, opts: NavOptions) -> RouteOutcome {
        match self.route(name) {
            Ok(route) => self.navigate(route, opts),
            Err(e) => RouteOutcome::Failed(e),
        }
    }

    fn traverse(&self, route: &Route, opts: NavOptions) -> Result<Traversal> {
        let timing = &self.config.timing;
        log::info!("[*] Navigating {}", route);
        route.reset();

        if !route.is_start(&self.page.location()?) {
            log::info!("[*] Navigating to route start: {}", route.start);
            jitter(timing.click_jitter, timing.jitter_pct);
            self.page.navigate_to(&route.start)?;
        }

        for (index, waypoint) in route.waypoints.iter().enumerate() {
            let valid_dest = route.valid_dest(index);
            let mut attempts = 0;
            loop {
                self.check_cancelled()?;
                let location = self.page.location()?;
                if let Some(dest) = match_destination(&location, &valid_dest) {
                    log::warn!("[!] Already at dest: '{}'", dest);
                    break;
                }
                if attempts > timing.max_waypoint_retries {
                    return Err(Error::unhandled(
                        location,
                        format!("{waypoint} not passed after {attempts} attempts"),
                    ));
                }
                attempts += 1;

                match self.pass_waypoint(waypoint, &valid_dest) {
                    Ok(()) => break,
                    Err(e @ (Error::NavigationFailure { .. } | Error::ElementTimeout { .. })) => {
                        log::warn!("[!] {}", e);
                        let ctx = RedirectContext {
                            valid_dest: &valid_dest,
                            timeout: Some(timing.nav_timeout),
                            route: Some(route),
                            refresh_on_restart: opts.refresh_on_restart,
                        };
                        match self.handle_redirect(&ctx)? {
                            Recovery::Retry => continue,
                            Recovery::Restart => return Ok(Traversal::Restart),
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            route.advance();
        }

        log::info!("[✓] Route complete");
        Ok(Traversal::Completed)
    }

    fn pass_waypoint(&self, waypoint: &Waypoint, valid_dest: &[String]) -> Result<()> {
        let timing = &self.config.timing;
        if let Some(action) = waypoint.pre_action {
            log::info!("[*] Executing {}() before navigation", action);
            if let Err(e) = self.run_pre_action(action) {
                log::error!("[!] {}() failed: {}", action, e);
            }
        }

        log::info!("[*] Navigating {}", waypoint);
        let element = wait_present(
            self.page,
            &waypoint.locator,
            timing.nav_timeout,
            timing.poll_interval,
        )?;
        jitter(timing.click_jitter, timing.jitter_pct);
        click_when_enabled(
            self.page,
            &element,
            timing.click_timeout,
            timing.poll_interval,
            timing.intercept_retry_delay,
        )?;
        wait_until_stale(self.page, &element, timing.nav_timeout, timing.poll_interval);

        let location = self.page.location()?;
        if let Some(dest) = waypoint.check_current(&location) {
            log::info!("[✓] Navigated to '{}'", dest);
        } else if match_destination(&location, valid_dest).is_some() {
            log::info!("[✓] Navigated to valid dest '{}'", location);
        } else {
            return Err(Error::NavigationFailure {
                expected: waypoint.destinations.clone(),
                location,
            });
        }
        Ok(())
    }

    fn run_pre_action(&self, action: PreAction) -> Result<()> {
        match action {
            PreAction::SelectPaymentMethod => self.select_payment_method(),
        }
    }
}
