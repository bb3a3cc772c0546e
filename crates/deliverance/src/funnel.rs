//! The shared context every funnel operation runs against.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::nav::Route;
use crate::notify::Operator;
use crate::page::Page;
use crate::poll::Poll;
use crate::session::SessionStore;
use crate::slots::SlotLayout;
use crate::utils::CancellationToken;
use indexmap::IndexMap;
use std::cell::Cell;
use std::time::Duration;

/// One browser tab working through one service's funnel.
///
/// Everything that drives the page hangs off this type; see `nav`,
/// `nav::redirect`, `auth`, `slots`, `checkout` and `control`.
pub struct Funnel<'a> {
    pub(crate) page: &'a dyn Page,
    pub(crate) config: &'a Config,
    pub(crate) operator: &'a dyn Operator,
    pub(crate) sessions: &'a dyn SessionStore,
    routes: IndexMap<String, Route>,
    /// Slot widget seen on the slot-select page, detected once per session.
    pub(crate) layout: Cell<Option<SlotLayout>>,
    /// Fired by the operator; every wait on the page gives up once it is.
    pub(crate) cancel: CancellationToken,
}

impl<'a> Funnel<'a> {
    pub fn new(
        page: &'a dyn Page,
        config: &'a Config,
        operator: &'a dyn Operator,
        sessions: &'a dyn SessionStore,
    ) -> Result<Self> {
        let routes = config
            .site
            .routes
            .iter()
            .map(|(name, route)| Ok((name.clone(), Route::from_config(name, route, &config.site)?)))
            .collect::<Result<IndexMap<_, _>>>()?;
        Ok(Self {
            page,
            config,
            operator,
            sessions,
            routes,
            layout: Cell::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Ties every wait in this funnel to `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A [`Poll`] that ends early when the run is cancelled.
    pub(crate) fn poll(&self, interval: Duration, timeout: Duration) -> Poll {
        Poll::new(interval, timeout).cancellable(self.cancel.clone())
    }

    /// Fails with [`Error::Cancelled`] once the run has been cancelled.
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn route(&self, name: &str) -> Result<&Route> {
        self.routes
            .get(name)
            .ok_or_else(|| Error::Config(format!("route '{name}' is not defined")))
    }

    pub fn layout(&self) -> Option<SlotLayout> {
        self.layout.get()
    }
}
