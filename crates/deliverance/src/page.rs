//! The page-driving capability the engine is built on, plus the waiting and
//! clicking conventions layered over it.

use crate::error::{Error, Result};
use crate::locator::{strip_query, Locator, LocatorSet};
use crate::poll::Poll;
use crate::session::SessionData;
use std::fmt;
use std::thread::sleep;
use std::time::Duration;

/// Opaque reference to an element found on the current document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickResult {
    Clicked,
    /// Something else (an overlay, a spinner) sits on top of the element.
    Intercepted,
}

/// A single browser tab as seen by the navigation engine.
///
/// Only one caller drives a page at a time; implementations are not expected
/// to be shareable across threads.
pub trait Page {
    /// Full URL of the current document, query string included.
    fn current_url(&self) -> anyhow::Result<String>;
    fn navigate_to(&self, url: &str) -> anyhow::Result<()>;
    fn refresh(&self) -> anyhow::Result<()>;

    fn find_all(&self, locator: &Locator) -> anyhow::Result<Vec<ElementHandle>>;
    fn find_within(
        &self,
        scope: &ElementHandle,
        locator: &Locator,
    ) -> anyhow::Result<Vec<ElementHandle>>;
    /// Ancestors of `element` matching `locator`, nearest last.
    fn find_ancestors(
        &self,
        element: &ElementHandle,
        locator: &Locator,
    ) -> anyhow::Result<Vec<ElementHandle>>;

    fn text(&self, element: &ElementHandle) -> anyhow::Result<String>;
    fn attribute(&self, element: &ElementHandle, name: &str) -> anyhow::Result<Option<String>>;
    /// Displayed and enabled.
    fn is_clickable(&self, element: &ElementHandle) -> anyhow::Result<bool>;
    fn click(&self, element: &ElementHandle) -> anyhow::Result<ClickResult>;
    /// True once the element is no longer part of the current document.
    fn is_stale(&self, element: &ElementHandle) -> anyhow::Result<bool>;

    fn page_source(&self) -> anyhow::Result<String>;
    fn export_session(&self) -> anyhow::Result<SessionData>;
    fn import_session(&self, data: &SessionData) -> anyhow::Result<()>;

    /// Current location with the query string removed.
    fn location(&self) -> anyhow::Result<String> {
        Ok(strip_query(&self.current_url()?).to_string())
    }
}

/// Finds every element matching the first alternative of `set` that matches
/// anything.
pub fn find_any(page: &dyn Page, set: &LocatorSet) -> anyhow::Result<Vec<ElementHandle>> {
    for locator in set.alternatives() {
        let found = page.find_all(locator)?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// Waits until any alternative of `set` is present and returns the first match.
pub fn wait_present(
    page: &dyn Page,
    set: &LocatorSet,
    timeout: Duration,
    interval: Duration,
) -> Result<ElementHandle> {
    Poll::new(interval, timeout)
        .until(|| Ok::<_, anyhow::Error>(find_any(page, set)?.into_iter().next()))?
        .ok_or_else(|| {
            log::error!("[!] Timed out waiting for target element: {}", set);
            Error::ElementTimeout {
                locator: set.to_string(),
            }
        })
}

/// Waits until one of several locator sets is present; returns its index.
pub fn wait_any_present(
    page: &dyn Page,
    sets: &[&LocatorSet],
    timeout: Duration,
    interval: Duration,
) -> Result<usize> {
    Poll::new(interval, timeout)
        .until(|| {
            for (i, set) in sets.iter().enumerate() {
                if !find_any(page, set)?.is_empty() {
                    return Ok::<_, anyhow::Error>(Some(i));
                }
            }
            Ok(None)
        })?
        .ok_or_else(|| {
            let names: Vec<String> = sets.iter().map(|s| s.to_string()).collect();
            Error::ElementTimeout {
                locator: names.join(" or "),
            }
        })
}

/// Waits for `element` to become clickable and clicks it. An intercepted
/// click is retried once after `retry_delay`.
pub fn click_when_enabled(
    page: &dyn Page,
    element: &ElementHandle,
    timeout: Duration,
    interval: Duration,
    retry_delay: Duration,
) -> Result<()> {
    let ready = Poll::new(interval, timeout)
        .until(|| Ok::<_, anyhow::Error>(page.is_clickable(element)?.then_some(())))?;
    if ready.is_none() {
        return Err(Error::ElementTimeout {
            locator: format!("clickable element {element}"),
        });
    }

    if page.click(element)? == ClickResult::Intercepted {
        log::warn!(
            "[!] Click intercepted. Waiting for {}s",
            retry_delay.as_secs_f32()
        );
        sleep(retry_delay);
        if page.click(element)? == ClickResult::Intercepted {
            return Err(Error::Driver(anyhow::anyhow!(
                "click on {element} intercepted twice"
            )));
        }
    }
    Ok(())
}

/// Waits for `element` to detach from the document. Returns whether it did;
/// running out of time is not an error.
pub fn wait_until_stale(
    page: &dyn Page,
    element: &ElementHandle,
    timeout: Duration,
    interval: Duration,
) -> bool {
    Poll::new(interval, timeout)
        .until(|| {
            // Evaluation fails mid-navigation; treat that as "not yet".
            Ok::<_, anyhow::Error>(page.is_stale(element).unwrap_or(false).then_some(()))
        })
        .ok()
        .flatten()
        .is_some()
}
