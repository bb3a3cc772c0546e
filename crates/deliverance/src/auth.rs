//! Waiting for the operator to log in, and reusing the session afterwards.

use crate::error::{Error, Result};
use crate::funnel::Funnel;
use crate::locator::same_location;
use crate::notify::Urgency;
use crate::page::wait_present;

impl Funnel<'_> {
    /// On the home page, checks the account widget for the "not logged in"
    /// marker. On the sign-in page, never. Anywhere else, assumes yes.
    pub fn is_logged_in(&self) -> Result<bool> {
        let site = &self.config.site;
        let location = self.page.location()?;
        if same_location(&location, &site.base_url) {
            let timing = &self.config.timing;
            let widget = match wait_present(
                self.page,
                &site.locators.login,
                timing.element_timeout,
                timing.poll_interval,
            ) {
                Ok(widget) => widget,
                Err(_) => return Ok(false),
            };
            Ok(self
                .page
                .text(&widget)
                .map(|text| !text.contains(&site.patterns.not_logged_in))
                .unwrap_or(false))
        } else {
            Ok(!location.contains(&site.patterns.auth_url))
        }
    }

    /// Blocks until the operator has logged in, alerting once per alert
    /// period, then stores the session for later runs.
    pub fn ensure_authenticated(&self) -> Result<()> {
        if self.is_logged_in()? {
            log::debug!("Already logged in");
            return Ok(());
        }

        let timing = &self.config.timing;
        log::info!("[*] Waiting for user login...");
        let logged_in = self
            .poll(timing.poll_interval, timing.auth_timeout)
            .alerting_every(timing.alert_period)
            .until_alerting(
                || Ok::<_, Error>(self.is_logged_in()?.then_some(())),
                |_| self.operator.alert("Log in to proceed", Urgency::Attention),
            )?;
        if logged_in.is_none() {
            return Err(Error::AuthTimeout {
                waited: timing.auth_timeout,
            });
        }

        log::info!("[✓] Logged in");
        self.store_session();
        Ok(())
    }

    fn store_session(&self) {
        let saved = self
            .page
            .export_session()
            .and_then(|data| self.sessions.save(&data));
        if let Err(e) = saved {
            log::error!("[!] Failed to store session data: {:#}", e);
        }
    }

    /// Opens the home page and logs in, from the stored session when there is
    /// one and `force_login` is not set.
    pub fn login_flow(&self, force_login: bool) -> Result<()> {
        let base_url = &self.config.site.base_url;
        log::info!("[*] Navigating to {}", base_url);
        self.page.navigate_to(base_url)?;

        let stored = if force_login {
            None
        } else {
            self.sessions.load().unwrap_or_else(|e| {
                log::warn!("[!] Could not read stored session: {:#}", e);
                None
            })
        };

        let Some(data) = stored else {
            return self.ensure_authenticated();
        };
        log::info!(
            "[*] Loading {} cookies, {} localStorage and {} sessionStorage values",
            data.cookies.len(),
            data.local_storage.len(),
            data.session_storage.len()
        );
        self.page.import_session(&data)?;
        self.page.refresh()?;
        if self.is_logged_in()? {
            log::info!("[✓] Successfully logged in via stored session data");
            Ok(())
        } else {
            log::error!("[!] Error logging in with stored session data");
            self.ensure_authenticated()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::locator::Locator;
    use crate::page::Page;
    use crate::session::SessionData;
    use crate::testing::Harness;

    fn account_widget(h: &Harness, text: &str) -> crate::page::ElementHandle {
        let widget = h.page.add("https://shop/", Locator::id("nav-link-accountList"));
        h.page.set_text(&widget, text);
        widget
    }

    fn stored() -> SessionData {
        SessionData {
            local_storage: [("csm-hit".to_string(), "tb:1".to_string())].into(),
            ..SessionData::default()
        }
    }

    #[test]
    fn home_page_widget_decides_login_state() {
        let h = Harness::new();
        h.page.set_location("https://shop/?ref=nav_logo");
        let widget = account_widget(&h, "Hello, Sign in\nAccount & Lists");
        assert!(!h.funnel().is_logged_in().unwrap());

        h.page.set_text(&widget, "Hello, Jo\nAccount & Lists");
        assert!(h.funnel().is_logged_in().unwrap());

        h.page.set_location("https://shop/ap/signin?openid=x");
        assert!(!h.funnel().is_logged_in().unwrap());
        h.page.set_location("https://shop/cart");
        assert!(h.funnel().is_logged_in().unwrap());
    }

    #[test]
    fn already_logged_in_skips_wait_and_save() {
        let h = Harness::new();
        h.funnel().ensure_authenticated().unwrap();
        assert_eq!(h.store.saves.get(), 0);
        assert!(h.operator.alert_messages().is_empty());
    }

    #[test]
    fn login_timeout_alerts_once_per_period() {
        let h = Harness::new();
        h.page.set_location("https://shop/ap/signin");
        let err = h.funnel().ensure_authenticated().unwrap_err();
        assert!(matches!(err, Error::AuthTimeout { .. }));
        // Bound is far shorter than the alert period: only minute zero alerts.
        assert_eq!(h.operator.alert_messages(), vec!["Log in to proceed"]);
        assert_eq!(h.store.saves.get(), 0);
    }

    #[test]
    fn fresh_login_is_stored() {
        let h = Harness::new();
        h.page.set_location("https://shop/ap/signin");
        h.page.schedule_location(3, "https://shop/?ref=signin");
        account_widget(&h, "Hello, Jo");
        h.page.set_session(stored());

        h.funnel().ensure_authenticated().unwrap();
        assert_eq!(*h.store.data.borrow(), Some(stored()));
    }

    #[test]
    fn stored_session_is_reused() {
        let h = Harness::new();
        *h.store.data.borrow_mut() = Some(stored());
        account_widget(&h, "Hello, Jo");

        h.funnel().login_flow(false).unwrap();
        assert_eq!(h.page.navigations(), vec!["https://shop/"]);
        assert_eq!(h.page.imported(), Some(stored()));
        assert_eq!(h.page.refreshes(), 1);
        assert_eq!(h.store.saves.get(), 0);
    }

    #[test]
    fn stale_stored_session_falls_back_to_manual_login() {
        let h = Harness::new();
        *h.store.data.borrow_mut() = Some(stored());
        let widget = account_widget(&h, "Hello, Sign in");
        let page = &h.page;
        page.on_refresh({
            let widget = widget.clone();
            move |p| {
                // Session cookies were rejected; the operator logs in by hand.
                p.set_location("https://shop/ap/signin");
                p.schedule_location(4, "https://shop/");
                p.set_text(&widget, "Hello, Jo");
            }
        });

        h.funnel().login_flow(false).unwrap();
        assert_eq!(h.store.saves.get(), 1);
        assert_eq!(h.operator.alert_messages(), vec!["Log in to proceed"]);
        assert_eq!(page.location().unwrap(), "https://shop/");
    }

    #[test]
    fn forced_login_ignores_stored_session() {
        let h = Harness::new();
        *h.store.data.borrow_mut() = Some(stored());
        account_widget(&h, "Hello, Jo");

        h.funnel().login_flow(true).unwrap();
        assert!(h.page.imported().is_none());
    }
}
