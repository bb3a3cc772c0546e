//! The top-level polling loop: log in, watch the slot page, tell the
//! operator, and check out when asked to.

use crate::checkout::CheckoutResult;
use crate::config::SLOT_SELECT;
use crate::error::{Error, Result};
use crate::funnel::Funnel;
use crate::nav::{NavOptions, RouteOutcome};
use crate::notify::Urgency;
use crate::poll::jittered;
use crate::slots::Slot;

/// How a run of the polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Slots were found and the operator was told; nothing was bought.
    Notified,
    CheckedOut { slot: String },
    /// Interrupted by the operator.
    Cancelled,
}

/// Text sent to the remote channels: a headline, then slots grouped under
/// their day, then the slot checkout will use.
pub fn generate_message(service: &str, slots: &[Slot], checkout: bool) -> Option<String> {
    let first = slots.first()?;
    let mut lines = vec![format!("{service} delivery slots found!")];
    let mut dates: Vec<String> = Vec::new();
    for slot in slots {
        let date = slot.date_display();
        if !dates.contains(&date) {
            lines.push(String::new());
            lines.push(date.clone());
            dates.push(date);
        }
        lines.push(slot.to_string());
    }
    if checkout {
        lines.push("\nWill attempt to checkout using slot:".to_string());
        lines.push(first.full_name());
    }
    Some(lines.join("\n"))
}

impl Funnel<'_> {
    /// Runs until slots are found and dealt with, a fatal error occurs or
    /// the funnel's cancellation token fires.
    pub fn run(&self, force_login: bool) -> Result<RunOutcome> {
        match self.watch(force_login) {
            Err(Error::Cancelled) => {
                log::warn!("[!] Run cancelled");
                Ok(RunOutcome::Cancelled)
            }
            other => other,
        }
    }

    fn watch(&self, force_login: bool) -> Result<RunOutcome> {
        self.login_flow(force_login)?;
        if self.config.options.save_cart {
            if let Err(e) = self.save_cart() {
                log::error!("[!] Failed to save cart items: {:#}", e);
            }
        }

        match self.navigate_named(SLOT_SELECT, NavOptions::retrying()) {
            RouteOutcome::Completed => {}
            RouteOutcome::RestartRequested => {
                log::warn!("[!] Slot select route kept restarting, scanning anyway")
            }
            RouteOutcome::Failed(e) => return Err(e),
        }

        let auto_checkout = self.config.options.checkout;
        let mut slots = self.scan_slots()?;
        if !slots.is_empty() {
            self.operator.annoy();
        }

        loop {
            if slots.is_empty() {
                log::info!("[*] No slots found :( waiting...");
                let timing = &self.config.timing;
                if self.cancel.sleep(jittered(timing.refresh_interval, timing.jitter_pct)) {
                    return Err(Error::Cancelled);
                }
                self.page.refresh()?;
                slots = self.scan_slots()?;
                continue;
            }

            self.operator.alert("Delivery slots found", Urgency::Attention);
            if let Some(message) = generate_message(&self.config.service, &slots, auto_checkout) {
                self.operator.broadcast(&message);
            }
            if !auto_checkout {
                return Ok(RunOutcome::Notified);
            }

            // A failed checkout may leave a half-finished order on screen, so
            // errors end the run instead of polling on.
            match self.checkout(std::mem::take(&mut slots))? {
                CheckoutResult::Completed { slot } => return Ok(RunOutcome::CheckedOut { slot }),
                CheckoutResult::Abandoned => {
                    log::warn!("[!] Checkout abandoned, resuming polling");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;
    use crate::testing::{add_slot_days, Harness, SlotDay};
    use crate::utils::CancellationToken;
    use std::time::{Duration, Instant};

    const SLOT_PAGE: &str = "https://shop/slot-select";

    fn week() -> Vec<SlotDay> {
        vec![
            SlotDay::new("Today", "Oct 16", &[("5:00 PM - 7:00 PM", "FREE"), ("7:00 PM - 9:00 PM", "$4.99")]),
            SlotDay::new("Tomorrow", "Oct 17", &[("7:00 AM - 9:00 AM", "FREE")]),
        ]
    }

    fn ready(h: &Harness) {
        h.logged_in_home();
        h.shop_funnel_pages();
    }

    #[test]
    fn message_groups_slots_by_day() {
        let h = Harness::new();
        h.page.set_location(SLOT_PAGE);
        h.single_slot_page(SLOT_PAGE, &week());
        let slots = h.funnel().scan_slots().unwrap();

        let message = generate_message("Whole Foods", &slots, true).unwrap();
        assert_eq!(
            message,
            "Whole Foods delivery slots found!\n\
             \n\
             Today, Oct 16\n\
             5:00 PM - 7:00 PM - FREE\n\
             7:00 PM - 9:00 PM - $4.99\n\
             \n\
             Tomorrow, Oct 17\n\
             7:00 AM - 9:00 AM - FREE\n\
             \n\
             Will attempt to checkout using slot:\n\
             Today::5:00 PM - 7:00 PM"
        );
        assert!(generate_message("Whole Foods", &[], true).is_none());
        assert!(!generate_message("Whole Foods", &slots, false)
            .unwrap()
            .contains("Will attempt"));
    }

    #[test]
    fn slots_on_first_scan_notify_and_stop() {
        let h = Harness::new();
        ready(&h);
        h.single_slot_page(SLOT_PAGE, &week());

        let outcome = h.funnel().run(false).unwrap();
        assert_eq!(outcome, RunOutcome::Notified);
        assert_eq!(h.operator.annoyed.get(), 1);
        assert_eq!(h.operator.alert_messages(), vec!["Delivery slots found"]);
        let broadcasts = h.operator.broadcasts.borrow();
        assert_eq!(broadcasts.len(), 1);
        assert!(broadcasts[0].starts_with("Whole Foods delivery slots found!"));
    }

    #[test]
    fn polls_until_slots_appear() {
        let h = Harness::new();
        ready(&h);
        h.single_slot_page(SLOT_PAGE, &[]);
        let locators = h.config.site.slots.single.clone();
        h.page.on_refresh(move |p| {
            if p.refreshes() == 2 {
                let container = p.find_all(&locators.container.alternatives()[0]).unwrap();
                add_slot_days(p, &locators, &container[0], SLOT_PAGE, &week());
            }
        });

        let outcome = h.funnel().run(false).unwrap();
        assert_eq!(outcome, RunOutcome::Notified);
        assert_eq!(h.page.refreshes(), 2);
        assert_eq!(h.operator.annoyed.get(), 0);
        assert_eq!(h.operator.broadcasts.borrow().len(), 1);
    }

    #[test]
    fn cancellation_stops_polling() {
        let h = Harness::new();
        ready(&h);
        h.single_slot_page(SLOT_PAGE, &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h.funnel().with_cancellation(cancel).run(false).unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(h.page.refreshes(), 0);
    }

    #[test]
    fn checks_out_when_enabled() {
        let h = Harness::with_conf("[options]\ncheckout = true\n");
        ready(&h);
        h.single_slot_page(SLOT_PAGE, &week());
        h.checkout_pages();

        let outcome = h.funnel().run(false).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::CheckedOut {
                slot: "Today::5:00 PM - 7:00 PM".into()
            }
        );
        assert_eq!(
            h.operator.alert_messages(),
            vec!["Delivery slots found", "Checkout complete"]
        );
        assert!(h.operator.broadcasts.borrow()[0].contains("Will attempt to checkout"));
    }

    #[test]
    fn abandoned_checkout_resumes_polling() {
        let h = Harness::with_conf("[options]\ncheckout = true\n");
        ready(&h);
        let slot_page = h.single_slot_page(SLOT_PAGE, &week());
        let [to_pay, _, _] = h.checkout_pages();
        // Every slot is taken while checking out; new ones show up later.
        let gone = slot_page.slots.clone();
        h.page.on_click(&to_pay, move |p| {
            for slot in &gone {
                p.remove(slot);
            }
        });
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        h.page.on_refresh(move |_| stop.cancel());

        let outcome = h.funnel().with_cancellation(cancel.clone()).run(false).unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(h.page.clicks(&to_pay), 1);
        assert_eq!(h.page.refreshes(), 1);
        assert_eq!(h.operator.alert_messages(), vec!["Delivery slots found"]);
    }

    #[test]
    fn failed_checkout_ends_the_run() {
        let h = Harness::with_conf("[options]\ncheckout = true\n");
        ready(&h);
        h.single_slot_page(SLOT_PAGE, &week());
        let [to_pay, _, place] = h.checkout_pages();
        h.page.click_goes_to(&to_pay, "https://shop/errors/500");

        let err = h.funnel().run(false).unwrap_err();
        assert!(matches!(err, Error::Unhandled { .. }));
        assert_eq!(h.page.clicks(&to_pay), 1);
        assert_eq!(h.page.clicks(&place), 0);
        assert_eq!(h.operator.broadcasts.borrow().len(), 1);
    }

    #[test]
    fn interrupt_during_login_wait_ends_the_run() {
        let mut h = Harness::new();
        h.config.timing.auth_timeout = Duration::from_secs(600);
        h.page.set_location("https://shop/ap/signin");
        h.page.redirect("https://shop/", "https://shop/ap/signin");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = h.funnel().with_cancellation(cancel).run(false).unwrap();
        canceller.join().unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(h.page.navigations().iter().all(|url| !url.contains("cart")));
        assert_eq!(h.store.saves.get(), 0);
    }

    #[test]
    fn interrupt_during_navigation_ends_the_run() {
        let h = Harness::new();
        h.logged_in_home();
        h.shop_funnel_pages();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h.funnel().with_cancellation(cancel).run(false).unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(h.operator.alert_messages().is_empty());
    }
}
