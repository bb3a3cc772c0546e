//! Selecting a slot and driving the checkout route to the confirmation page.

use crate::config::CHECKOUT;
use crate::error::{Error, Result};
use crate::funnel::Funnel;
use crate::nav::{NavOptions, RouteOutcome};
use crate::notify::Urgency;
use crate::page::click_when_enabled;
use crate::slots::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckoutState {
    Selecting,
    Navigating,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutResult {
    /// The order went through using this slot.
    Completed { slot: String },
    /// Every slot disappeared before an order could be placed.
    Abandoned,
}

impl Funnel<'_> {
    /// Tries the best slot, and if the funnel bounces back to slot select,
    /// the best of whatever is left, until an order is placed or nothing is.
    ///
    /// Once an order is placed nothing here runs again.
    pub fn checkout(&self, mut slots: Vec<Slot>) -> Result<CheckoutResult> {
        let route = self.route(CHECKOUT)?;
        let mut state = CheckoutState::Selecting;
        let mut chosen = String::new();
        log::info!("[*] Attempting to select slot and checkout");

        loop {
            state = match state {
                CheckoutState::Selecting => {
                    let Some(slot) = slots.first() else {
                        log::warn!("[!] No slots left to try");
                        return Ok(CheckoutResult::Abandoned);
                    };
                    match self.select_slot(slot) {
                        Ok(()) => {
                            chosen = slot.full_name();
                            CheckoutState::Navigating
                        }
                        Err(Error::StaleSlot { name }) => {
                            log::warn!("[!] Slot '{}' went stale, rescanning", name);
                            slots = self.scan_slots()?;
                            CheckoutState::Selecting
                        }
                        Err(e) => return Err(e),
                    }
                }
                CheckoutState::Navigating => match self.navigate(route, NavOptions::default()) {
                    RouteOutcome::Completed => {
                        self.operator.alert("Checkout complete", Urgency::Success);
                        CheckoutState::Done
                    }
                    RouteOutcome::RestartRequested => {
                        log::warn!("[!] Checkout failed: Redirected to slot select");
                        slots = self.scan_slots()?;
                        if slots.is_empty() {
                            log::warn!("[!] No slots left after redirect, giving up on checkout");
                            return Ok(CheckoutResult::Abandoned);
                        }
                        CheckoutState::Selecting
                    }
                    RouteOutcome::Failed(e) => return Err(e),
                },
                CheckoutState::Done => {
                    log::info!("[✓] Checked out using slot: {}", chosen);
                    return Ok(CheckoutResult::Completed { slot: chosen });
                }
            };
        }
    }

    /// Picks the payment row for the preferred card, leaving the site's
    /// default alone when there is none or it cannot be found.
    pub(crate) fn select_payment_method(&self) -> Result<()> {
        let locators = &self.config.site.locators;
        let timing = &self.config.timing;
        match self.config.options.preferred_card.as_deref() {
            None => log::warn!("[!] Preferred card not provided"),
            Some(card) => {
                for row in self.page.find_all(&locators.payment_row)? {
                    let Some(number) = self.page.find_within(&row, &locators.card_number)?.pop() else {
                        continue;
                    };
                    if !self.page.text(&number)?.trim().ends_with(card) {
                        continue;
                    }
                    let Some(radio) = self.page.find_within(&row, &locators.card_select)?.pop() else {
                        continue;
                    };
                    log::info!("[*] Selecting card ending in '{}'", card);
                    return click_when_enabled(
                        self.page,
                        &radio,
                        timing.click_timeout,
                        timing.poll_interval,
                        timing.intercept_retry_delay,
                    );
                }
                log::warn!("[!] Card ending in '{}' not found.", card);
            }
        }
        log::warn!("[!] Using default payment method");
        Ok(())
    }
}
