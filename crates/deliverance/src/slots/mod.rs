//! Reading delivery slots off the slot-select page.

pub mod prefs;

use crate::config::{SlotLayouts, SlotLocators, SLOT_SELECT};
use crate::error::{Error, Result};
use crate::funnel::Funnel;
use crate::locator::Locator;
use crate::nav::redirect::{Recovery, RedirectContext};
use crate::nav::{NavOptions, RouteOutcome};
use crate::page::{click_when_enabled, find_any, wait_any_present, ElementHandle};
use prefs::SlotPreferences;
use std::fmt;

/// The two widgets the site renders slots in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLayout {
    /// One list per day, selected by first clicking the day's tab button.
    Single,
    /// Days grouped on one page, each slot offered per delivery option.
    Multi,
}

impl SlotLayout {
    pub fn detect(multi_container_present: bool) -> Self {
        if multi_container_present {
            SlotLayout::Multi
        } else {
            SlotLayout::Single
        }
    }

    pub fn locators(self, layouts: &SlotLayouts) -> &SlotLocators {
        match self {
            SlotLayout::Single => &layouts.single,
            SlotLayout::Multi => &layouts.multi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryType {
    Attended,
    Unattended,
}

impl DeliveryType {
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        if label.contains("unattended") {
            Some(DeliveryType::Unattended)
        } else if label.contains("attended") {
            Some(DeliveryType::Attended)
        } else {
            None
        }
    }
}

impl fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryType::Attended => f.write_str("attended"),
            DeliveryType::Unattended => f.write_str("unattended"),
        }
    }
}

/// A bookable window as it was on the page when scanned.
#[derive(Debug, Clone)]
pub struct Slot {
    /// Day heading, e.g. "Tomorrow".
    pub date_label: String,
    pub month_day: String,
    pub time_window: String,
    pub price: Option<String>,
    pub delivery_type: Option<DeliveryType>,
    layout: SlotLayout,
    element: ElementHandle,
    date_element: ElementHandle,
}

impl Slot {
    /// `day::window`, the name preferences match against.
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.date_label, self.time_window)
    }

    /// "Tomorrow, May 2"
    pub fn date_display(&self) -> String {
        if self.month_day.is_empty() {
            self.date_label.clone()
        } else {
            format!("{}, {}", self.date_label, self.month_day)
        }
    }

    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    pub fn element(&self) -> &ElementHandle {
        &self.element
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time_window)?;
        if let Some(price) = &self.price {
            write!(f, " - {price}")?;
        }
        if let Some(kind) = self.delivery_type {
            write!(f, " ({kind})")?;
        }
        Ok(())
    }
}

impl Funnel<'_> {
    /// Available slots on the slot-select page, filtered and ordered by the
    /// configured preferences.
    pub fn scan_slots(&self) -> Result<Vec<Slot>> {
        self.ensure_on_slot_select()?;
        let layout = self.slot_layout()?;
        let locators = layout.locators(&self.config.site.slots);

        log::info!("[*] Checking for available slots");
        let slots = self
            .page
            .find_all(&locators.slot)?
            .into_iter()
            .map(|element| self.read_slot(layout, locators, element))
            .collect::<Result<Vec<_>>>()?;
        let names: Vec<String> = slots.iter().map(Slot::full_name).collect();
        if !slots.is_empty() {
            log::info!("Found {} slots: \n{}", slots.len(), names.join("\n"));
        }

        let preferences = &self.config.preferences;
        if slots.is_empty() || *preferences == SlotPreferences::All {
            return Ok(slots);
        }
        log::info!("[*] Comparing available slots to prefs");
        let picked: Vec<Slot> = preferences
            .select(&names)
            .into_iter()
            .map(|i| slots[i].clone())
            .collect();
        if !picked.is_empty() {
            let names: Vec<String> = picked.iter().map(Slot::full_name).collect();
            log::info!("Found {} preferred slots: \n{}", picked.len(), names.join("\n"));
        }
        Ok(picked)
    }

    /// Clicks what it takes to choose `slot`. Fails with `StaleSlot` if the
    /// page has changed since the scan.
    pub fn select_slot(&self, slot: &Slot) -> Result<()> {
        if self.page.is_stale(&slot.element)? {
            return Err(Error::StaleSlot {
                name: slot.full_name(),
            });
        }
        log::info!("[*] Selecting slot: {}", slot.full_name());
        let timing = &self.config.timing;
        let click = |element: &ElementHandle| {
            click_when_enabled(
                self.page,
                element,
                timing.click_timeout,
                timing.poll_interval,
                timing.intercept_retry_delay,
            )
        };

        let locators = slot.layout.locators(&self.config.site.slots);
        if slot.layout == SlotLayout::Single {
            click(&slot.date_element)?;
        }
        let button = self.child(&slot.element, &locators.select_button)?;
        click(&button)
    }

    fn ensure_on_slot_select(&self) -> Result<()> {
        let route = self.route(SLOT_SELECT)?;
        let max_attempts = self.config.timing.max_route_restarts + 1;
        let mut attempts = 0;
        loop {
            let location = self.page.location()?;
            if route.terminal().check_current(&location).is_some() {
                return Ok(());
            }
            if attempts >= max_attempts {
                return Err(Error::unhandled(location, "could not reach the slot select page"));
            }
            attempts += 1;

            match self.handle_redirect(&RedirectContext::default()) {
                Ok(Recovery::Retry) => continue,
                Ok(Recovery::Restart) | Err(Error::Unhandled { .. }) => {}
                Err(e) => return Err(e),
            }
            match self.navigate(route, NavOptions::retrying()) {
                RouteOutcome::Completed | RouteOutcome::RestartRequested => {}
                RouteOutcome::Failed(e) => return Err(e),
            }
        }
    }

    fn slot_layout(&self) -> Result<SlotLayout> {
        let layouts = &self.config.site.slots;
        let timing = &self.config.timing;
        wait_any_present(
            self.page,
            &[&layouts.single.container, &layouts.multi.container],
            timing.element_timeout,
            timing.poll_interval,
        )?;
        if let Some(layout) = self.layout.get() {
            return Ok(layout);
        }

        log::info!("[*] Determining delivery slot type");
        let layout = SlotLayout::detect(!find_any(self.page, &layouts.multi.container)?.is_empty());
        if layout == SlotLayout::Multi {
            log::warn!("[!] Detected multiple delivery option slot container");
        }
        self.layout.set(Some(layout));
        Ok(layout)
    }

    fn read_slot(
        &self,
        layout: SlotLayout,
        locators: &SlotLocators,
        element: ElementHandle,
    ) -> Result<Slot> {
        let date_element = self.date_element(layout, locators, &element)?;
        let delivery_type = match (&locators.delivery_type, layout) {
            (Some(locator), SlotLayout::Multi) => self
                .child_text(&element, locator)?
                .as_deref()
                .and_then(DeliveryType::parse),
            _ => None,
        };
        Ok(Slot {
            date_label: self.required_text(&date_element, &locators.day_of_week)?,
            month_day: self.child_text(&date_element, &locators.month_day)?.unwrap_or_default(),
            time_window: self.required_text(&element, &locators.time_window)?,
            price: self.child_text(&element, &locators.price)?,
            delivery_type,
            layout,
            element,
            date_element,
        })
    }

    /// The day header a slot belongs to. It must be unique; a page where it
    /// is not is never guessed at.
    fn date_element(
        &self,
        layout: SlotLayout,
        locators: &SlotLocators,
        slot: &ElementHandle,
    ) -> Result<ElementHandle> {
        let mut groups = self.page.find_ancestors(slot, &locators.date_group)?;
        if groups.len() > 1 {
            log::warn!("[!] Multiple ancestors found with {}", locators.date_group);
        }
        let Some(group) = groups.pop() else {
            return Err(Error::SlotDateElementAmbiguous { found: 0 });
        };

        let mut candidates = match layout {
            SlotLayout::Single => {
                let id = self.page.attribute(&group, "id")?.unwrap_or_default();
                self.page.find_all(&locators.date_element.fill("group_id", &id))?
            }
            SlotLayout::Multi => self.page.find_within(&group, &locators.date_element)?,
        };
        if candidates.len() != 1 {
            return Err(Error::SlotDateElementAmbiguous {
                found: candidates.len(),
            });
        }
        Ok(candidates.remove(0))
    }

    fn child(&self, scope: &ElementHandle, locator: &Locator) -> Result<ElementHandle> {
        let found = self.page.find_within(scope, locator)?;
        if found.len() > 1 {
            log::debug!("Multiple children found with {}", locator);
        }
        found.into_iter().next().ok_or_else(|| Error::MissingElement {
            locator: locator.to_string(),
        })
    }

    fn child_text(&self, scope: &ElementHandle, locator: &Locator) -> Result<Option<String>> {
        let Some(child) = self.page.find_within(scope, locator)?.into_iter().next() else {
            return Ok(None);
        };
        let text = self.page.text(&child)?.trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }

    fn required_text(&self, scope: &ElementHandle, locator: &Locator) -> Result<String> {
        self.child_text(scope, locator)?
            .ok_or_else(|| Error::MissingElement {
                locator: locator.to_string(),
            })
    }
}
