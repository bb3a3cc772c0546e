//! Best-effort files left behind for the operator: markup dumps, removed
//! cart items and cart snapshots.

use crate::funnel::Funnel;
use crate::locator::{strip_query, Locator};
use crate::page::{wait_present, ElementHandle, Page};
use crate::poll::jitter;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// UTC, compact ISO-8601; safe in file names.
pub fn timestamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

/// The path part of a URL, without scheme, host or query string.
fn url_path(url: &str) -> &str {
    let url = strip_query(url);
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.find('/').map_or("", |i| &rest[i..])
}

/// Writes the current markup to `source_dump<path>_<timestamp>.html`.
pub fn dump_source(page: &dyn Page, dir: &Path) -> anyhow::Result<PathBuf> {
    let url = page.current_url()?;
    let name = url_path(&url).replace('/', "-").replace(".html", "");
    let path = dir.join(format!("source_dump{}_{}.html", name, timestamp()));
    log::info!("[*] Dumping page source to: {:?}", path);
    fs::write(&path, page.page_source()?)?;
    Ok(path)
}

fn write_toml<T: Serialize>(path: PathBuf, value: &T) -> anyhow::Result<PathBuf> {
    fs::write(&path, toml::to_string_pretty(value)?)?;
    Ok(path)
}

#[derive(Debug, Serialize)]
struct RemovedItem {
    text: String,
    product_id: String,
}

#[derive(Debug, Serialize)]
struct RemovedItems {
    items: Vec<RemovedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItem {
    pub name: String,
    pub quantity: String,
    pub price: String,
    pub product_id: String,
    pub link: String,
}

#[derive(Debug, Serialize)]
struct Cart {
    cart_item: Vec<CartItem>,
}

impl Funnel<'_> {
    /// Dumps the current markup into the output directory, logging failures.
    pub fn dump_source(&self) -> Option<PathBuf> {
        match dump_source(self.page, &self.config.output_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                log::error!("[!] Failed to dump page source: {:#}", e);
                None
            }
        }
    }

    /// Records the items an out-of-stock page says were removed.
    pub(crate) fn save_removed_items(&self) -> anyhow::Result<Option<PathBuf>> {
        let site = &self.config.site;
        let mut items = Vec::new();
        for row in self.page.find_all(&site.locators.oos_item)? {
            let text = self.page.text(&row)?;
            let Some((before, _)) = text.split_once(&site.patterns.oos) else {
                continue;
            };
            let product_id = match self.first_within(&row, &site.locators.oos_item_id)? {
                Some(input) => self.page.attribute(&input, "value")?.unwrap_or_default(),
                None => String::new(),
            };
            items.push(RemovedItem {
                text: before.trim().to_string(),
                product_id,
            });
        }

        if items.is_empty() {
            log::warn!("[!] Couldn't detect any removed items to save");
            return Ok(None);
        }
        let path = self
            .config
            .output_dir
            .join(format!("removed_items_{}.toml", timestamp()));
        log::info!("[*] Writing {} removed items to: {:?}", items.len(), path);
        write_toml(path, &RemovedItems { items }).map(Some)
    }

    /// Visits the cart and writes its line items, sorted by product id, to
    /// `<service>_cart.toml`.
    pub fn save_cart(&self) -> anyhow::Result<PathBuf> {
        let site = &self.config.site;
        let timing = &self.config.timing;
        jitter(timing.click_jitter, timing.jitter_pct);
        self.page.navigate_to(&site.cart_url())?;
        wait_present(
            self.page,
            &site.locators.cart_item.clone().into(),
            timing.element_timeout,
            timing.poll_interval,
        )?;

        let mut cart = Vec::new();
        for row in self.page.find_all(&site.locators.cart_item)? {
            match self.read_cart_item(&row) {
                Ok(item) => cart.push(item),
                Err(e) => log::warn!("[!] Failed to parse a cart item: {:#}", e),
            }
        }
        cart.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        let path = self
            .config
            .output_dir
            .join(format!("{}_cart.toml", self.config.service.replace(' ', "")));
        log::info!("[*] Writing {} cart items to: {:?}", cart.len(), path);
        write_toml(path, &Cart { cart_item: cart })
    }

    fn read_cart_item(&self, row: &ElementHandle) -> anyhow::Result<CartItem> {
        let locators = &self.config.site.locators;
        let text = |locator: &Locator| -> anyhow::Result<String> {
            let el = self
                .first_within(row, locator)?
                .ok_or_else(|| anyhow::anyhow!("cart item has no {}", locator))?;
            Ok(self.page.text(&el)?.trim().to_string())
        };
        let link = match self.first_within(row, &locators.cart_link)? {
            Some(el) => self.page.attribute(&el, "href")?.unwrap_or_default(),
            None => String::new(),
        };
        Ok(CartItem {
            name: text(&locators.cart_title)?,
            quantity: text(&locators.cart_quantity)?,
            price: text(&locators.cart_price)?,
            product_id: self.page.attribute(row, "data-asin")?.unwrap_or_default(),
            link,
        })
    }

    fn first_within(
        &self,
        scope: &ElementHandle,
        locator: &Locator,
    ) -> anyhow::Result<Option<ElementHandle>> {
        Ok(self.page.find_within(scope, locator)?.into_iter().next())
    }
}
