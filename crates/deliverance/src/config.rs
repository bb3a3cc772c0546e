//! Configuration: built-in site topologies layered with the user's conf.toml.

use crate::error::{Error, Result};
use crate::locator::{Locator, LocatorSet};
use crate::slots::prefs::SlotPreferences;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SITES: &str = include_str!("sites.toml");

pub const SLOT_SELECT: &str = "SLOT_SELECT";
pub const CHECKOUT: &str = "CHECKOUT";

/// URL fragments and page text that identify special pages.
#[derive(Debug, Clone, Deserialize)]
pub struct Patterns {
    pub auth_url: String,
    pub oos_url: String,
    pub throttle_url: String,
    pub not_logged_in: String,
    pub oos: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteLocators {
    pub login: LocatorSet,
    pub oos_item: Locator,
    pub oos_item_id: Locator,
    pub oos_continue: LocatorSet,
    pub throttle_continue: LocatorSet,
    pub payment_row: Locator,
    pub card_number: Locator,
    pub card_select: Locator,
    pub cart_item: Locator,
    pub cart_title: Locator,
    pub cart_quantity: Locator,
    pub cart_price: Locator,
    pub cart_link: Locator,
}

/// Locators for one of the two delivery-slot widgets.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotLocators {
    pub container: LocatorSet,
    /// Available slots only.
    pub slot: Locator,
    pub date_group: Locator,
    pub date_element: Locator,
    pub day_of_week: Locator,
    pub month_day: Locator,
    pub time_window: Locator,
    pub price: Locator,
    pub select_button: Locator,
    #[serde(default)]
    pub delivery_type: Option<Locator>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotLayouts {
    pub single: SlotLocators,
    pub multi: SlotLocators,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaypointConfig {
    pub locator: LocatorSet,
    #[serde(deserialize_with = "one_or_many")]
    pub dest: Vec<String>,
    #[serde(default)]
    pub pre_action: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub start: String,
    pub waypoints: Vec<WaypointConfig>,
}

/// Everything the engine knows about one service's website.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub base_url: String,
    pub cart_endpoint: String,
    pub patterns: Patterns,
    pub locators: SiteLocators,
    pub slots: SlotLayouts,
    pub routes: IndexMap<String, RouteConfig>,
}

impl SiteConfig {
    /// Resolves a path relative to the base URL; absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        }
    }

    pub fn cart_url(&self) -> String {
        self.url(&self.cart_endpoint)
    }

    pub fn route(&self, name: &str) -> Result<&RouteConfig> {
        self.routes
            .get(name)
            .ok_or_else(|| Error::Config(format!("route '{name}' is not defined")))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Options {
    pub checkout: bool,
    pub ignore_oos: bool,
    pub save_cart: bool,
    pub preferred_card: Option<String>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    pub sid: String,
    pub token: String,
    pub from_num: String,
    pub to_num: String,
}

/// Every bound the engine waits on.
#[derive(Debug, Clone)]
pub struct Timing {
    pub nav_timeout: Duration,
    pub element_timeout: Duration,
    pub click_timeout: Duration,
    pub poll_interval: Duration,
    pub intercept_retry_delay: Duration,
    pub auth_timeout: Duration,
    pub oos_timeout: Duration,
    pub throttle_timeout: Duration,
    pub throttle_continue_timeout: Duration,
    /// Operator alerts during a wait repeat at most once per period.
    pub alert_period: Duration,
    pub refresh_interval: Duration,
    pub click_jitter: Duration,
    pub jitter_pct: u32,
    pub max_route_restarts: usize,
    pub max_waypoint_retries: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(20),
            element_timeout: Duration::from_secs(5),
            click_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            intercept_retry_delay: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(10 * 60),
            oos_timeout: Duration::from_secs(10 * 60),
            throttle_timeout: Duration::from_secs(10 * 60),
            throttle_continue_timeout: Duration::from_secs(60),
            alert_period: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(25),
            click_jitter: Duration::from_millis(400),
            jitter_pct: 20,
            max_route_restarts: 3,
            max_waypoint_retries: 3,
        }
    }
}

impl Timing {
    /// Millisecond bounds and no sleeping, for driving scripted pages.
    pub fn immediate() -> Self {
        Self {
            nav_timeout: Duration::from_millis(30),
            element_timeout: Duration::from_millis(30),
            click_timeout: Duration::from_millis(30),
            poll_interval: Duration::ZERO,
            intercept_retry_delay: Duration::ZERO,
            auth_timeout: Duration::from_millis(50),
            oos_timeout: Duration::from_millis(50),
            throttle_timeout: Duration::from_millis(50),
            throttle_continue_timeout: Duration::from_millis(30),
            alert_period: Duration::from_secs(60),
            refresh_interval: Duration::ZERO,
            click_jitter: Duration::ZERO,
            jitter_pct: 0,
            max_route_restarts: 3,
            max_waypoint_retries: 3,
        }
    }
}

/// The layout of conf.toml.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserFile {
    options: Options,
    slot_preference: IndexMap<String, Vec<String>>,
    telegram: Option<TelegramConfig>,
    twilio: Option<TwilioConfig>,
    site: Option<toml::Value>,
}

/// Fully resolved configuration, built once at start-up and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub service: String,
    pub site: SiteConfig,
    pub options: Options,
    pub timing: Timing,
    pub preferences: SlotPreferences,
    pub telegram: Option<TelegramConfig>,
    pub twilio: Option<TwilioConfig>,
    /// Where diagnostic dumps and cart records are written.
    pub output_dir: PathBuf,
}

impl Config {
    /// Loads the service definition, layering `path` over it when it exists.
    pub fn load(service: &str, path: Option<&Path>) -> Result<Self> {
        let user = match path {
            Some(p) if p.exists() => {
                log::info!("Reading configuration from {:?}", p);
                std::fs::read_to_string(p)?
            }
            Some(p) => {
                log::warn!("[!] Config file {:?} not found, using defaults", p);
                String::new()
            }
            None => String::new(),
        };
        Self::from_toml(service, &user)
    }

    /// Builds a config from the contents of a conf.toml.
    pub fn from_toml(service: &str, user_toml: &str) -> Result<Self> {
        let user: UserFile = toml::from_str(user_toml)
            .map_err(|e| Error::Config(format!("invalid conf.toml: {e}")))?;

        let mut site = builtin_site(service)?;
        if let Some(layer) = &user.site {
            deep_merge(&mut site, layer);
        }
        let site: SiteConfig = site
            .try_into()
            .map_err(|e| Error::Config(format!("invalid site definition: {e}")))?;
        validate_site(&site)?;

        let mut timing = Timing::default();
        if let Some(secs) = user.options.interval_secs {
            timing.refresh_interval = Duration::from_secs(secs);
        }

        Ok(Self {
            service: service.to_string(),
            site,
            options: user.options,
            timing,
            preferences: SlotPreferences::from_table(&user.slot_preference),
            telegram: user.telegram,
            twilio: user.twilio,
            output_dir: PathBuf::from("."),
        })
    }
}

/// Names of the services with a built-in definition.
pub fn services() -> Vec<String> {
    sites_table()
        .ok()
        .and_then(|v| v.get("services").and_then(|s| s.as_table()).cloned())
        .map(|t| t.keys().cloned().collect())
        .unwrap_or_default()
}

fn sites_table() -> Result<toml::Value> {
    toml::from_str(SITES).map_err(|e| Error::Config(format!("built-in sites.toml: {e}")))
}

fn builtin_site(service: &str) -> Result<toml::Value> {
    let sites = sites_table()?;
    let mut site = sites
        .get("services")
        .and_then(|s| s.get(service))
        .cloned()
        .ok_or_else(|| {
            Error::Config(format!(
                "unknown service '{service}' (expected one of: {})",
                services().join(", ")
            ))
        })?;
    if let (Some(layouts), toml::Value::Table(table)) = (sites.get("slot_layouts"), &mut site) {
        if !table.contains_key("slots") {
            table.insert("slots".to_string(), layouts.clone());
        }
    }
    Ok(site)
}

/// Recursively merges `layer` into `base`; tables merge, everything else replaces.
fn deep_merge(base: &mut toml::Value, layer: &toml::Value) {
    match (base, layer) {
        (toml::Value::Table(base), toml::Value::Table(layer)) => {
            for (key, value) in layer {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, layer) => *base = layer.clone(),
    }
}

fn validate_site(site: &SiteConfig) -> Result<()> {
    for name in [SLOT_SELECT, CHECKOUT] {
        let route = site.route(name)?;
        if route.waypoints.is_empty() {
            return Err(Error::Config(format!("route '{name}' has no waypoints")));
        }
        for (i, w) in route.waypoints.iter().enumerate() {
            if w.dest.is_empty() || w.dest.iter().any(|d| d.is_empty()) {
                return Err(Error::Config(format!(
                    "waypoint {} of route '{name}' has no destination",
                    i + 1
                )));
            }
            if w.locator.is_empty() {
                return Err(Error::Config(format!(
                    "waypoint {} of route '{name}' has no locator",
                    i + 1
                )));
            }
            if let Some(action) = &w.pre_action {
                if crate::nav::PreAction::from_name(action).is_none() {
                    return Err(Error::Config(format!(
                        "waypoint {} of route '{name}' names unknown pre-action '{action}'",
                        i + 1
                    )));
                }
            }
        }
    }
    Ok(())
}

fn one_or_many<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Dest {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Dest::deserialize(d)? {
        Dest::One(s) => vec![s],
        Dest::Many(v) => v,
    })
}
