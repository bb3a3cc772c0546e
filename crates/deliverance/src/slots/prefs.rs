//! Operator slot preferences and how they rank what the page offers.

use indexmap::IndexMap;

/// Lowercases and drops all whitespace so labels compare loosely.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_any(s: &str) -> bool {
    normalize(s) == "any"
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preference {
    /// `day::window`; matches slot names starting with it.
    Exact(String),
    /// Any window on this day.
    Day(String),
    /// This window on any day.
    Window(String),
}

impl Preference {
    pub fn matches(&self, normalized_name: &str) -> bool {
        match self {
            Preference::Exact(token) | Preference::Day(token) => normalized_name.starts_with(token),
            Preference::Window(window) => normalized_name.contains(&format!("::{window}")),
        }
    }
}

/// How the scanner filters and orders available slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SlotPreferences {
    /// Nothing configured: every available slot, in page order.
    #[default]
    All,
    /// Any day, any time: the first available slot only.
    FirstAvailable,
    /// Buckets in priority order.
    Ranked(Vec<Preference>),
}

impl SlotPreferences {
    /// Builds preferences from the `[slot_preference]` table, where each key
    /// is a day (or "Any") and each value lists windows (or "Any").
    pub fn from_table(table: &IndexMap<String, Vec<String>>) -> Self {
        let tokens: Vec<String> = table
            .iter()
            .flat_map(|(day, windows)| windows.iter().map(move |w| format!("{day}::{w}")))
            .collect();
        Self::from_tokens(&tokens)
    }

    /// Builds preferences from `day::window` tokens. A bare token is a day;
    /// "any" in either position is a wildcard.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut prefs = Vec::new();
        for token in tokens {
            let token = token.as_ref();
            let (day, window) = match token.split_once("::") {
                Some((d, w)) => (d, w),
                None => (token, "any"),
            };
            match (is_any(day), is_any(window)) {
                (true, true) => {
                    log::info!(
                        "'Any' day, 'Any' time specified. Will look for first available slot"
                    );
                    return SlotPreferences::FirstAvailable;
                }
                (false, true) => prefs.push(Preference::Day(normalize(day))),
                (true, false) => prefs.push(Preference::Window(normalize(window))),
                (false, false) => prefs.push(Preference::Exact(normalize(&format!("{day}::{window}")))),
            }
        }
        if prefs.is_empty() {
            SlotPreferences::All
        } else {
            SlotPreferences::Ranked(prefs)
        }
    }

    /// Indices into `names` (full slot names, page order) of the slots to
    /// offer, best first. A slot appears at most once, in its best bucket.
    pub fn select(&self, names: &[String]) -> Vec<usize> {
        match self {
            SlotPreferences::All => (0..names.len()).collect(),
            SlotPreferences::FirstAvailable => (0..names.len().min(1)).collect(),
            SlotPreferences::Ranked(prefs) => {
                let normalized: Vec<String> = names.iter().map(|n| normalize(n)).collect();
                let mut picked = Vec::new();
                for pref in prefs {
                    for (i, name) in normalized.iter().enumerate() {
                        if pref.matches(name) && !picked.contains(&i) {
                            picked.push(i);
                        }
                    }
                }
                picked
            }
        }
    }
}
