//! Declarative element descriptions and location helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Describes how to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    XPath(String),
    Id(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    /// Replaces `{name}` placeholders in the selector text.
    pub fn fill(&self, name: &str, value: &str) -> Locator {
        let key = format!("{{{name}}}");
        match self {
            Locator::Css(s) => Locator::Css(s.replace(&key, value)),
            Locator::XPath(s) => Locator::XPath(s.replace(&key, value)),
            Locator::Id(s) => Locator::Id(s.replace(&key, value)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css '{s}'"),
            Locator::XPath(s) => write!(f, "xpath '{s}'"),
            Locator::Id(s) => write!(f, "id '{s}'"),
        }
    }
}

/// One locator or an ordered list of alternatives, any one of which will do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "OneOrMany")]
pub struct LocatorSet(Vec<Locator>);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Locator),
    Many(Vec<Locator>),
}

impl From<OneOrMany> for LocatorSet {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(l) => LocatorSet(vec![l]),
            OneOrMany::Many(ls) => LocatorSet(ls),
        }
    }
}

impl From<LocatorSet> for OneOrMany {
    fn from(mut value: LocatorSet) -> Self {
        if value.0.len() == 1 {
            OneOrMany::One(value.0.remove(0))
        } else {
            OneOrMany::Many(value.0)
        }
    }
}

impl From<Locator> for LocatorSet {
    fn from(locator: Locator) -> Self {
        LocatorSet(vec![locator])
    }
}

impl LocatorSet {
    pub fn new(alternatives: Vec<Locator>) -> Self {
        LocatorSet(alternatives)
    }

    pub fn alternatives(&self) -> &[Locator] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LocatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|l| l.to_string()).collect();
        write!(f, "[{}]", parts.join(" | "))
    }
}

/// Removes the query string (and fragment) from a URL.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Returns the first destination that appears in `location` once its query
/// string is removed.
pub fn match_destination<'d>(location: &str, destinations: &'d [String]) -> Option<&'d str> {
    let location = strip_query(location);
    destinations
        .iter()
        .find(|d| location.contains(d.as_str()))
        .map(String::as_str)
}

/// Compares two URLs ignoring query strings and trailing slashes.
pub fn same_location(a: &str, b: &str) -> bool {
    strip_query(a).trim_end_matches('/') == strip_query(b).trim_end_matches('/')
}
