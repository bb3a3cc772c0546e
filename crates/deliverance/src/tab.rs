//! [`Page`] over a live Chrome tab.
//!
//! Elements found through a tab are stamped with a `data-dlv-handle`
//! attribute; the handle is that stamp. Stamps carry a prefix picked once
//! per document, so a handle from an earlier page never matches.

use crate::locator::Locator;
use crate::page::{ClickResult, ElementHandle, Page};
use crate::session::SessionData;
use crate::utils::js_escape;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::Tab;
use std::collections::BTreeMap;
use std::sync::Arc;

const HANDLE_ATTR: &str = "data-dlv-handle";

/// Thin wrapper around a Chrome tab that drives the funnel.
pub struct ChromePage(pub Arc<Tab>);

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self(tab)
    }

    // ── Low-level JS evaluation helpers ──────────────────────────────────

    /// Evaluates JS and returns the boolean result.
    /// Returns `false` if the script returns null/undefined.
    fn eval_bool(&self, js: &str) -> anyhow::Result<bool> {
        Ok(self
            .0
            .evaluate(js, false)?
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Evaluates JS and returns the string result, or `None` if null/undefined.
    fn eval_string(&self, js: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .0
            .evaluate(js, false)?
            .value
            .and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    fn eval(&self, js: &str) -> anyhow::Result<()> {
        self.0.evaluate(js, false)?;
        Ok(())
    }

    /// Runs `nodes`, a JS expression yielding an array of elements, stamps
    /// each and returns the stamps in document order.
    fn stamp(&self, nodes: &str) -> anyhow::Result<Vec<ElementHandle>> {
        let js = format!(
            r#"(function() {{
    var nodes = {nodes};
    if (!window.__dlv_doc) {{
        window.__dlv_doc = Date.now().toString(36) + Math.random().toString(36).slice(2, 8);
        window.__dlv_seq = 0;
    }}
    return JSON.stringify(nodes.map(function(el) {{
        if (!el.hasAttribute('{HANDLE_ATTR}')) {{
            el.setAttribute('{HANDLE_ATTR}', window.__dlv_doc + '-' + (++window.__dlv_seq));
        }}
        return el.getAttribute('{HANDLE_ATTR}');
    }}));
}})()"#
        );
        let json = self.eval_string(&js)?.unwrap_or_else(|| "[]".to_string());
        let tokens: Vec<String> = serde_json::from_str(&json)?;
        Ok(tokens.into_iter().map(ElementHandle::new).collect())
    }

    /// Runs `body` with `el` bound to the stamped element, or to `null` once
    /// it has left the document.
    fn with_element(element: &ElementHandle, body: &str) -> String {
        format!(
            "(function() {{ var el = {}; {body} }})()",
            element_js(element)
        )
    }
}

fn element_js(element: &ElementHandle) -> String {
    format!(
        "document.querySelector('[{HANDLE_ATTR}=\"{}\"]')",
        js_escape(element.as_str())
    )
}

/// JS expression for the elements under `scope` matching `locator`.
fn locate_js(locator: &Locator, scope: &str) -> String {
    match locator {
        Locator::Css(sel) => format!(
            "Array.from({scope}.querySelectorAll('{}'))",
            js_escape(sel)
        ),
        Locator::Id(id) => format!(
            "Array.from({scope}.querySelectorAll('[id=\"{}\"]'))",
            js_escape(id)
        ),
        Locator::XPath(expr) => xpath_js(expr, scope),
    }
}

fn xpath_js(expr: &str, context: &str) -> String {
    format!(
        r#"(function() {{
    var snap = document.evaluate('{}', {context}, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    var out = [];
    for (var i = 0; i < snap.snapshotLength; i++) out.push(snap.snapshotItem(i));
    return out;
}})()"#,
        js_escape(expr)
    )
}

/// JS expression for the ancestors of `el` matching `locator`, nearest last.
fn ancestors_js(locator: &Locator, el: &str) -> String {
    match locator {
        // Relative steps such as `div[...]` read naturally on the ancestor axis.
        Locator::XPath(expr) => xpath_js(&format!("ancestor::{expr}"), el),
        Locator::Css(sel) => format!(
            r#"(function() {{
    var out = [];
    for (var p = {el}.parentElement; p; p = p.parentElement) if (p.matches('{}')) out.unshift(p);
    return out;
}})()"#,
            js_escape(sel)
        ),
        Locator::Id(id) => format!(
            r#"(function() {{
    var out = [];
    for (var p = {el}.parentElement; p; p = p.parentElement) if (p.id === '{}') out.unshift(p);
    return out;
}})()"#,
            js_escape(id)
        ),
    }
}

impl Page for ChromePage {
    fn current_url(&self) -> anyhow::Result<String> {
        Ok(self.0.get_url())
    }

    fn navigate_to(&self, url: &str) -> anyhow::Result<()> {
        log::debug!("Navigating to {}", url);
        self.0.navigate_to(url)?.wait_until_navigated()?;
        Ok(())
    }

    fn refresh(&self) -> anyhow::Result<()> {
        self.0.reload(false, None)?.wait_until_navigated()?;
        Ok(())
    }

    fn find_all(&self, locator: &Locator) -> anyhow::Result<Vec<ElementHandle>> {
        self.stamp(&locate_js(locator, "document"))
    }

    fn find_within(
        &self,
        scope: &ElementHandle,
        locator: &Locator,
    ) -> anyhow::Result<Vec<ElementHandle>> {
        let scope = element_js(scope);
        self.stamp(&format!(
            "(function() {{ var scope = {scope}; return scope ? {} : []; }})()",
            locate_js(locator, "scope")
        ))
    }

    fn find_ancestors(
        &self,
        element: &ElementHandle,
        locator: &Locator,
    ) -> anyhow::Result<Vec<ElementHandle>> {
        let el = element_js(element);
        self.stamp(&format!(
            "(function() {{ var el = {el}; return el ? {} : []; }})()",
            ancestors_js(locator, "el")
        ))
    }

    fn text(&self, element: &ElementHandle) -> anyhow::Result<String> {
        let js = Self::with_element(element, "return el ? el.innerText : null;");
        self.eval_string(&js)?
            .ok_or_else(|| anyhow::anyhow!("element {} is gone", element))
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> anyhow::Result<Option<String>> {
        let js = Self::with_element(
            element,
            &format!("return el ? el.getAttribute('{}') : null;", js_escape(name)),
        );
        self.eval_string(&js)
    }

    fn is_clickable(&self, element: &ElementHandle) -> anyhow::Result<bool> {
        let js = Self::with_element(
            element,
            "return !!(el && el.offsetParent !== null && !el.disabled);",
        );
        self.eval_bool(&js)
    }

    fn click(&self, element: &ElementHandle) -> anyhow::Result<ClickResult> {
        // Whatever sits at the element's centre would receive a real click.
        let js = Self::with_element(
            element,
            r#"if (!el) return 'gone';
el.scrollIntoView({block: 'center'});
var r = el.getBoundingClientRect();
var hit = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
if (hit && hit !== el && !el.contains(hit) && !hit.contains(el)) return 'intercepted';
el.click();
return 'clicked';"#,
        );
        match self.eval_string(&js)?.as_deref() {
            Some("clicked") => Ok(ClickResult::Clicked),
            Some("intercepted") => Ok(ClickResult::Intercepted),
            _ => Err(anyhow::anyhow!("element {} is gone", element)),
        }
    }

    fn is_stale(&self, element: &ElementHandle) -> anyhow::Result<bool> {
        let js = Self::with_element(element, "return !el || !document.contains(el);");
        self.eval_bool(&js)
    }

    fn page_source(&self) -> anyhow::Result<String> {
        self.0.get_content()
    }

    fn export_session(&self) -> anyhow::Result<SessionData> {
        let cookies = self
            .0
            .get_cookies()
            .map_err(|e| anyhow::anyhow!("Browser error: {}", e))?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let storage = |name: &str| -> anyhow::Result<BTreeMap<String, String>> {
            let json = self
                .eval_string(&format!("JSON.stringify(Object.assign({{}}, window.{name}))"))?
                .unwrap_or_else(|| "{}".to_string());
            Ok(serde_json::from_str(&json)?)
        };
        Ok(SessionData {
            cookies,
            local_storage: storage("localStorage")?,
            session_storage: storage("sessionStorage")?,
        })
    }

    fn import_session(&self, data: &SessionData) -> anyhow::Result<()> {
        let mut cookies = Vec::new();
        for raw in &data.cookies {
            match serde_json::from_value::<CookieParam>(raw.clone()) {
                Ok(cookie) => cookies.push(cookie),
                Err(e) => log::warn!("[!] Skipping unreadable stored cookie: {}", e),
            }
        }
        if !cookies.is_empty() {
            self.0.set_cookies(cookies)?;
        }

        for (name, entries) in [
            ("localStorage", &data.local_storage),
            ("sessionStorage", &data.session_storage),
        ] {
            for (key, value) in entries {
                self.eval(&format!(
                    "window.{name}.setItem('{}', '{}')",
                    js_escape(key),
                    js_escape(value)
                ))?;
            }
        }
        Ok(())
    }
}
