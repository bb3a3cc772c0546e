//! Scripted stand-ins for the browser, the operator and the session store.

use crate::config::{Config, SlotLocators, Timing};
use crate::funnel::Funnel;
use crate::locator::{strip_query, Locator};
use crate::notify::{Operator, Urgency};
use crate::page::{ClickResult, ElementHandle, Page};
use crate::session::{SessionData, SessionStore};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

type Hook = Rc<dyn Fn(&FakePage)>;

struct FakeElement {
    handle: ElementHandle,
    url: String,
    locator: Locator,
    parent: Option<ElementHandle>,
    text: String,
    attrs: HashMap<String, String>,
    clickable: bool,
    intercepts: usize,
    clicks: usize,
    on_click: Option<Hook>,
    removed: bool,
}

#[derive(Default)]
struct State {
    url: String,
    elements: Vec<FakeElement>,
    redirects: HashMap<String, String>,
    scheduled: Vec<(usize, String)>,
    reads: usize,
    refreshes: usize,
    navigations: Vec<String>,
    on_refresh: Option<Hook>,
    session: SessionData,
    imported: Option<SessionData>,
}

/// A tiny model of a website: a current location plus elements that live on
/// particular locations. Elements of other locations are stale.
pub(crate) struct FakePage {
    state: RefCell<State>,
}

impl FakePage {
    pub fn at(url: &str) -> Self {
        Self {
            state: RefCell::new(State {
                url: url.to_string(),
                ..State::default()
            }),
        }
    }

    pub fn add(&self, url: &str, locator: Locator) -> ElementHandle {
        self.insert(url.to_string(), locator, None)
    }

    pub fn add_child(&self, parent: &ElementHandle, locator: Locator) -> ElementHandle {
        let url = self.with_el(parent, |e| e.url.clone());
        self.insert(url, locator, Some(parent.clone()))
    }

    fn insert(&self, url: String, locator: Locator, parent: Option<ElementHandle>) -> ElementHandle {
        let mut st = self.state.borrow_mut();
        let handle = ElementHandle::new(format!("el-{}", st.elements.len()));
        st.elements.push(FakeElement {
            handle: handle.clone(),
            url,
            locator,
            parent,
            text: String::new(),
            attrs: HashMap::new(),
            clickable: true,
            intercepts: 0,
            clicks: 0,
            on_click: None,
            removed: false,
        });
        handle
    }

    fn with_el<T>(&self, h: &ElementHandle, f: impl FnOnce(&mut FakeElement) -> T) -> T {
        let mut st = self.state.borrow_mut();
        let el = st
            .elements
            .iter_mut()
            .find(|e| &e.handle == h)
            .expect("unknown fake element");
        f(el)
    }

    pub fn set_text(&self, h: &ElementHandle, text: &str) {
        self.with_el(h, |e| e.text = text.to_string());
    }

    pub fn set_attr(&self, h: &ElementHandle, name: &str, value: &str) {
        self.with_el(h, |e| {
            e.attrs.insert(name.to_string(), value.to_string());
        });
    }

    pub fn set_clickable(&self, h: &ElementHandle, clickable: bool) {
        self.with_el(h, |e| e.clickable = clickable);
    }

    pub fn remove(&self, h: &ElementHandle) {
        self.with_el(h, |e| e.removed = true);
    }

    pub fn on_click(&self, h: &ElementHandle, hook: impl Fn(&FakePage) + 'static) {
        self.with_el(h, |e| e.on_click = Some(Rc::new(hook)));
    }

    pub fn click_goes_to(&self, h: &ElementHandle, url: &str) {
        let url = url.to_string();
        self.on_click(h, move |p| p.set_location(&url));
    }

    pub fn intercept_next_clicks(&self, h: &ElementHandle, n: usize) {
        self.with_el(h, |e| e.intercepts = n);
    }

    pub fn clicks(&self, h: &ElementHandle) -> usize {
        self.with_el(h, |e| e.clicks)
    }

    pub fn set_location(&self, url: &str) {
        self.state.borrow_mut().url = url.to_string();
    }

    /// `navigate_to(from)` lands on `to`.
    pub fn redirect(&self, from: &str, to: &str) {
        self.state
            .borrow_mut()
            .redirects
            .insert(from.to_string(), to.to_string());
    }

    /// Moves to `url` once the location has been read `after` more times.
    pub fn schedule_location(&self, after: usize, url: &str) {
        let mut st = self.state.borrow_mut();
        let at = st.reads + after;
        st.scheduled.push((at, url.to_string()));
    }

    pub fn on_refresh(&self, hook: impl Fn(&FakePage) + 'static) {
        self.state.borrow_mut().on_refresh = Some(Rc::new(hook));
    }

    pub fn refreshes(&self) -> usize {
        self.state.borrow().refreshes
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.borrow().navigations.clone()
    }

    pub fn set_session(&self, data: SessionData) {
        self.state.borrow_mut().session = data;
    }

    pub fn imported(&self) -> Option<SessionData> {
        self.state.borrow().imported.clone()
    }

    fn live(st: &State, e: &FakeElement) -> bool {
        !e.removed && e.url == strip_query(&st.url)
    }

    fn descends_from(st: &State, e: &FakeElement, scope: &ElementHandle) -> bool {
        let mut parent = e.parent.clone();
        while let Some(p) = parent {
            if &p == scope {
                return true;
            }
            parent = st
                .elements
                .iter()
                .find(|x| x.handle == p)
                .and_then(|x| x.parent.clone());
        }
        false
    }
}

impl Page for FakePage {
    fn current_url(&self) -> anyhow::Result<String> {
        let mut st = self.state.borrow_mut();
        st.reads += 1;
        let reads = st.reads;
        if let Some(pos) = st.scheduled.iter().position(|(at, _)| *at <= reads) {
            let (_, url) = st.scheduled.remove(pos);
            st.url = url;
        }
        Ok(st.url.clone())
    }

    fn navigate_to(&self, url: &str) -> anyhow::Result<()> {
        let mut st = self.state.borrow_mut();
        st.navigations.push(url.to_string());
        st.url = st
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    fn refresh(&self) -> anyhow::Result<()> {
        let hook = {
            let mut st = self.state.borrow_mut();
            st.refreshes += 1;
            st.on_refresh.clone()
        };
        if let Some(hook) = hook {
            hook(self);
        }
        Ok(())
    }

    fn find_all(&self, locator: &Locator) -> anyhow::Result<Vec<ElementHandle>> {
        let st = self.state.borrow();
        Ok(st
            .elements
            .iter()
            .filter(|e| Self::live(&st, e) && &e.locator == locator)
            .map(|e| e.handle.clone())
            .collect())
    }

    fn find_within(
        &self,
        scope: &ElementHandle,
        locator: &Locator,
    ) -> anyhow::Result<Vec<ElementHandle>> {
        let st = self.state.borrow();
        Ok(st
            .elements
            .iter()
            .filter(|e| {
                Self::live(&st, e) && &e.locator == locator && Self::descends_from(&st, e, scope)
            })
            .map(|e| e.handle.clone())
            .collect())
    }

    fn find_ancestors(
        &self,
        element: &ElementHandle,
        locator: &Locator,
    ) -> anyhow::Result<Vec<ElementHandle>> {
        let st = self.state.borrow();
        let mut found = Vec::new();
        let mut parent = st
            .elements
            .iter()
            .find(|e| &e.handle == element)
            .and_then(|e| e.parent.clone());
        while let Some(p) = parent {
            let el = st.elements.iter().find(|e| e.handle == p);
            if let Some(el) = el {
                if &el.locator == locator {
                    found.push(el.handle.clone());
                }
            }
            parent = el.and_then(|e| e.parent.clone());
        }
        found.reverse();
        Ok(found)
    }

    fn text(&self, element: &ElementHandle) -> anyhow::Result<String> {
        Ok(self.with_el(element, |e| e.text.clone()))
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self.with_el(element, |e| e.attrs.get(name).cloned()))
    }

    fn is_clickable(&self, element: &ElementHandle) -> anyhow::Result<bool> {
        let st = self.state.borrow();
        Ok(st
            .elements
            .iter()
            .any(|e| &e.handle == element && e.clickable && Self::live(&st, e)))
    }

    fn click(&self, element: &ElementHandle) -> anyhow::Result<ClickResult> {
        let hook = self.with_el(element, |e| {
            if e.intercepts > 0 {
                e.intercepts -= 1;
                return None;
            }
            e.clicks += 1;
            Some(e.on_click.clone())
        });
        match hook {
            None => Ok(ClickResult::Intercepted),
            Some(hook) => {
                if let Some(hook) = hook {
                    hook(self);
                }
                Ok(ClickResult::Clicked)
            }
        }
    }

    fn is_stale(&self, element: &ElementHandle) -> anyhow::Result<bool> {
        let st = self.state.borrow();
        Ok(!st
            .elements
            .iter()
            .any(|e| &e.handle == element && Self::live(&st, e)))
    }

    fn page_source(&self) -> anyhow::Result<String> {
        Ok(format!("<html data-url=\"{}\"></html>", self.state.borrow().url))
    }

    fn export_session(&self) -> anyhow::Result<SessionData> {
        Ok(self.state.borrow().session.clone())
    }

    fn import_session(&self, data: &SessionData) -> anyhow::Result<()> {
        self.state.borrow_mut().imported = Some(data.clone());
        Ok(())
    }
}

/// Records every alert and broadcast.
#[derive(Default)]
pub(crate) struct RecordingOperator {
    pub alerts: RefCell<Vec<(String, Urgency)>>,
    pub broadcasts: RefCell<Vec<String>>,
    pub annoyed: Cell<usize>,
}

impl RecordingOperator {
    pub fn alert_messages(&self) -> Vec<String> {
        self.alerts.borrow().iter().map(|(m, _)| m.clone()).collect()
    }
}

impl Operator for RecordingOperator {
    fn alert(&self, message: &str, urgency: Urgency) {
        self.alerts.borrow_mut().push((message.to_string(), urgency));
    }

    fn broadcast(&self, message: &str) {
        self.broadcasts.borrow_mut().push(message.to_string());
    }

    fn annoy(&self) {
        self.annoyed.set(self.annoyed.get() + 1);
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    pub data: RefCell<Option<SessionData>>,
    pub saves: Cell<usize>,
}

impl SessionStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Option<SessionData>> {
        Ok(self.data.borrow().clone())
    }

    fn save(&self, data: &SessionData) -> anyhow::Result<()> {
        self.saves.set(self.saves.get() + 1);
        *self.data.borrow_mut() = Some(data.clone());
        Ok(())
    }
}

/// A small shop whose pages are named after their step in the funnel.
const SHOP_SITE: &str = r#"
[site]
base_url = "https://shop/"

[site.routes.SLOT_SELECT]
start = "cart"
waypoints = [
    { locator = { id = "to-byg" }, dest = "byg" },
    { locator = { id = "to-subs" }, dest = "substitution" },
    { locator = { id = "to-slots" }, dest = "slot-select" },
]

[site.routes.CHECKOUT]
start = "slot-select"
waypoints = [
    { locator = { id = "to-pay" }, dest = "payselect" },
    { locator = { id = "to-review" }, dest = "review", pre_action = "select_payment_method" },
    { locator = { id = "place-order" }, dest = "thankyou" },
]
"#;

/// Everything a funnel needs, scripted, with output going to a temp dir.
pub(crate) struct Harness {
    pub page: FakePage,
    pub config: Config,
    pub operator: RecordingOperator,
    pub store: MemoryStore,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_conf("")
    }

    /// `extra` is appended to the shop's conf.toml.
    pub fn with_conf(extra: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_toml("Whole Foods", &format!("{SHOP_SITE}\n{extra}")).unwrap();
        config.timing = Timing::immediate();
        config.output_dir = dir.path().to_path_buf();
        Self {
            page: FakePage::at("https://shop/cart"),
            config,
            operator: RecordingOperator::default(),
            store: MemoryStore::default(),
            dir,
        }
    }

    pub fn funnel(&self) -> Funnel<'_> {
        Funnel::new(&self.page, &self.config, &self.operator, &self.store).unwrap()
    }

    /// A home page showing a signed-in account widget.
    pub fn logged_in_home(&self) -> ElementHandle {
        let login = self.config.site.locators.login.alternatives()[0].clone();
        let widget = self.page.add("https://shop/", login);
        self.page.set_text(&widget, "Hello, Jo\nAccount & Lists");
        widget
    }

    /// Buttons for cart -> byg -> substitution -> slot-select.
    pub fn shop_funnel_pages(&self) -> [ElementHandle; 3] {
        [
            self.page_button("cart", "to-byg", "byg"),
            self.page_button("byg", "to-subs", "substitution"),
            self.page_button("substitution", "to-slots", "slot-select"),
        ]
    }

    /// Buttons for slot-select -> payselect -> review -> thankyou.
    pub fn checkout_pages(&self) -> [ElementHandle; 3] {
        [
            self.page_button("slot-select", "to-pay", "payselect"),
            self.page_button("payselect", "to-review", "review"),
            self.page_button("review", "place-order", "thankyou"),
        ]
    }

    fn page_button(&self, page: &str, id: &str, next: &str) -> ElementHandle {
        let button = self.page.add(&format!("https://shop/{page}"), Locator::id(id));
        self.page.click_goes_to(&button, &format!("https://shop/{next}"));
        button
    }

    pub fn files_named(&self, prefix: &str) -> Vec<PathBuf> {
        std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(prefix))
            })
            .collect()
    }

    /// The one-list-per-day widget, with a date tab button per day.
    pub fn single_slot_page(&self, url: &str, days: &[SlotDay]) -> SlotPage {
        let locators = &self.config.site.slots.single;
        let container = self.page.add(url, locators.container.alternatives()[0].clone());
        add_slot_days(&self.page, locators, &container, url, days)
    }

    /// The multi-option widget: day headers inside each date group and a
    /// delivery type on every slot.
    pub fn multi_slot_page(&self, url: &str, days: &[SlotDay], delivery_text: &str) -> SlotPage {
        let l = &self.config.site.slots.multi;
        let container = self.page.add(url, l.container.alternatives()[0].clone());
        let mut out = SlotPage::default();
        for day in days {
            let group = self.page.add_child(&container, l.date_group.clone());
            let header = self.page.add_child(&group, l.date_element.clone());
            set_day_text(&self.page, l, &header, day);
            out.date_buttons.push(header);
            for (window, price) in &day.windows {
                let slot = add_slot(&self.page, l, &group, window, price, &mut out);
                if let Some(kind) = &l.delivery_type {
                    let label = self.page.add_child(&slot, kind.clone());
                    self.page.set_text(&label, delivery_text);
                }
            }
        }
        out
    }
}

/// One day on the slot page and its open windows, with prices.
pub(crate) struct SlotDay {
    label: String,
    month_day: String,
    windows: Vec<(String, String)>,
}

impl SlotDay {
    pub fn new(label: &str, month_day: &str, windows: &[(&str, &str)]) -> Self {
        Self {
            label: label.to_string(),
            month_day: month_day.to_string(),
            windows: windows
                .iter()
                .map(|(w, p)| (w.to_string(), p.to_string()))
                .collect(),
        }
    }
}

/// Handles to what tests click on, in page order.
#[derive(Default)]
pub(crate) struct SlotPage {
    pub date_buttons: Vec<ElementHandle>,
    pub select_buttons: Vec<ElementHandle>,
    pub slots: Vec<ElementHandle>,
}

/// Adds single-layout days under `container`. Group `i` gets the id
/// `date-group-{i}`.
pub(crate) fn add_slot_days(
    page: &FakePage,
    l: &SlotLocators,
    container: &ElementHandle,
    url: &str,
    days: &[SlotDay],
) -> SlotPage {
    let mut out = SlotPage::default();
    for (i, day) in days.iter().enumerate() {
        let id = format!("date-group-{i}");
        let group = page.add_child(container, l.date_group.clone());
        page.set_attr(&group, "id", &id);
        let button = page.add(url, l.date_element.fill("group_id", &id));
        set_day_text(page, l, &button, day);
        out.date_buttons.push(button);
        for (window, price) in &day.windows {
            add_slot(page, l, &group, window, price, &mut out);
        }
    }
    out
}

fn set_day_text(page: &FakePage, l: &SlotLocators, header: &ElementHandle, day: &SlotDay) {
    let label = page.add_child(header, l.day_of_week.clone());
    page.set_text(&label, &day.label);
    let month = page.add_child(header, l.month_day.clone());
    page.set_text(&month, &day.month_day);
}

fn add_slot(
    page: &FakePage,
    l: &SlotLocators,
    group: &ElementHandle,
    window: &str,
    price: &str,
    out: &mut SlotPage,
) -> ElementHandle {
    let slot = page.add_child(group, l.slot.clone());
    let time = page.add_child(&slot, l.time_window.clone());
    page.set_text(&time, window);
    let cost = page.add_child(&slot, l.price.clone());
    page.set_text(&cost, price);
    out.select_buttons.push(page.add_child(&slot, l.select_button.clone()));
    out.slots.push(slot.clone());
    slot
}
