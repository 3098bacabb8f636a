//! In-memory page surface.
//!
//! Pages are declared per URL as trees of [`FakeElement`]s. Elements are
//! matched by exact CSS key rather than by a selector engine: a fake element
//! answers to every key listed in its `selectors`. Every navigation, click,
//! key press and view open/close is recorded as an [`Action`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ClickMode, Element, NavResponse, PageSurface, Result, ScrollTarget};
use crate::error::AutomationError;

/// Side effect of clicking a fake element.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Load another declared page in the same view.
    Navigate(String),
    /// Remove every element answering to one of these keys.
    Remove(Vec<String>),
    /// Append elements to the current page.
    Insert(Vec<FakeElement>),
    /// Spawn an unrelated view (e.g. a popup tab) at this URL.
    OpenView(String),
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    uid: u64,
    selectors: Vec<String>,
    text: String,
    attributes: HashMap<String, String>,
    visible: bool,
    enabled: bool,
    intercepts_click: bool,
    dismiss_on_escape: bool,
    children: Vec<FakeElement>,
    on_click: Vec<ClickEffect>,
}

impl FakeElement {
    pub fn new(css: impl Into<String>) -> Self {
        Self {
            uid: 0,
            selectors: vec![css.into()],
            text: String::new(),
            attributes: HashMap::new(),
            visible: true,
            enabled: true,
            intercepts_click: false,
            dismiss_on_escape: false,
            children: Vec::new(),
            on_click: Vec::new(),
        }
    }

    /// Also answer to `css`.
    pub fn matches(mut self, css: impl Into<String>) -> Self {
        self.selectors.push(css.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Normal clicks fail as if an overlay sat on top; forced clicks land.
    pub fn intercepted(mut self) -> Self {
        self.intercepts_click = true;
        self
    }

    /// Removed when Escape is pressed (menus, dialogs).
    pub fn dismissible(mut self) -> Self {
        self.dismiss_on_escape = true;
        self
    }

    pub fn child(mut self, child: FakeElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn answers_to(&self, css: &str) -> bool {
        self.selectors.iter().any(|s| s == css)
    }

    /// Own text followed by descendants' text, one per line.
    fn full_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(self.text.clone());
        }
        for child in &self.children {
            let text = child.full_text();
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.join("\n")
    }
}

/// A declared page.
#[derive(Debug, Clone)]
pub struct FakePage {
    status: u16,
    redirect: Option<String>,
    elements: Vec<FakeElement>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            status: 200,
            redirect: None,
            elements: Vec::new(),
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Serve the page declared at `url` instead.
    pub fn redirect_to(mut self, url: impl Into<String>) -> Self {
        self.redirect = Some(url.into());
        self
    }

    pub fn element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }
}

/// Recorded interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate { view: usize, url: String },
    Click { view: usize, selector: String, mode: ClickMode },
    ScrollIntoView { view: usize, selector: String },
    Escape { view: usize },
    Scroll { view: usize, target: ScrollTarget },
    OpenView { view: usize },
    SpawnedView { view: usize, url: String },
    CloseView { view: usize },
    CloseExtraneous { keep_pattern: String, closed: usize },
}

const MAX_REDIRECTS: usize = 5;

#[derive(Debug)]
struct View {
    url: String,
    dom: Vec<FakeElement>,
    open: bool,
}

#[derive(Debug, Default)]
struct State {
    pages: HashMap<String, FakePage>,
    views: Vec<View>,
    log: Vec<Action>,
    next_uid: u64,
    nav_failures: HashMap<String, VecDeque<AutomationError>>,
    hanging: HashSet<String>,
}

impl State {
    fn instantiate(&mut self, elements: &[FakeElement]) -> Vec<FakeElement> {
        elements
            .iter()
            .map(|element| {
                let mut copy = element.clone();
                self.assign_uids(&mut copy);
                copy
            })
            .collect()
    }

    fn assign_uids(&mut self, element: &mut FakeElement) {
        self.next_uid += 1;
        element.uid = self.next_uid;
        for child in &mut element.children {
            self.assign_uids(child);
        }
    }

    /// Load `url` into `view`, following redirects. Returns status and final URL.
    fn load(&mut self, view: usize, url: &str) -> (u16, String) {
        let mut target = url.to_string();
        for _ in 0..MAX_REDIRECTS {
            match self.pages.get(&target).and_then(|p| p.redirect.clone()) {
                Some(next) => target = next,
                None => break,
            }
        }

        let (status, elements) = match self.pages.get(&target) {
            Some(page) => (page.status, page.elements.clone()),
            None => (404, Vec::new()),
        };
        let dom = self.instantiate(&elements);
        if let Some(v) = self.views.get_mut(view) {
            v.url = target.clone();
            v.dom = dom;
        }
        self.log.push(Action::Navigate {
            view,
            url: url.to_string(),
        });
        (status, target)
    }

    fn view(&self, view: usize) -> Result<&View> {
        match self.views.get(view) {
            Some(v) if v.open => Ok(v),
            _ => Err(AutomationError::ViewClosed),
        }
    }

    fn view_mut(&mut self, view: usize) -> Result<&mut View> {
        match self.views.get_mut(view) {
            Some(v) if v.open => Ok(v),
            _ => Err(AutomationError::ViewClosed),
        }
    }

    fn element(&self, view: usize, uid: u64) -> Option<&FakeElement> {
        self.views
            .get(view)
            .filter(|v| v.open)
            .and_then(|v| find_uid(&v.dom, uid))
    }
}

fn find_uid(elements: &[FakeElement], uid: u64) -> Option<&FakeElement> {
    for element in elements {
        if element.uid == uid {
            return Some(element);
        }
        if let Some(found) = find_uid(&element.children, uid) {
            return Some(found);
        }
    }
    None
}

fn collect_matching(elements: &[FakeElement], css: &str, out: &mut Vec<u64>) {
    for element in elements {
        if element.answers_to(css) {
            out.push(element.uid);
        }
        collect_matching(&element.children, css, out);
    }
}

fn remove_where(elements: &mut Vec<FakeElement>, pred: &dyn Fn(&FakeElement) -> bool) {
    elements.retain(|e| !pred(e));
    for element in elements.iter_mut() {
        remove_where(&mut element.children, pred);
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted implementation of [`PageSurface`].
#[derive(Clone)]
pub struct ScriptedPage {
    state: Arc<Mutex<State>>,
    view: usize,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPage {
    pub fn new() -> Self {
        let state = State {
            views: vec![View {
                url: "about:blank".to_string(),
                dom: Vec::new(),
                open: true,
            }],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            view: 0,
        }
    }

    /// Declare the page served at `url`.
    pub fn with_page(self, url: impl Into<String>, page: FakePage) -> Self {
        self.add_page(url, page);
        self
    }

    pub fn add_page(&self, url: impl Into<String>, page: FakePage) {
        lock(&self.state).pages.insert(url.into(), page);
    }

    /// Make the next navigation to `url` fail with `error`. Queues accumulate.
    pub fn fail_navigation(&self, url: impl Into<String>, error: AutomationError) {
        lock(&self.state)
            .nav_failures
            .entry(url.into())
            .or_default()
            .push_back(error);
    }

    /// Navigations to `url` never complete.
    pub fn hang_navigation(&self, url: impl Into<String>) {
        lock(&self.state).hanging.insert(url.into());
    }

    pub fn actions(&self) -> Vec<Action> {
        lock(&self.state).log.clone()
    }

    /// URLs navigated to by this view, in order.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.state)
            .log
            .iter()
            .filter_map(|a| match a {
                Action::Navigate { view, url } if *view == self.view => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clicks performed on this view as `(first selector, mode)`.
    pub fn clicks(&self) -> Vec<(String, ClickMode)> {
        lock(&self.state)
            .log
            .iter()
            .filter_map(|a| match a {
                Action::Click {
                    view,
                    selector,
                    mode,
                } if *view == self.view => Some((selector.clone(), *mode)),
                _ => None,
            })
            .collect()
    }

    pub fn escape_count(&self) -> usize {
        lock(&self.state)
            .log
            .iter()
            .filter(|a| matches!(a, Action::Escape { view } if *view == self.view))
            .count()
    }

    /// Detached views opened from any view.
    pub fn detached_opened(&self) -> usize {
        self.count_actions(|a| matches!(a, Action::OpenView { .. }))
    }

    pub fn views_closed(&self) -> usize {
        self.count_actions(|a| matches!(a, Action::CloseView { .. }))
    }

    /// Whether any element on this view's current page answers to `css`.
    pub fn is_present(&self, css: &str) -> bool {
        let state = lock(&self.state);
        let mut found = Vec::new();
        if let Some(view) = state.views.get(self.view) {
            collect_matching(&view.dom, css, &mut found);
        }
        !found.is_empty()
    }

    /// Number of views currently open, this one included.
    pub fn open_views(&self) -> usize {
        lock(&self.state).views.iter().filter(|v| v.open).count()
    }

    fn count_actions(&self, pred: impl Fn(&Action) -> bool) -> usize {
        lock(&self.state).log.iter().filter(|a| pred(a)).count()
    }
}

#[async_trait]
impl PageSurface for ScriptedPage {
    async fn navigate(&self, url: &str) -> Result<NavResponse> {
        let hangs = {
            let mut state = lock(&self.state);
            state.view(self.view)?;
            if let Some(error) = state
                .nav_failures
                .get_mut(url)
                .and_then(|queue| queue.pop_front())
            {
                return Err(error);
            }
            state.hanging.contains(url)
        };
        if hangs {
            return std::future::pending().await;
        }

        let (status, final_url) = lock(&self.state).load(self.view, url);
        Ok(NavResponse {
            status: Some(status),
            url: final_url,
        })
    }

    async fn current_url(&self) -> Result<String> {
        Ok(lock(&self.state).view(self.view)?.url.clone())
    }

    async fn query(&self, css: &str) -> Result<Vec<Box<dyn Element>>> {
        let state = lock(&self.state);
        let view = state.view(self.view)?;
        let mut uids = Vec::new();
        collect_matching(&view.dom, css, &mut uids);
        Ok(uids
            .into_iter()
            .map(|uid| self.handle(uid, css))
            .collect())
    }

    async fn press_escape(&self) -> Result<()> {
        let mut state = lock(&self.state);
        let view = state.view_mut(self.view)?;
        remove_where(&mut view.dom, &|e| e.dismiss_on_escape);
        state.log.push(Action::Escape { view: self.view });
        Ok(())
    }

    async fn scroll(&self, target: ScrollTarget) -> Result<()> {
        let mut state = lock(&self.state);
        state.view(self.view)?;
        state.log.push(Action::Scroll {
            view: self.view,
            target,
        });
        Ok(())
    }

    async fn close_extraneous_views(&self, keep_pattern: &str) -> Result<usize> {
        let mut state = lock(&self.state);
        let mut closed = 0;
        for (index, view) in state.views.iter_mut().enumerate() {
            if index != self.view && view.open && !view.url.contains(keep_pattern) {
                view.open = false;
                closed += 1;
            }
        }
        state.log.push(Action::CloseExtraneous {
            keep_pattern: keep_pattern.to_string(),
            closed,
        });
        Ok(closed)
    }

    async fn open_detached(&self) -> Result<Box<dyn PageSurface>> {
        let mut state = lock(&self.state);
        state.views.push(View {
            url: "about:blank".to_string(),
            dom: Vec::new(),
            open: true,
        });
        let view = state.views.len() - 1;
        state.log.push(Action::OpenView { view });
        Ok(Box::new(ScriptedPage {
            state: Arc::clone(&self.state),
            view,
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.view_mut(self.view)?.open = false;
        state.log.push(Action::CloseView { view: self.view });
        Ok(())
    }
}

impl ScriptedPage {
    fn handle(&self, uid: u64, css: &str) -> Box<dyn Element> {
        Box::new(ScriptedElement {
            state: Arc::clone(&self.state),
            view: self.view,
            uid,
            selector: css.to_string(),
        })
    }
}

struct ScriptedElement {
    state: Arc<Mutex<State>>,
    view: usize,
    uid: u64,
    selector: String,
}

impl ScriptedElement {
    fn with<T>(&self, f: impl FnOnce(&FakeElement) -> T) -> Result<T> {
        let state = lock(&self.state);
        state
            .element(self.view, self.uid)
            .map(f)
            .ok_or_else(|| AutomationError::NotFound(format!("{} (detached)", self.selector)))
    }
}

#[async_trait]
impl Element for ScriptedElement {
    async fn text(&self) -> Result<String> {
        self.with(|e| e.full_text())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.with(|e| e.attributes.get(name).cloned())
    }

    async fn is_visible(&self) -> Result<bool> {
        Ok(self.with(|e| e.visible).unwrap_or(false))
    }

    async fn is_enabled(&self) -> Result<bool> {
        self.with(|e| e.enabled)
    }

    async fn click(&self, mode: ClickMode) -> Result<()> {
        let mut state = lock(&self.state);
        let (visible, intercepts, effects) = state
            .element(self.view, self.uid)
            .map(|e| (e.visible, e.intercepts_click, e.on_click.clone()))
            .ok_or_else(|| AutomationError::NotFound(format!("{} (detached)", self.selector)))?;

        if !visible && mode == ClickMode::Normal {
            return Err(AutomationError::Timeout(format!(
                "{} is not visible",
                self.selector
            )));
        }
        if intercepts && mode == ClickMode::Normal {
            return Err(AutomationError::Backend(format!(
                "click on {} intercepted by another element",
                self.selector
            )));
        }

        state.log.push(Action::Click {
            view: self.view,
            selector: self.selector.clone(),
            mode,
        });

        for effect in effects {
            match effect {
                ClickEffect::Navigate(url) => {
                    state.load(self.view, &url);
                }
                ClickEffect::Remove(keys) => {
                    let view = state.view_mut(self.view)?;
                    remove_where(&mut view.dom, &|e| keys.iter().any(|k| e.answers_to(k)));
                }
                ClickEffect::Insert(elements) => {
                    let added = state.instantiate(&elements);
                    state.view_mut(self.view)?.dom.extend(added);
                }
                ClickEffect::OpenView(url) => {
                    state.views.push(View {
                        url: String::new(),
                        dom: Vec::new(),
                        open: true,
                    });
                    let view = state.views.len() - 1;
                    state.load(view, &url);
                    state.log.push(Action::SpawnedView { view, url });
                }
            }
        }
        Ok(())
    }

    async fn scroll_into_view(&self) -> Result<()> {
        self.with(|_| ())?;
        lock(&self.state).log.push(Action::ScrollIntoView {
            view: self.view,
            selector: self.selector.clone(),
        });
        Ok(())
    }

    async fn find_within(&self, css: &str) -> Result<Vec<Box<dyn Element>>> {
        let uids = self.with(|e| {
            let mut uids = Vec::new();
            collect_matching(&e.children, css, &mut uids);
            uids
        })?;
        Ok(uids
            .into_iter()
            .map(|uid| {
                Box::new(ScriptedElement {
                    state: Arc::clone(&self.state),
                    view: self.view,
                    uid,
                    selector: css.to_string(),
                }) as Box<dyn Element>
            })
            .collect())
    }
}
