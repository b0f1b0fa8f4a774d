//! In-memory page substrate over static HTML.
//!
//! A `SnapshotPage` serves a fixed set of URL→HTML routes parsed with
//! `scraper`. Clicking a link (`href` / `data-href`) or a form's submit
//! control navigates between routes; an optional [`LoginGate`] redirects
//! protected URLs to a login route until the configured credentials are
//! submitted. It backs the offline `scan` command and the test suite.
//!
//! Documents are re-parsed per call and elements are addressed by their
//! document-order index, so handles stay `Send` and detach on navigation
//! exactly like live ones.

use async_trait::async_trait;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    BrowserPage, ElementHandle, Locator, OpenPage, PageElement, PageLauncher, SessionCookie,
    SessionState,
};
use crate::error::{Result, WatchError};

const NOT_FOUND_HTML: &str = "<html><body><h1>404 Not Found</h1></body></html>";
const SESSION_COOKIE: &str = "sessionid";

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot",
    "th", "thead", "tr", "ul",
];

const NEVER_RENDERED: &[&str] = &["head", "script", "style", "template", "noscript", "title"];

/// Login behavior of a snapshot site.
#[derive(Debug, Clone)]
pub struct LoginGate {
    pub login_url: String,
    /// URLs with this prefix require an authenticated session
    pub protected_prefix: String,
    pub username: String,
    pub password: String,
    /// Where a successful login lands
    pub landing_url: String,
    /// When set, correct credentials land here instead and the session only
    /// becomes authenticated after [`SnapshotPage::complete_second_factor`]
    pub second_factor_url: Option<String>,
}

#[derive(Debug)]
struct SnapshotState {
    routes: HashMap<String, String>,
    gate: Option<LoginGate>,
    authenticated: bool,
    session_token: String,
    current_url: String,
    current_html: Arc<String>,
    generation: u64,
    fields: HashMap<String, String>,
    visits: Vec<String>,
    clicks: Vec<String>,
    expire_on_visit: Option<String>,
    reject_logins: bool,
}

impl SnapshotState {
    fn navigate(&mut self, url: &str) {
        self.visits.push(url.to_string());

        if self.expire_on_visit.as_deref() == Some(url) {
            self.expire_on_visit = None;
            self.expire();
        }

        let mut target = url.to_string();
        if let Some(gate) = &self.gate {
            if !self.authenticated && target.starts_with(&gate.protected_prefix) {
                debug!(url, "Snapshot session not authenticated, redirecting to login");
                target = gate.login_url.clone();
            }
        }

        let html = self
            .routes
            .get(&target)
            .cloned()
            .unwrap_or_else(|| NOT_FOUND_HTML.to_string());

        self.current_url = target;
        self.current_html = Arc::new(html);
        self.generation += 1;
        self.fields.clear();
    }

    fn expire(&mut self) {
        self.authenticated = false;
        self.session_token = uuid::Uuid::new_v4().to_string();
    }

    fn submit(&mut self, action: Option<String>) {
        let login = self
            .gate
            .clone()
            .filter(|gate| self.current_url == gate.login_url);

        match login {
            Some(gate) => {
                let user_ok = self.fields.get("username") == Some(&gate.username);
                let pass_ok = self.fields.get("password") == Some(&gate.password);
                if self.reject_logins || !(user_ok && pass_ok) {
                    self.navigate(&gate.login_url);
                    return;
                }

                match &gate.second_factor_url {
                    Some(challenge) => self.navigate(challenge),
                    None => {
                        self.authenticated = true;
                        self.navigate(&gate.landing_url);
                    }
                }
            }
            None => {
                let target = action
                    .map(|a| resolve(&self.current_url, &a))
                    .unwrap_or_else(|| self.current_url.clone());
                self.navigate(&target);
            }
        }
    }
}

/// A page over static HTML routes.
#[derive(Debug, Clone)]
pub struct SnapshotPage {
    state: Arc<Mutex<SnapshotState>>,
}

impl Default for SnapshotPage {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotPage {
    pub fn new() -> Self {
        Self::build(HashMap::new(), None)
    }

    /// A page whose only route is `url`, already loaded.
    pub fn single(url: &str, html: &str) -> Self {
        let mut routes = HashMap::new();
        routes.insert(url.to_string(), html.to_string());
        let page = Self::build(routes, None);
        if let Ok(mut state) = page.state.try_lock() {
            state.navigate(url);
        }
        page
    }

    pub fn with_routes<I, U, H>(routes: I, gate: Option<LoginGate>) -> Self
    where
        I: IntoIterator<Item = (U, H)>,
        U: Into<String>,
        H: Into<String>,
    {
        let routes = routes
            .into_iter()
            .map(|(u, h)| (u.into(), h.into()))
            .collect();
        Self::build(routes, gate)
    }

    fn build(routes: HashMap<String, String>, gate: Option<LoginGate>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SnapshotState {
                routes,
                gate,
                authenticated: false,
                session_token: uuid::Uuid::new_v4().to_string(),
                current_url: "about:blank".to_string(),
                current_html: Arc::new(String::new()),
                generation: 0,
                fields: HashMap::new(),
                visits: Vec::new(),
                clicks: Vec::new(),
                expire_on_visit: None,
                reject_logins: false,
            })),
        }
    }

    /// Replace (or add) the HTML served for `url`.
    pub async fn set_route(&self, url: &str, html: &str) {
        self.state
            .lock()
            .await
            .routes
            .insert(url.to_string(), html.to_string());
    }

    /// Every URL requested through `goto` or a click, in order.
    pub async fn visits(&self) -> Vec<String> {
        self.state.lock().await.visits.clone()
    }

    /// Text of every clicked element, in order.
    pub async fn clicks(&self) -> Vec<String> {
        self.state.lock().await.clicks.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.authenticated
    }

    /// Drop the server-side session; stored cookies stop working.
    pub async fn expire_session(&self) {
        self.state.lock().await.expire();
    }

    /// Expire the session the next time `url` is requested.
    pub async fn expire_session_on_visit(&self, url: &str) {
        self.state.lock().await.expire_on_visit = Some(url.to_string());
    }

    /// Make every credential submission fail (or succeed again).
    pub async fn reject_logins(&self, reject: bool) {
        self.state.lock().await.reject_logins = reject;
    }

    /// Finish a pending second-factor challenge as an operator would.
    pub async fn complete_second_factor(&self) {
        let mut state = self.state.lock().await;
        let Some(gate) = state.gate.clone() else {
            return;
        };
        if gate.second_factor_url.as_deref() == Some(state.current_url.as_str()) {
            state.authenticated = true;
            state.navigate(&gate.landing_url);
        }
    }

    async fn snapshot(&self) -> (Arc<String>, u64) {
        let state = self.state.lock().await;
        (state.current_html.clone(), state.generation)
    }

    fn handles(&self, html: &Arc<String>, generation: u64, orders: Vec<usize>) -> Vec<ElementHandle> {
        orders
            .into_iter()
            .map(|order| {
                Box::new(SnapshotElement {
                    state: self.state.clone(),
                    html: html.clone(),
                    generation,
                    order,
                }) as ElementHandle
            })
            .collect()
    }
}

#[async_trait]
impl BrowserPage for SnapshotPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.state.lock().await.navigate(url);
        Ok(())
    }

    async fn wait_until_settled(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().await.current_url.clone())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.state.lock().await.current_html.as_str().to_string())
    }

    async fn find(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let (html, generation) = self.snapshot().await;
        let orders = select_in_document(&html, None, locator)?;
        Ok(self.handles(&html, generation, orders))
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        let (html, _) = self.snapshot().await;
        let order = select_in_document(&html, None, locator)?
            .into_iter()
            .next()
            .ok_or_else(|| WatchError::Browser(format!("no element for {locator}")))?;
        let name = with_element(&html, order, |el| {
            el.value().attr("name").unwrap_or_default().to_string()
        })?;

        self.state.lock().await.fields.insert(name, value.to_string());
        Ok(())
    }

    async fn export_session(&self) -> Result<SessionState> {
        let state = self.state.lock().await;
        if !state.authenticated {
            return Ok(SessionState::default());
        }

        let domain = url::Url::parse(&state.current_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        Ok(SessionState {
            cookies: vec![SessionCookie {
                name: SESSION_COOKIE.to_string(),
                value: state.session_token.clone(),
                domain,
                path: "/".to_string(),
                secure: true,
                http_only: true,
            }],
        })
    }

    async fn import_session(&self, session: &SessionState) -> Result<()> {
        let mut state = self.state.lock().await;
        let valid = session
            .cookies
            .iter()
            .any(|c| c.name == SESSION_COOKIE && c.value == state.session_token);
        if valid {
            state.authenticated = true;
        }
        Ok(())
    }
}

/// Every cycle reuses the same in-memory site.
#[async_trait]
impl PageLauncher for SnapshotPage {
    async fn open(&self) -> Result<Box<dyn OpenPage>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl OpenPage for SnapshotPage {
    fn page(&self) -> &dyn BrowserPage {
        self
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// How a click on an element behaves.
enum ClickTarget {
    Nothing,
    Link(String),
    Submit(Option<String>),
}

struct SnapshotElement {
    state: Arc<Mutex<SnapshotState>>,
    html: Arc<String>,
    generation: u64,
    order: usize,
}

impl SnapshotElement {
    async fn ensure_attached(&self) -> Result<()> {
        if self.state.lock().await.generation == self.generation {
            Ok(())
        } else {
            Err(WatchError::ElementDetached)
        }
    }
}

#[async_trait]
impl PageElement for SnapshotElement {
    async fn text(&self) -> Result<String> {
        self.ensure_attached().await?;
        with_element(&self.html, self.order, rendered_text)
    }

    async fn markup(&self) -> Result<String> {
        self.ensure_attached().await?;
        with_element(&self.html, self.order, |el| el.inner_html())
    }

    async fn is_visible(&self) -> Result<bool> {
        self.ensure_attached().await?;
        with_element(&self.html, self.order, is_rendered)
    }

    async fn find(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        self.ensure_attached().await?;
        let orders = select_in_document(&self.html, Some(self.order), locator)?;
        Ok(orders
            .into_iter()
            .map(|order| {
                Box::new(SnapshotElement {
                    state: self.state.clone(),
                    html: self.html.clone(),
                    generation: self.generation,
                    order,
                }) as ElementHandle
            })
            .collect())
    }

    async fn scroll_into_view(&self) -> Result<()> {
        self.ensure_attached().await
    }

    async fn click(&self) -> Result<()> {
        let (label, target) = with_element(&self.html, self.order, |el| {
            let mut label = rendered_text(el);
            if label.is_empty() {
                label = el.value().attr("value").unwrap_or_default().to_string();
            }
            (label, click_target(el))
        })?;

        let mut state = self.state.lock().await;
        if state.generation != self.generation {
            return Err(WatchError::ElementDetached);
        }
        state.clicks.push(label);

        match target {
            ClickTarget::Nothing => {}
            ClickTarget::Link(href) => {
                let url = resolve(&state.current_url, &href);
                state.navigate(&url);
            }
            ClickTarget::Submit(action) => state.submit(action),
        }
        Ok(())
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| WatchError::Browser(format!("invalid selector '{css}': {e:?}")))
}

fn element_order(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect()
}

/// Document-order indices of elements matching `locator`, optionally
/// restricted to strict descendants of the element at `scope`.
fn select_in_document(html: &str, scope: Option<usize>, locator: &Locator) -> Result<Vec<usize>> {
    let selector = parse_selector(locator.css_selector())?;
    let doc = Html::parse_document(html);
    let all = element_order(&doc);

    let scope_el = match scope {
        Some(order) => Some(*all.get(order).ok_or(WatchError::ElementDetached)?),
        None => None,
    };

    let mut orders = Vec::new();
    for (order, el) in all.iter().enumerate() {
        if !selector.matches(el) {
            continue;
        }
        if let Some(scope_el) = scope_el {
            let inside = el.id() != scope_el.id()
                && el.ancestors().any(|a| a.id() == scope_el.id());
            if !inside {
                continue;
            }
        }
        if locator.accepts_text(&rendered_text(*el)) {
            orders.push(order);
        }
    }
    Ok(orders)
}

fn with_element<T>(html: &str, order: usize, f: impl FnOnce(ElementRef<'_>) -> T) -> Result<T> {
    let doc = Html::parse_document(html);
    let el = element_order(&doc)
        .get(order)
        .copied()
        .ok_or(WatchError::ElementDetached)?;
    Ok(f(el))
}

fn hides(el: ElementRef<'_>) -> bool {
    let value = el.value();
    if NEVER_RENDERED.contains(&value.name()) || value.attr("hidden").is_some() {
        return true;
    }
    if value.name() == "input" && value.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
        return true;
    }
    value.attr("style").is_some_and(|style| {
        let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        let style = style.to_ascii_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn is_rendered(el: ElementRef<'_>) -> bool {
    !hides(el) && !el.ancestors().filter_map(ElementRef::wrap).any(hides)
}

/// Approximates `innerText`: block elements and `<br>` break lines,
/// whitespace inside a line collapses, hidden subtrees are skipped.
fn rendered_text(el: ElementRef<'_>) -> String {
    fn walk(el: ElementRef<'_>, out: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if hides(child_el) {
                        continue;
                    }
                    if element.name() == "br" {
                        out.push('\n');
                        continue;
                    }
                    let block = BLOCK_TAGS.contains(&element.name());
                    if block {
                        out.push('\n');
                    }
                    walk(child_el, out);
                    if block {
                        out.push('\n');
                    }
                }
                _ => {}
            }
        }
    }

    let mut raw = String::new();
    walk(el, &mut raw);
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn click_target(el: ElementRef<'_>) -> ClickTarget {
    let value = el.value();
    if let Some(href) = value.attr("data-href").or_else(|| value.attr("href")) {
        return ClickTarget::Link(href.to_string());
    }

    let kind = value.attr("type").unwrap_or("").to_ascii_lowercase();
    let submits = match value.name() {
        "button" => kind.is_empty() || kind == "submit",
        "input" => kind == "submit",
        _ => false,
    };
    if !submits {
        return ClickTarget::Nothing;
    }

    let form = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "form");
    match form {
        Some(form) => ClickTarget::Submit(form.value().attr("action").map(str::to_string)),
        None => ClickTarget::Nothing,
    }
}

fn resolve(base: &str, href: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}
