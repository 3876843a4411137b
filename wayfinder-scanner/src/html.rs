// Static HTML document: a Document implementation over fetched markup.
//
// scraper's Html is not Send, so every parse happens inside a plain function
// that returns owned data. Nothing parsed is held across an await.

use crate::document::{Document, DocumentResult, ElementHandle, PageSnapshot};
use crate::error::{DocumentError, ScanError};
use crate::locator::{ElementQuery, normalize_whitespace};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// Where a [`StaticDocument`] gets its markup from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> DocumentResult<FetchedPage>;

    async fn submit(
        &self,
        url: &str,
        method: FormMethod,
        fields: &[(String, String)],
    ) -> DocumentResult<FetchedPage>;
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
    pub max_redirects: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            user_agent: "Wayfinder/0.1 (https://github.com/trapdoorsec/wayfinder)".to_string(),
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
            max_redirects: 5,
        }
    }
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(options: HttpOptions) -> Result<Self, ScanError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ScanError::Configuration(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ScanError::Configuration(format!("header value for '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .user_agent(options.user_agent)
            .timeout(options.timeout)
            .connect_timeout(options.timeout / 2)
            .cookie_store(true)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .build()
            .map_err(|e| ScanError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn read(response: reqwest::Response, start: Instant) -> DocumentResult<FetchedPage> {
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(FetchedPage {
            final_url,
            status,
            body,
            elapsed: start.elapsed(),
        })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, url: &str) -> DocumentResult<FetchedPage> {
        let start = Instant::now();
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::read(response, start).await
    }

    async fn submit(
        &self,
        url: &str,
        method: FormMethod,
        fields: &[(String, String)],
    ) -> DocumentResult<FetchedPage> {
        let start = Instant::now();
        debug!("{:?} {} ({} fields)", method, url, fields.len());
        let request = match method {
            FormMethod::Get => self.client.get(url).query(fields),
            FormMethod::Post => self.client.post(url).form(fields),
        };
        let response = request.send().await?;
        Self::read(response, start).await
    }
}

/// Pre-captured pages keyed by URL (fragment ignored).
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    timeouts: HashSet<String>,
    fetches: Arc<Mutex<Vec<String>>>,
    submissions: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(page_key(url), html.into());
        self
    }

    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(page_key(from), to.to_string());
        self
    }

    /// Requests for `url` fail as if they never settled.
    pub fn timeout(mut self, url: &str) -> Self {
        self.timeouts.insert(page_key(url));
        self
    }

    pub fn fetch_log(&self) -> Vec<String> {
        self.fetches.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn submissions(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.submissions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn load(&self, url: &str) -> DocumentResult<FetchedPage> {
        let mut key = page_key(url);
        if let Ok(mut log) = self.fetches.lock() {
            log.push(key.clone());
        }

        let mut hops = 0;
        while let Some(target) = self.redirects.get(&key) {
            hops += 1;
            if hops > 5 {
                return Err(DocumentError::Navigation(format!("too many redirects from {}", url)));
            }
            key = page_key(target);
        }

        if self.timeouts.contains(&key) {
            return Err(DocumentError::Timeout);
        }

        match self.pages.get(&key) {
            Some(body) => Ok(FetchedPage {
                final_url: key,
                status: 200,
                body: body.clone(),
                elapsed: Duration::from_millis(1),
            }),
            None => Err(DocumentError::Navigation(format!("no page for {}", url))),
        }
    }
}

#[async_trait]
impl PageSource for MemorySource {
    async fn fetch(&self, url: &str) -> DocumentResult<FetchedPage> {
        self.load(url)
    }

    async fn submit(
        &self,
        url: &str,
        _method: FormMethod,
        fields: &[(String, String)],
    ) -> DocumentResult<FetchedPage> {
        if let Ok(mut log) = self.submissions.lock() {
            log.push((page_key(url), fields.to_vec()));
        }
        self.load(url)
    }
}

fn page_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

struct LoadedPage {
    location: String,
    html: String,
    status: u16,
    elapsed: Duration,
}

/// A [`Document`] over static markup. Links navigate, submit buttons submit their
/// form, and route-fragment changes update the location without refetching.
pub struct StaticDocument<S> {
    source: S,
    page: Option<LoadedPage>,
    generation: u64,
    filled: HashMap<usize, String>,
}

enum ClickEffect {
    Navigate(String),
    Submit {
        action: String,
        method: FormMethod,
        fields: Vec<(String, String)>,
    },
    Nothing,
}

impl<S: PageSource> StaticDocument<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            page: None,
            generation: 0,
            filled: HashMap::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn loaded(&self) -> DocumentResult<&LoadedPage> {
        self.page.as_ref().ok_or(DocumentError::NotLoaded)
    }

    fn check_fresh(&self, element: &ElementHandle) -> DocumentResult<()> {
        if element.generation != self.generation {
            return Err(DocumentError::StaleElement);
        }
        Ok(())
    }

    fn install(&mut self, fetched: FetchedPage, fragment: Option<String>) {
        let mut location = fetched.final_url;
        if let Some(fragment) = fragment
            && let Ok(mut url) = Url::parse(&location)
            && url.fragment().is_none()
        {
            url.set_fragment(Some(&fragment));
            location = url.to_string();
        }
        self.page = Some(LoadedPage {
            location,
            html: fetched.body,
            status: fetched.status,
            elapsed: fetched.elapsed,
        });
        self.generation += 1;
        self.filled.clear();
    }
}

#[async_trait]
impl<S: PageSource> Document for StaticDocument<S> {
    async fn query(&mut self, query: &ElementQuery) -> DocumentResult<Vec<ElementHandle>> {
        let page = self.loaded()?;
        select_elements(&page.html, query, self.generation)
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> DocumentResult<bool> {
        self.check_fresh(element)?;
        Ok(element.visible)
    }

    async fn click(&mut self, element: &ElementHandle) -> DocumentResult<()> {
        self.check_fresh(element)?;
        let page = self.loaded()?;
        let effect = click_effect(&page.html, &page.location, element.index, &self.filled)?;

        match effect {
            ClickEffect::Navigate(target) => self.navigate(&target).await,
            ClickEffect::Submit {
                action,
                method,
                fields,
            } => {
                let fetched = self.source.submit(&action, method, &fields).await?;
                self.install(fetched, None);
                Ok(())
            }
            ClickEffect::Nothing => Ok(()),
        }
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> DocumentResult<()> {
        self.check_fresh(element)?;
        match element.tag.as_str() {
            "input" | "textarea" | "select" => {
                self.filled.insert(element.index, value.to_string());
                Ok(())
            }
            other => Err(DocumentError::NotFillable(other.to_string())),
        }
    }

    async fn current_location(&mut self) -> DocumentResult<String> {
        Ok(self.loaded()?.location.clone())
    }

    async fn navigate(&mut self, location: &str) -> DocumentResult<()> {
        let current = self.page.as_ref().map(|p| p.location.clone());
        let target = match Url::parse(location) {
            Ok(url) => url,
            Err(_) => {
                let base = current
                    .as_deref()
                    .and_then(|c| Url::parse(c).ok())
                    .ok_or_else(|| DocumentError::Navigation(format!("cannot resolve {}", location)))?;
                base.join(location)
                    .map_err(|e| DocumentError::Navigation(format!("{}: {}", location, e)))?
            }
        };

        if let Some(current) = current
            && page_key(&current) == page_key(target.as_str())
            && target.fragment().is_some()
        {
            debug!("Fragment navigation to {}", target);
            if let Some(page) = self.page.as_mut() {
                page.location = target.to_string();
            }
            self.generation += 1;
            self.filled.clear();
            return Ok(());
        }

        let fetched = self.source.fetch(target.as_str()).await?;
        self.install(fetched, target.fragment().map(|f| f.to_string()));
        Ok(())
    }

    async fn wait_for_settled(&mut self, _timeout: Duration) -> DocumentResult<()> {
        self.loaded().map(|_| ())
    }

    async fn snapshot(&mut self) -> DocumentResult<PageSnapshot> {
        let page = self.loaded()?;
        let (title, text) = page_text(&page.html);
        Ok(PageSnapshot {
            location: page.location.clone(),
            title,
            html: page.html.clone(),
            text,
            load_time: page.elapsed,
            status: Some(page.status),
        })
    }
}

const NON_RENDERED: &[&str] = &[
    "head", "script", "style", "template", "noscript", "title", "meta", "link",
];

fn parse_selector(css: &str, raw: &str) -> DocumentResult<Selector> {
    Selector::parse(css).map_err(|_| DocumentError::InvalidSelector(raw.to_string()))
}

fn select_elements(
    html: &str,
    query: &ElementQuery,
    generation: u64,
) -> DocumentResult<Vec<ElementHandle>> {
    if let Some(crate::locator::TextMatch::Unparseable(reason)) = &query.text {
        return Err(DocumentError::InvalidSelector(format!("{} ({})", query, reason)));
    }
    let selector = parse_selector(&query.css, query.as_str())?;
    let document = Html::parse_document(html);

    let order: HashMap<_, usize> = document
        .root_element()
        .descendants()
        .filter(|node| node.value().is_element())
        .enumerate()
        .map(|(i, node)| (node.id(), i))
        .collect();

    let matched: Vec<ElementRef> = document
        .select(&selector)
        .filter(|el| !NON_RENDERED.contains(&el.value().name()))
        .filter(|el| query.matches_text(&el.text().collect::<String>()))
        .collect();

    let kept: Vec<ElementRef> = if query.deepest {
        let ids: HashSet<_> = matched.iter().map(|el| el.id()).collect();
        let mut has_matching_descendant = HashSet::new();
        for el in &matched {
            for ancestor in el.ancestors() {
                if ids.contains(&ancestor.id()) {
                    has_matching_descendant.insert(ancestor.id());
                }
            }
        }
        matched
            .into_iter()
            .filter(|el| !has_matching_descendant.contains(&el.id()))
            .collect()
    } else {
        matched
    };

    Ok(kept
        .into_iter()
        .map(|el| ElementHandle {
            generation,
            index: order.get(&el.id()).copied().unwrap_or(usize::MAX),
            tag: el.value().name().to_string(),
            text: normalize_whitespace(&el.text().collect::<String>()),
            name: accessible_name(&el),
            attributes: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            visible: is_rendered(&el),
        })
        .collect())
}

fn hides(el: &ElementRef) -> bool {
    let value = el.value();
    if NON_RENDERED.contains(&value.name()) || value.attr("hidden").is_some() {
        return true;
    }
    if value
        .attr("aria-hidden")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return true;
    }
    if value.name() == "input"
        && value
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
    {
        return true;
    }
    if let Some(style) = value.attr("style") {
        let style: String = style
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

fn is_rendered(el: &ElementRef) -> bool {
    if hides(el) {
        return false;
    }
    !el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| hides(&ancestor))
}

fn accessible_name(el: &ElementRef) -> String {
    let value = el.value();
    for attr in ["aria-label", "title"] {
        if let Some(label) = value.attr(attr).map(str::trim).filter(|l| !l.is_empty()) {
            return label.to_string();
        }
    }
    let text = normalize_whitespace(&el.text().collect::<String>());
    if !text.is_empty() {
        return text;
    }
    if value.name() == "input"
        && let Some(v) = value.attr("value").filter(|v| !v.trim().is_empty())
    {
        return v.trim().to_string();
    }
    if let Ok(img) = Selector::parse("img[alt]")
        && let Some(alt) = el.select(&img).filter_map(|i| i.value().attr("alt")).next()
    {
        return alt.trim().to_string();
    }
    String::new()
}

fn element_at(document: &Html, index: usize) -> Option<ElementRef<'_>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .nth(index)
}

fn click_effect(
    html: &str,
    location: &str,
    index: usize,
    filled: &HashMap<usize, String>,
) -> DocumentResult<ClickEffect> {
    let document = Html::parse_document(html);
    let element = element_at(&document, index).ok_or(DocumentError::StaleElement)?;
    let base = Url::parse(location).map_err(|e| DocumentError::Navigation(e.to_string()))?;

    let link = std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|el| el.value().name() == "a" && el.value().attr("href").is_some());

    if let Some(link) = link
        && let Some(href) = link.value().attr("href")
    {
        let href = href.trim();
        if href.is_empty() || href == "#" || href.starts_with("javascript:") {
            return Ok(ClickEffect::Nothing);
        }
        let target = base
            .join(href)
            .map_err(|e| DocumentError::Navigation(format!("{}: {}", href, e)))?;
        return Ok(ClickEffect::Navigate(target.to_string()));
    }

    let value = element.value();
    let is_submit = match value.name() {
        "button" => value
            .attr("type")
            .is_none_or(|t| t.eq_ignore_ascii_case("submit")),
        "input" => value
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("submit")),
        _ => false,
    };
    if !is_submit {
        return Ok(ClickEffect::Nothing);
    }

    let Some(form) = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "form")
    else {
        return Ok(ClickEffect::Nothing);
    };

    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => base
            .join(action)
            .map_err(|e| DocumentError::Navigation(format!("{}: {}", action, e)))?
            .to_string(),
        _ => {
            let mut here = base.clone();
            here.set_fragment(None);
            here.to_string()
        }
    };
    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
        _ => FormMethod::Get,
    };

    let order: HashMap<_, usize> = document
        .root_element()
        .descendants()
        .filter(|node| node.value().is_element())
        .enumerate()
        .map(|(i, node)| (node.id(), i))
        .collect();

    let mut fields = Vec::new();
    if let Ok(controls) = Selector::parse("input[name], textarea[name], select[name]") {
        for control in form.select(&controls) {
            let v = control.value();
            let kind = v.attr("type").unwrap_or("text").to_lowercase();
            if matches!(kind.as_str(), "submit" | "button" | "reset" | "image") {
                continue;
            }
            let Some(name) = v.attr("name") else { continue };
            let filled_value = order.get(&control.id()).and_then(|i| filled.get(i));
            let field_value = match filled_value {
                Some(f) => f.clone(),
                None if v.name() == "textarea" => control.text().collect(),
                None => v.attr("value").unwrap_or_default().to_string(),
            };
            fields.push((name.to_string(), field_value));
        }
    }
    if let Some(name) = value.attr("name") {
        fields.push((name.to_string(), value.attr("value").unwrap_or_default().to_string()));
    }

    Ok(ClickEffect::Submit {
        action,
        method,
        fields,
    })
}

fn page_text(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);
    let title = Selector::parse("title")
        .ok()
        .and_then(|s| document.select(&s).next())
        .map(|t| normalize_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());
    let text = Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
        .map(|body| normalize_whitespace(&body.text().collect::<String>()))
        .unwrap_or_default();
    (title, text)
}
