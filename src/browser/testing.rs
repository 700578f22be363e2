//! In-memory [`BrowserSession`] for tests.
//!
//! A `FakeSession` holds a script of page states. Activating any element
//! advances to the next state (the last one repeats), which is how a "load
//! more" click behaves from the harvester's point of view. CSS, tag and
//! link-text locators are evaluated against the current state with
//! `scraper`; XPath lookups find nothing.

use super::{BrowserSession, ElementHandle, SessionError, SessionResult};
use crate::locator::Locator;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    pages: Vec<String>,
    clicks: usize,
    source_calls: usize,
    failing_source_calls: HashSet<usize>,
    replaced_source_calls: HashMap<usize, String>,
    handles: Vec<(Locator, usize)>,
    scrolls: Vec<f64>,
    visited: Vec<String>,
}

impl State {
    fn current(&self) -> &str {
        let last = self.pages.len().saturating_sub(1);
        self.pages
            .get(self.clicks.min(last))
            .map(String::as_str)
            .unwrap_or_default()
    }
}

pub struct FakeSession {
    state: Mutex<State>,
}

impl FakeSession {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            state: Mutex::new(State {
                pages,
                ..State::default()
            }),
        }
    }

    /// Make the `n`-th call (0-based) to `page_source` fail.
    pub fn failing_source_call(self, n: usize) -> Self {
        self.state.lock().unwrap().failing_source_calls.insert(n);
        self
    }

    /// Serve `markup` instead of the current page on the `n`-th call
    /// (0-based) to `page_source`, as if rows rendered late.
    pub fn replaced_source_call(self, n: usize, markup: String) -> Self {
        self.state
            .lock()
            .unwrap()
            .replaced_source_calls
            .insert(n, markup);
        self
    }

    pub fn clicks(&self) -> usize {
        self.state.lock().unwrap().clicks
    }

    pub fn scrolls(&self) -> Vec<f64> {
        self.state.lock().unwrap().scrolls.clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    fn lookup(&self, locator: &Locator) -> Vec<ElementHandle> {
        let mut state = self.state.lock().unwrap();
        let count = matching_count(state.current(), locator);
        (0..count)
            .map(|nth| {
                state.handles.push((locator.clone(), nth));
                ElementHandle(state.handles.len() as u64 - 1)
            })
            .collect()
    }

    fn inspect<T>(
        &self,
        element: ElementHandle,
        f: impl FnOnce(&ElementRef) -> T,
    ) -> SessionResult<T> {
        let state = self.state.lock().unwrap();
        let (locator, nth) = state
            .handles
            .get(element.0 as usize)
            .cloned()
            .ok_or(SessionError::StaleElement(element))?;
        let doc = Html::parse_document(state.current());
        let found = matching(&doc, &locator);
        found
            .get(nth)
            .map(f)
            .ok_or(SessionError::StaleElement(element))
    }
}

fn matching<'a>(doc: &'a Html, locator: &Locator) -> Vec<ElementRef<'a>> {
    let select = |css: &str| -> Vec<ElementRef<'a>> {
        Selector::parse(css)
            .map(|sel| doc.select(&sel).collect())
            .unwrap_or_default()
    };
    match locator {
        Locator::Css(css) | Locator::TagName(css) => select(css.as_str()),
        Locator::LinkText(text) => select("a")
            .into_iter()
            .filter(|a| visible_text(a) == text.trim())
            .collect(),
        Locator::PartialLinkText(text) => select("a")
            .into_iter()
            .filter(|a| visible_text(a).contains(text.as_str()))
            .collect(),
        Locator::XPath(_) => Vec::new(),
    }
}

fn matching_count(markup: &str, locator: &Locator) -> usize {
    let doc = Html::parse_document(markup);
    matching(&doc, locator).len()
}

fn visible_text(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        self.state.lock().unwrap().visited.push(url.to_string());
        Ok(())
    }

    async fn page_source(&self) -> SessionResult<String> {
        let mut state = self.state.lock().unwrap();
        let call = state.source_calls;
        state.source_calls += 1;
        if state.failing_source_calls.contains(&call) {
            return Err(SessionError::Driver("renderer crashed".into()));
        }
        if let Some(markup) = state.replaced_source_calls.get(&call) {
            return Ok(markup.clone());
        }
        Ok(state.current().to_string())
    }

    async fn scroll_height(&self) -> SessionResult<f64> {
        Ok(self.state.lock().unwrap().current().len() as f64)
    }

    async fn scroll_to(&self, fraction: f64) -> SessionResult<()> {
        self.state.lock().unwrap().scrolls.push(fraction);
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> SessionResult<Option<ElementHandle>> {
        Ok(self.lookup(locator).into_iter().next())
    }

    async fn find_elements(&self, locator: &Locator) -> SessionResult<Vec<ElementHandle>> {
        Ok(self.lookup(locator))
    }

    async fn is_displayed(&self, element: ElementHandle) -> SessionResult<bool> {
        self.inspect(element, |el| {
            let style = el.value().attr("style").unwrap_or_default().replace(' ', "");
            el.value().attr("hidden").is_none() && !style.contains("display:none")
        })
    }

    async fn is_enabled(&self, element: ElementHandle) -> SessionResult<bool> {
        self.inspect(element, |el| el.value().attr("disabled").is_none())
    }

    async fn text(&self, element: ElementHandle) -> SessionResult<String> {
        self.inspect(element, visible_text)
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> SessionResult<Option<String>> {
        self.inspect(element, |el| el.value().attr(name).map(str::to_string))
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> SessionResult<()> {
        self.inspect(element, |_| ())
    }

    async fn activate(&self, element: ElementHandle) -> SessionResult<()> {
        self.inspect(element, |_| ())?;
        self.state.lock().unwrap().clicks += 1;
        Ok(())
    }
}
