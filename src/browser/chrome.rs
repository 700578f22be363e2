//! Chromium-backed [`BrowserSession`] over the DevTools protocol.
//!
//! Element lookups run as page scripts. Every element a lookup returns is
//! tagged with a `data-harvest-id` attribute, and later operations address it
//! through that tag. When the page recycles the node the tag disappears with
//! it and the handle reports [`SessionError::StaleElement`].

use super::{BrowserSession, ElementHandle, SessionError, SessionResult};
use crate::locator::Locator;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const HANDLE_ATTR: &str = "data-harvest-id";

/// A launched Chromium with one open tab.
///
/// Call [`ChromeSession::shutdown`] when done. Dropping the session without
/// it still stops the DevTools event task; the browser process goes with
/// the dropped [`Browser`].
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromeSession {
    /// Launch Chromium with a 1400x900 window and open a blank tab.
    #[instrument(level = "info")]
    pub async fn launch(headless: bool) -> SessionResult<Self> {
        let mut builder = BrowserConfig::builder().window_size(1400, 900);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(SessionError::Driver)?;

        let (browser, mut events) = Browser::launch(config).await.map_err(driver)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(driver)?;
        info!("Browser session started");
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Close the browser and stop the event task.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "Waiting for browser process failed");
        }
        self.handler.abort();
        info!("Browser session closed");
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> SessionResult<T> {
        let result = self.page.evaluate(script).await.map_err(driver)?;
        result
            .into_value::<T>()
            .map_err(|e| SessionError::Script(e.to_string()))
    }

    async fn eval_on(&self, element: ElementHandle, body: &str) -> SessionResult<serde_json::Value> {
        let script = format!(
            "(() => {{ const el = document.querySelector('[{HANDLE_ATTR}=\"{id}\"]'); \
             if (!el) {{ return {{ stale: true }}; }} \
             return {{ stale: false, value: (() => {{ {body} }})() }}; }})()",
            id = element.0,
        );
        let reply: serde_json::Value = self.eval(script).await?;
        if reply.get("stale").and_then(|s| s.as_bool()).unwrap_or(true) {
            return Err(SessionError::StaleElement(element));
        }
        Ok(reply.get("value").cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn tagged(&self, locator: &Locator, limit: Option<usize>) -> SessionResult<Vec<ElementHandle>> {
        let limit = limit.map_or_else(|| "found.length".to_string(), |n| n.to_string());
        let script = format!(
            "(() => {{ const found = {nodes}; \
             window.__harvestSeq = window.__harvestSeq || 0; \
             return found.slice(0, {limit}).map(el => {{ \
               if (!el.hasAttribute('{HANDLE_ATTR}')) {{ \
                 el.setAttribute('{HANDLE_ATTR}', String(++window.__harvestSeq)); \
               }} \
               return Number(el.getAttribute('{HANDLE_ATTR}')); \
             }}); }})()",
            nodes = nodes_expr(locator),
        );
        let ids: Vec<u64> = self.eval(script).await?;
        Ok(ids.into_iter().map(ElementHandle).collect())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

fn driver(e: impl std::fmt::Display) -> SessionError {
    SessionError::Driver(e.to_string())
}

/// JavaScript string literal for `s`.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script expression evaluating to an array of elements matching `locator`.
fn nodes_expr(locator: &Locator) -> String {
    match locator {
        Locator::Css(css) | Locator::TagName(css) => {
            format!("Array.from(document.querySelectorAll({}))", js_str(css))
        }
        Locator::LinkText(text) => format!(
            "Array.from(document.querySelectorAll('a')).filter(a => (a.innerText || '').trim() === {})",
            js_str(text.trim())
        ),
        Locator::PartialLinkText(text) => format!(
            "Array.from(document.querySelectorAll('a')).filter(a => (a.innerText || '').includes({}))",
            js_str(text)
        ),
        Locator::XPath(expr) => format!(
            "(() => {{ const r = document.evaluate({}, document, null, \
             XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); const out = []; \
             for (let i = 0; i < r.snapshotLength; i++) {{ const n = r.snapshotItem(i); \
             if (n.nodeType === 1) {{ out.push(n); }} }} return out; }})()",
            js_str(expr)
        ),
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    #[instrument(level = "info", skip(self))]
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        self.page.goto(url).await.map_err(driver)?;
        Ok(())
    }

    async fn page_source(&self) -> SessionResult<String> {
        self.page.content().await.map_err(driver)
    }

    async fn scroll_height(&self) -> SessionResult<f64> {
        self.eval("document.body ? document.body.scrollHeight : 0".to_string())
            .await
    }

    async fn scroll_to(&self, fraction: f64) -> SessionResult<()> {
        let _: bool = self
            .eval(format!(
                "(() => {{ window.scrollTo(0, document.body.scrollHeight * {fraction}); return true; }})()"
            ))
            .await?;
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> SessionResult<Option<ElementHandle>> {
        Ok(self.tagged(locator, Some(1)).await?.into_iter().next())
    }

    async fn find_elements(&self, locator: &Locator) -> SessionResult<Vec<ElementHandle>> {
        self.tagged(locator, None).await
    }

    async fn is_displayed(&self, element: ElementHandle) -> SessionResult<bool> {
        let value = self
            .eval_on(
                element,
                "const style = window.getComputedStyle(el); \
                 return style.visibility !== 'hidden' && style.display !== 'none' \
                   && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, element: ElementHandle) -> SessionResult<bool> {
        let value = self.eval_on(element, "return !el.disabled;").await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text(&self, element: ElementHandle) -> SessionResult<String> {
        let value = self.eval_on(element, "return el.innerText || '';").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> SessionResult<Option<String>> {
        let body = format!("return el.getAttribute({});", js_str(name));
        let value = self.eval_on(element, &body).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> SessionResult<()> {
        self.eval_on(element, "el.scrollIntoView({block: 'center'}); return true;")
            .await?;
        Ok(())
    }

    async fn activate(&self, element: ElementHandle) -> SessionResult<()> {
        self.eval_on(element, "el.click(); return true;").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_str_escapes_quotes() {
        assert_eq!(js_str("a'b\"c"), "\"a'b\\\"c\"");
    }

    #[test]
    fn test_xpath_locator_uses_snapshot_evaluation() {
        let expr = nodes_expr(&Locator::xpath("//a[contains(text(), 'Показать')]"));
        assert!(expr.contains("document.evaluate("));
        assert!(expr.contains("ORDERED_NODE_SNAPSHOT_TYPE"));
    }

    #[test]
    fn test_link_text_locator_trims_label() {
        let expr = nodes_expr(&Locator::link_text(" Показать еще "));
        assert!(expr.contains("=== \"Показать еще\""));
    }
}
