//! Rendered-page sessions driven by the interactive harvester.
//!
//! The harvester never talks to a browser directly. It consumes the
//! [`BrowserSession`] trait: read the current markup, scroll, find elements
//! by [`Locator`], and activate them. [`chrome::ChromeSession`] implements it
//! over the Chrome DevTools protocol; tests use an in-memory fake.
//!
//! # Feature Flag
//!
//! The Chromium adapter is compiled with the `browser` feature (on by
//! default). Without it the interactive sites refuse to run and only the
//! paginated ones are available.

#[cfg(feature = "browser")]
pub mod chrome;
#[cfg(test)]
pub mod testing;

use crate::locator::Locator;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};

/// Opaque reference to an element in the live page.
///
/// Handles may go stale when the page re-renders; operations on a stale
/// handle fail with [`SessionError::StaleElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser driver error: {0}")]
    Driver(String),
    #[error("element {0:?} is no longer attached to the page")]
    StaleElement(ElementHandle),
    #[error("unexpected script result: {0}")]
    Script(String),
    #[cfg(not(feature = "browser"))]
    #[error("interactive harvesting needs the `browser` feature")]
    Unsupported,
}

pub type SessionResult<T> = Result<T, SessionError>;

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> SessionResult<()>;

    /// Markup of the page as currently rendered.
    async fn page_source(&self) -> SessionResult<String>;

    async fn scroll_height(&self) -> SessionResult<f64>;

    /// Scroll the window to `fraction` of the document height (1.0 = bottom).
    async fn scroll_to(&self, fraction: f64) -> SessionResult<()>;

    async fn find_element(&self, locator: &Locator) -> SessionResult<Option<ElementHandle>>;

    async fn find_elements(&self, locator: &Locator) -> SessionResult<Vec<ElementHandle>>;

    async fn is_displayed(&self, element: ElementHandle) -> SessionResult<bool>;

    async fn is_enabled(&self, element: ElementHandle) -> SessionResult<bool>;

    /// Rendered (visible) text of the element.
    async fn text(&self, element: ElementHandle) -> SessionResult<String>;

    async fn attribute(&self, element: ElementHandle, name: &str) -> SessionResult<Option<String>>;

    async fn scroll_into_view(&self, element: ElementHandle) -> SessionResult<()>;

    /// Programmatic `click()` on the element, bypassing pointer hit-testing.
    async fn activate(&self, element: ElementHandle) -> SessionResult<()>;
}

/// Poll until at least one element matches `locator` or `timeout` elapses.
///
/// Lookup errors count as "nothing yet". Always checks at least once, so a
/// zero timeout degrades to a single probe.
pub async fn wait_for_marker(
    session: &dyn BrowserSession,
    locator: &Locator,
    timeout: Duration,
    poll: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(found) = session.find_elements(locator).await {
            if !found.is_empty() {
                return true;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(poll).await;
    }
}

/// Number of elements matching `locator`, zero on lookup failure.
pub async fn count_matches(session: &dyn BrowserSession, locator: &Locator) -> usize {
    session
        .find_elements(locator)
        .await
        .map(|found| found.len())
        .unwrap_or(0)
}
