//! Finding the "load more" control through an ordered list of strategies.
//!
//! The trigger's markup is not stable across page versions, so each site
//! describes it several ways, from most to least specific:
//!
//! 1. a stable class selector
//! 2. exact link text over the known labels (`еще` and `ещё` spellings)
//! 3. partial link text plus a keyword check
//! 4. structural XPath expressions
//! 5. a scan of every clickable element's visible text
//!
//! [`LocatorCascade::find_trigger`] tries them in order and returns the first
//! candidate that is displayed and enabled.

use crate::browser::{BrowserSession, ElementHandle, SessionResult};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument};

/// How to look up elements in the live page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    TagName(String),
    /// Anchor whose trimmed visible text equals the value.
    LinkText(String),
    /// Anchor whose visible text contains the value.
    PartialLinkText(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn tag(name: &str) -> Self {
        Locator::TagName(name.to_string())
    }

    pub fn link_text(text: &str) -> Self {
        Locator::LinkText(text.to_string())
    }

    pub fn partial_link_text(text: &str) -> Self {
        Locator::PartialLinkText(text.to_string())
    }

    pub fn xpath(expr: &str) -> Self {
        Locator::XPath(expr.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css={s}"),
            Locator::TagName(s) => write!(f, "tag={s}"),
            Locator::LinkText(s) => write!(f, "link_text={s}"),
            Locator::PartialLinkText(s) => write!(f, "partial_link_text={s}"),
            Locator::XPath(s) => write!(f, "xpath={s}"),
        }
    }
}

/// Keyword test for a control's visible text.
///
/// Matches when the lowercased text contains one of `verbs` and, if any
/// `qualifiers` are given, one of those as well.
#[derive(Debug, Clone, Copy)]
pub struct Keywords {
    pub verbs: &'static [&'static str],
    pub qualifiers: &'static [&'static str],
}

impl Keywords {
    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.verbs.iter().any(|v| lower.contains(v))
            && (self.qualifiers.is_empty() || self.qualifiers.iter().any(|q| lower.contains(q)))
    }
}

/// One way of locating the trigger control.
#[async_trait]
pub trait TriggerStrategy: Send + Sync {
    /// Short description for progress logs.
    fn label(&self) -> String;

    async fn try_locate(&self, session: &dyn BrowserSession) -> SessionResult<Option<ElementHandle>>;
}

/// Look up the first element matching a locator and vet it.
pub struct SelectorStrategy {
    locator: Locator,
    keywords: Option<Keywords>,
    class_hint: Option<&'static str>,
    require_text: bool,
}

impl SelectorStrategy {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            keywords: None,
            class_hint: None,
            require_text: false,
        }
    }

    /// Accept only elements whose text passes `keywords`.
    pub fn with_keywords(mut self, keywords: Keywords) -> Self {
        self.keywords = Some(keywords);
        self
    }

    /// Accept only elements whose `class` attribute contains `fragment`.
    pub fn with_class_hint(mut self, fragment: &'static str) -> Self {
        self.class_hint = Some(fragment);
        self
    }

    /// Accept only elements with non-empty visible text.
    pub fn requiring_text(mut self) -> Self {
        self.require_text = true;
        self
    }
}

#[async_trait]
impl TriggerStrategy for SelectorStrategy {
    fn label(&self) -> String {
        self.locator.to_string()
    }

    async fn try_locate(&self, session: &dyn BrowserSession) -> SessionResult<Option<ElementHandle>> {
        let Some(element) = session.find_element(&self.locator).await? else {
            return Ok(None);
        };

        if self.keywords.is_some() || self.require_text {
            let text = session.text(element).await?;
            let text = text.trim();
            if self.require_text && text.is_empty() {
                return Ok(None);
            }
            if let Some(keywords) = &self.keywords {
                if !keywords.matches(text) {
                    return Ok(None);
                }
            }
        }

        if let Some(fragment) = self.class_hint {
            let class = session.attribute(element, "class").await?.unwrap_or_default();
            if !class.contains(fragment) {
                return Ok(None);
            }
        }

        if is_interactive(session, element).await? {
            Ok(Some(element))
        } else {
            Ok(None)
        }
    }
}

/// Brute force: walk every element with a given tag and test its text.
pub struct ScanStrategy {
    tag: &'static str,
    keywords: Keywords,
}

impl ScanStrategy {
    pub fn new(tag: &'static str, keywords: Keywords) -> Self {
        Self { tag, keywords }
    }
}

#[async_trait]
impl TriggerStrategy for ScanStrategy {
    fn label(&self) -> String {
        format!("scan <{}>", self.tag)
    }

    async fn try_locate(&self, session: &dyn BrowserSession) -> SessionResult<Option<ElementHandle>> {
        let candidates = session.find_elements(&Locator::tag(self.tag)).await?;
        for element in candidates {
            // Nodes can be recycled mid-scan; a failing candidate is just skipped.
            let Ok(text) = session.text(element).await else {
                continue;
            };
            if !self.keywords.matches(text.trim()) {
                continue;
            }
            if let Ok(true) = is_interactive(session, element).await {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }
}

async fn is_interactive(session: &dyn BrowserSession, element: ElementHandle) -> SessionResult<bool> {
    Ok(session.is_displayed(element).await? && session.is_enabled(element).await?)
}

/// A located trigger control and the strategy that found it.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub element: ElementHandle,
    pub strategy: String,
}

/// Ordered strategy list for one site's trigger control.
#[derive(Default)]
pub struct LocatorCascade {
    strategies: Vec<Box<dyn TriggerStrategy>>,
}

impl LocatorCascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, strategy: impl TriggerStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// First trigger any strategy accepts, in priority order.
    ///
    /// A strategy that errors is logged and treated as "not found".
    pub async fn find_trigger(&self, session: &dyn BrowserSession) -> Option<Trigger> {
        for strategy in &self.strategies {
            match strategy.try_locate(session).await {
                Ok(Some(element)) => {
                    return Some(Trigger {
                        element,
                        strategy: strategy.label(),
                    });
                }
                Ok(None) => {}
                Err(e) => debug!(strategy = %strategy.label(), error = %e, "Trigger strategy failed"),
            }
        }
        None
    }

    /// Scroll `trigger` into view, let scroll-linked rendering settle, then click it.
    #[instrument(level = "debug", skip_all, fields(strategy = %trigger.strategy))]
    pub async fn activate(
        session: &dyn BrowserSession,
        trigger: &Trigger,
        settle: Duration,
    ) -> SessionResult<()> {
        session.scroll_into_view(trigger.element).await?;
        sleep(settle).await;
        session.activate(trigger.element).await
    }
}
