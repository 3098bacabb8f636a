//! Page automation surface.
//!
//! The workflow engine only talks to a rendered page through [`PageSurface`]
//! and [`Element`]. The Chromium backend drives a real browser over CDP; the
//! scripted backend serves declared pages from memory.

pub mod chromium;
pub mod scripted;
pub mod selectors;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AutomationError;

pub use chromium::ChromiumSession;

pub type Result<T> = std::result::Result<T, AutomationError>;

/// One structural query, optionally narrowed by visible text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector {
    pub css: &'static str,
    /// Case-insensitive substring the element's text must contain.
    pub text: Option<&'static str>,
}

impl Selector {
    pub const fn css(css: &'static str) -> Self {
        Self { css, text: None }
    }

    pub const fn with_text(css: &'static str, text: &'static str) -> Self {
        Self {
            css,
            text: Some(text),
        }
    }
}

/// Ordered fallback alternatives; the first alternative with a match wins.
pub type SelectorSpec = &'static [Selector];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    Normal,
    /// Synthetic DOM click that bypasses overlays intercepting the pointer.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTarget {
    /// Relative vertical scroll in pixels.
    By(i64),
    Bottom,
    /// Absolute position as a fraction of the document height.
    Fraction(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// At least one element matches.
    Present(SelectorSpec),
    /// At least one matching element is visible.
    Visible(SelectorSpec),
    /// No matching element is visible.
    Hidden(SelectorSpec),
}

/// Outcome of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavResponse {
    /// HTTP status of the main document, when the backend can tell.
    pub status: Option<u16>,
    pub url: String,
}

/// Interval between condition checks in the default [`PageSurface::wait_for`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A handle to one element of a rendered page.
#[async_trait]
pub trait Element: Send + Sync {
    async fn text(&self) -> Result<String>;
    async fn attribute(&self, name: &str) -> Result<Option<String>>;
    async fn is_visible(&self) -> Result<bool>;
    async fn is_enabled(&self) -> Result<bool>;
    async fn click(&self, mode: ClickMode) -> Result<()>;
    async fn scroll_into_view(&self) -> Result<()>;
    /// Descendants of this element matching `css`.
    async fn find_within(&self, css: &str) -> Result<Vec<Box<dyn Element>>>;
}

/// A browser view the engine can drive.
#[async_trait]
pub trait PageSurface: Send + Sync {
    /// Navigate and report the main document's status.
    async fn navigate(&self, url: &str) -> Result<NavResponse>;
    async fn current_url(&self) -> Result<String>;
    /// All elements matching a single CSS selector, in document order.
    async fn query(&self, css: &str) -> Result<Vec<Box<dyn Element>>>;
    async fn press_escape(&self) -> Result<()>;
    async fn scroll(&self, target: ScrollTarget) -> Result<()>;
    /// Close every other view whose URL does not contain `keep_pattern`.
    /// Returns how many were closed.
    async fn close_extraneous_views(&self, keep_pattern: &str) -> Result<usize>;
    /// Open a fresh view in the same session.
    async fn open_detached(&self) -> Result<Box<dyn PageSurface>>;
    async fn close(&self) -> Result<()>;

    /// Navigate, turning error statuses into [`AutomationError::HttpStatus`].
    async fn visit(&self, url: &str) -> Result<NavResponse> {
        let response = self.navigate(url).await?;
        match response.status {
            Some(status) if status >= 400 => Err(AutomationError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            _ => Ok(response),
        }
    }

    /// Resolve a selector spec: alternatives are tried in order and the
    /// matches of the first one that yields any are returned.
    async fn find(&self, spec: SelectorSpec) -> Result<Vec<Box<dyn Element>>> {
        for selector in spec {
            let candidates = self.query(selector.css).await?;
            let matched = match selector.text {
                None => candidates,
                Some(needle) => {
                    let needle = needle.to_lowercase();
                    let mut kept = Vec::new();
                    for element in candidates {
                        if element.text().await?.to_lowercase().contains(&needle) {
                            kept.push(element);
                        }
                    }
                    kept
                }
            };
            if !matched.is_empty() {
                return Ok(matched);
            }
        }
        Ok(Vec::new())
    }

    async fn find_first(&self, spec: SelectorSpec) -> Result<Option<Box<dyn Element>>> {
        Ok(self.find(spec).await?.into_iter().next())
    }

    /// First visible match of `spec`, if any.
    async fn find_visible(&self, spec: SelectorSpec) -> Result<Option<Box<dyn Element>>> {
        for element in self.find(spec).await? {
            if element.is_visible().await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    /// Poll until `condition` holds or `timeout` elapses. Returns whether it held.
    async fn wait_for(&self, condition: WaitCondition, timeout: Duration) -> Result<bool> {
        let started = tokio::time::Instant::now();
        loop {
            let satisfied = match condition {
                WaitCondition::Present(spec) => !self.find(spec).await?.is_empty(),
                WaitCondition::Visible(spec) => self.find_visible(spec).await?.is_some(),
                WaitCondition::Hidden(spec) => self.find_visible(spec).await?.is_none(),
            };
            if satisfied {
                return Ok(true);
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout - elapsed)).await;
        }
    }
}
