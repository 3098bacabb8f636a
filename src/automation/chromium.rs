//! Chromium backend over the DevTools protocol.
//!
//! Launches a local Chrome/Chromium (or attaches to a remote DevTools
//! endpoint) and exposes its main tab as a [`PageSurface`].

use std::path::Path;
#[cfg(feature = "browser")]
use std::path::PathBuf;
#[cfg(feature = "browser")]
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::handler::viewport::Viewport;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

#[cfg(feature = "browser")]
use super::{ClickMode, Element, NavResponse, Result, ScrollTarget};
use super::PageSurface;
use crate::config::BrowserSettings;
#[cfg(feature = "browser")]
use crate::error::AutomationError;
use crate::error::SetupError;

#[cfg(feature = "browser")]
const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

#[cfg(feature = "browser")]
const NAVIGATION_STATUS_SCRIPT: &str =
    "performance.getEntriesByType('navigation')[0]?.responseStatus ?? null";

#[cfg(feature = "browser")]
const IS_VISIBLE_FN: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
}"#;

#[cfg(feature = "browser")]
const IS_ENABLED_FN: &str =
    "function() { return !this.disabled && this.getAttribute('aria-disabled') !== 'true'; }";

#[cfg(feature = "browser")]
const FORCE_CLICK_FN: &str = "function() { this.click(); }";

#[cfg(feature = "browser")]
fn cdp(e: CdpError) -> AutomationError {
    match e {
        CdpError::Timeout => AutomationError::Timeout("DevTools request timed out".to_string()),
        other => AutomationError::backend(other),
    }
}

/// A running browser plus its primary tab.
#[cfg(feature = "browser")]
pub struct ChromiumSession {
    browser: Arc<Mutex<Browser>>,
    page: ChromiumPage,
}

#[cfg(feature = "browser")]
impl ChromiumSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    fn find_chrome() -> std::result::Result<PathBuf, SetupError> {
        for path in Self::CHROME_PATHS {
            let p = Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(SetupError::ChromeNotFound)
    }

    /// Launch (or attach to) a browser and prepare its primary tab.
    pub async fn launch(
        settings: &BrowserSettings,
        navigation_timeout: Duration,
    ) -> std::result::Result<Self, SetupError> {
        let browser = match settings.remote_url.as_deref() {
            Some(url) => Self::connect_remote(url, navigation_timeout).await?,
            None => Self::launch_local(settings).await?,
        };
        let browser = Arc::new(Mutex::new(browser));

        let page = browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| SetupError::Launch(e.to_string()))?;

        let page = ChromiumPage::prepare(
            page,
            Arc::clone(&browser),
            settings.user_agent.clone(),
            settings.locale.clone(),
            navigation_timeout,
        )
        .await?;

        Ok(Self { browser, page })
    }

    async fn launch_local(settings: &BrowserSettings) -> std::result::Result<Browser, SetupError> {
        info!("Launching browser (headless={})", settings.headless);
        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(settings.viewport_width, settings.viewport_height)
            .viewport(Viewport {
                width: settings.viewport_width,
                height: settings.viewport_height,
                ..Default::default()
            });

        // with_head means NOT headless
        if !settings.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = settings.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg(format!("--lang={}", settings.locale));

        for arg in &settings.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder.build().map_err(SetupError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SetupError::Launch(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn connect_remote(
        url: &str,
        request_timeout: Duration,
    ) -> std::result::Result<Browser, SetupError> {
        info!("Connecting to remote browser at {}", url);

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(|e| SetupError::Remote(e.to_string()))?
            .json()
            .await
            .map_err(|e| SetupError::Remote(format!("invalid version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SetupError::Remote("no webSocketDebuggerUrl in response".into()))?;

        info!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout,
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| SetupError::Remote(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// The primary tab.
    pub fn page(&self) -> &dyn PageSurface {
        &self.page
    }

    /// Inject cookies saved by a previous session. Returns how many were set.
    pub async fn load_cookies(&self, path: &Path) -> std::result::Result<usize, SetupError> {
        debug!("Loading cookies from {:?}", path);

        let content =
            std::fs::read_to_string(path).map_err(|e| SetupError::Cookies(e.to_string()))?;
        let cookies: Vec<serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| SetupError::Cookies(e.to_string()))?;

        let mut applied = 0;
        for cookie in cookies {
            let field = |key: &str| {
                cookie
                    .get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let name = match field("name") {
                n if n.is_empty() => field("key"),
                n => n,
            };
            let domain = field("domain");
            if name.is_empty() || domain.is_empty() {
                continue;
            }

            let mut builder = CookieParam::builder()
                .name(name.clone())
                .value(field("value"))
                .domain(domain);
            let path = field("path");
            if !path.is_empty() {
                builder = builder.path(path);
            }

            match builder.build() {
                Ok(param) => match self.page.page.set_cookie(param).await {
                    Ok(_) => applied += 1,
                    Err(e) => warn!("Failed to set cookie {}: {}", name, e),
                },
                Err(e) => warn!("Failed to build cookie {}: {}", name, e),
            }
        }

        info!("Loaded {} cookies", applied);
        Ok(applied)
    }

    /// Persist the session's cookies. Returns how many were written.
    pub async fn save_cookies(&self, path: &Path) -> std::result::Result<usize, SetupError> {
        let cookies = self
            .page
            .page
            .get_cookies()
            .await
            .map_err(|e| SetupError::Cookies(e.to_string()))?;

        let saved: Vec<SavedCookie> = cookies
            .iter()
            .map(|c| SavedCookie {
                name: c.name.clone(),
                value: c.value.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SetupError::Cookies(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&saved)
            .map_err(|e| SetupError::Cookies(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| SetupError::Cookies(e.to_string()))?;

        debug!("Saved {} cookies to {:?}", saved.len(), path);
        Ok(saved.len())
    }

    /// Shut the browser down.
    pub async fn close(self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            debug!("Browser close failed: {}", e);
        }
    }
}

#[cfg(feature = "browser")]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure: bool,
    http_only: bool,
}

/// One browser tab.
#[cfg(feature = "browser")]
#[derive(Clone)]
pub struct ChromiumPage {
    page: Page,
    browser: Arc<Mutex<Browser>>,
    user_agent: String,
    locale: String,
    navigation_timeout: Duration,
}

#[cfg(feature = "browser")]
impl ChromiumPage {
    async fn prepare(
        page: Page,
        browser: Arc<Mutex<Browser>>,
        user_agent: String,
        locale: String,
        navigation_timeout: Duration,
    ) -> std::result::Result<Self, AutomationError> {
        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(user_agent.clone())
            .accept_language(locale.clone())
            .build()
            .map_err(AutomationError::Backend)?;
        page.execute(ua).await.map_err(cdp)?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            HIDE_WEBDRIVER_SCRIPT,
        ))
        .await
        .map_err(cdp)?;

        Ok(Self {
            page,
            browser,
            user_agent,
            locale,
            navigation_timeout,
        })
    }

    async fn response_status(&self) -> Option<u16> {
        match self.page.evaluate(NAVIGATION_STATUS_SCRIPT).await {
            Ok(result) => result.into_value::<Option<u16>>().ok().flatten(),
            Err(e) => {
                debug!("Could not read navigation status: {}", e);
                None
            }
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageSurface for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<NavResponse> {
        debug!("Navigating to {}", url);
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Err(_) => {
                return Err(AutomationError::Timeout(format!(
                    "navigation to {} exceeded {}s",
                    url,
                    self.navigation_timeout.as_secs()
                )))
            }
            Ok(Err(e)) => {
                return Err(AutomationError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Ok(Ok(_)) => {}
        }

        let status = self.response_status().await;
        let final_url = self.current_url().await.unwrap_or_else(|_| url.to_string());
        Ok(NavResponse {
            status,
            url: final_url,
        })
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await.map_err(cdp)?.unwrap_or_default())
    }

    async fn query(&self, css: &str) -> Result<Vec<Box<dyn Element>>> {
        let elements = match self.page.find_elements(css).await {
            Ok(elements) => elements,
            // CDP reports "no node" as an error; treat as empty
            Err(e) => {
                debug!("No match for {}: {}", css, e);
                Vec::new()
            }
        };
        Ok(elements
            .into_iter()
            .map(|element| Box::new(ChromiumElement { element }) as Box<dyn Element>)
            .collect())
    }

    async fn press_escape(&self) -> Result<()> {
        let body = self.page.find_element("body").await.map_err(cdp)?;
        body.press_key("Escape").await.map_err(cdp)?;
        Ok(())
    }

    async fn scroll(&self, target: ScrollTarget) -> Result<()> {
        let script = match target {
            ScrollTarget::By(pixels) => format!("window.scrollBy(0, {})", pixels),
            ScrollTarget::Bottom => "window.scrollTo(0, document.body.scrollHeight)".to_string(),
            ScrollTarget::Fraction(f) => {
                format!("window.scrollTo(0, document.body.scrollHeight * {})", f)
            }
        };
        self.page.evaluate(script).await.map_err(cdp)?;
        Ok(())
    }

    async fn close_extraneous_views(&self, keep_pattern: &str) -> Result<usize> {
        let pages = self.browser.lock().await.pages().await.map_err(cdp)?;
        let mut closed = 0;
        for page in pages {
            if page.target_id() == self.page.target_id() {
                continue;
            }
            let url = page.url().await.ok().flatten().unwrap_or_default();
            if url.contains(keep_pattern) {
                continue;
            }
            debug!("Closing extraneous tab {}", url);
            if let Err(e) = page.close().await {
                warn!("Failed to close tab {}: {}", url, e);
            } else {
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn open_detached(&self) -> Result<Box<dyn PageSurface>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(cdp)?;
        let view = ChromiumPage::prepare(
            page,
            Arc::clone(&self.browser),
            self.user_agent.clone(),
            self.locale.clone(),
            self.navigation_timeout,
        )
        .await?;
        Ok(Box::new(view))
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await.map_err(cdp)
    }
}

#[cfg(feature = "browser")]
struct ChromiumElement {
    element: chromiumoxide::Element,
}

#[cfg(feature = "browser")]
impl ChromiumElement {
    async fn eval_bool(&self, function: &str) -> Result<bool> {
        let returns = self
            .element
            .call_js_fn(function, false)
            .await
            .map_err(cdp)?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Element for ChromiumElement {
    async fn text(&self) -> Result<String> {
        Ok(self
            .element
            .inner_text()
            .await
            .map_err(cdp)?
            .unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.element.attribute(name).await.map_err(cdp)
    }

    async fn is_visible(&self) -> Result<bool> {
        // Detached nodes are simply not visible
        Ok(self.eval_bool(IS_VISIBLE_FN).await.unwrap_or(false))
    }

    async fn is_enabled(&self) -> Result<bool> {
        self.eval_bool(IS_ENABLED_FN).await
    }

    async fn click(&self, mode: ClickMode) -> Result<()> {
        match mode {
            ClickMode::Normal => {
                self.element.click().await.map_err(cdp)?;
            }
            ClickMode::Forced => {
                self.element
                    .call_js_fn(FORCE_CLICK_FN, false)
                    .await
                    .map_err(cdp)?;
            }
        }
        Ok(())
    }

    async fn scroll_into_view(&self) -> Result<()> {
        self.element.scroll_into_view().await.map_err(cdp)?;
        Ok(())
    }

    async fn find_within(&self, css: &str) -> Result<Vec<Box<dyn Element>>> {
        let elements = self.element.find_elements(css).await.unwrap_or_default();
        Ok(elements
            .into_iter()
            .map(|element| Box::new(ChromiumElement { element }) as Box<dyn Element>)
            .collect())
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct ChromiumSession {
    never: std::convert::Infallible,
}

#[cfg(not(feature = "browser"))]
impl ChromiumSession {
    pub async fn launch(
        _settings: &BrowserSettings,
        _navigation_timeout: Duration,
    ) -> std::result::Result<Self, SetupError> {
        Err(SetupError::BrowserUnavailable)
    }

    pub fn page(&self) -> &dyn PageSurface {
        match self.never {}
    }

    pub async fn load_cookies(&self, _path: &Path) -> std::result::Result<usize, SetupError> {
        match self.never {}
    }

    pub async fn save_cookies(&self, _path: &Path) -> std::result::Result<usize, SetupError> {
        match self.never {}
    }

    pub async fn close(self) {}
}
