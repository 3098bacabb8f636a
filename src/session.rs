//! Authenticated browser session bootstrap.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::automation::selectors::{
    AUTHENTICATED_URL_MARKERS, FEED_URL, LOGGED_IN_INDICATORS, LOGIN_URL_MARKERS,
};
use crate::automation::{ChromiumSession, PageSurface};
use crate::config::{Settings, TimeoutSettings};
use crate::error::{AutomationError, SetupError};

/// Re-open the feed this often while waiting for a manual login.
const RENAVIGATE_EVERY: Duration = Duration::from_secs(10);

/// Progress of the login check, for operator feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginProgress {
    /// No session found; the operator must log in within `timeout`.
    Required { timeout: Duration },
    Waiting { elapsed: Duration, timeout: Duration },
    Succeeded { elapsed: Duration },
}

/// Whether the page shows an authenticated session.
pub async fn is_logged_in(page: &dyn PageSurface) -> bool {
    let url = match page.current_url().await {
        Ok(url) => url,
        Err(e) => {
            debug!("Could not read current URL: {}", e);
            return false;
        }
    };

    if LOGIN_URL_MARKERS.iter().any(|m| url.contains(m)) {
        return false;
    }

    match page.find(LOGGED_IN_INDICATORS).await {
        Ok(found) if !found.is_empty() => return true,
        Ok(_) => {}
        Err(e) => debug!("Login indicator probe failed: {}", e),
    }

    AUTHENTICATED_URL_MARKERS
        .iter()
        .any(|m| url.contains(m) && !url.contains("login"))
}

/// Open the feed, tolerating everything except an HTTP error status.
async fn open_feed(page: &dyn PageSurface) -> Result<(), SetupError> {
    match page.visit(FEED_URL).await {
        Ok(_) => Ok(()),
        Err(e @ AutomationError::HttpStatus { .. }) => Err(e.into()),
        Err(e) => {
            warn!("Navigation to feed did not complete: {}", e);
            Ok(())
        }
    }
}

/// Make sure the page is logged in, waiting for a manual login if needed.
pub async fn ensure_logged_in(
    page: &dyn PageSurface,
    timeouts: &TimeoutSettings,
    progress: &(dyn Fn(LoginProgress) + Send + Sync),
) -> Result<(), SetupError> {
    open_feed(page).await?;
    if is_logged_in(page).await {
        info!("Existing session is logged in");
        return Ok(());
    }

    let timeout = timeouts.login_wait();
    let poll = timeouts.login_poll().max(Duration::from_millis(10));
    progress(LoginProgress::Required { timeout });

    let mut elapsed = Duration::ZERO;
    let mut since_navigation = Duration::ZERO;
    while elapsed < timeout {
        tokio::time::sleep(poll).await;
        elapsed += poll;
        since_navigation += poll;

        if since_navigation >= RENAVIGATE_EVERY {
            since_navigation = Duration::ZERO;
            open_feed(page).await?;
            progress(LoginProgress::Waiting { elapsed, timeout });
        }

        if is_logged_in(page).await {
            info!("Login detected after {}s", elapsed.as_secs());
            progress(LoginProgress::Succeeded { elapsed });
            return Ok(());
        }
    }

    Err(SetupError::LoginTimeout(timeout.as_secs()))
}

/// The parts of a launched browser that session bootstrap drives.
#[async_trait]
pub trait BrowserSession: Send + Sync + Sized {
    fn page(&self) -> &dyn PageSurface;
    async fn load_cookies(&self, path: &Path) -> Result<usize, SetupError>;
    async fn save_cookies(&self, path: &Path) -> Result<usize, SetupError>;
    async fn close(self);
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    fn page(&self) -> &dyn PageSurface {
        ChromiumSession::page(self)
    }

    async fn load_cookies(&self, path: &Path) -> Result<usize, SetupError> {
        ChromiumSession::load_cookies(self, path).await
    }

    async fn save_cookies(&self, path: &Path) -> Result<usize, SetupError> {
        ChromiumSession::save_cookies(self, path).await
    }

    async fn close(self) {
        ChromiumSession::close(self).await
    }
}

/// Launch the browser, restore cookies, ensure login and persist cookies.
pub async fn start(
    settings: &Settings,
    progress: &(dyn Fn(LoginProgress) + Send + Sync),
) -> Result<ChromiumSession, SetupError> {
    let session =
        ChromiumSession::launch(&settings.browser, settings.timeouts.navigation()).await?;
    prepare(session, settings, progress).await
}

/// Restore cookies, ensure login and persist cookies on a launched browser.
/// The browser is closed before any error is returned.
pub async fn prepare<S: BrowserSession>(
    session: S,
    settings: &Settings,
    progress: &(dyn Fn(LoginProgress) + Send + Sync),
) -> Result<S, SetupError> {
    let cookies = settings.cookies_path();
    if cookies.exists() {
        if let Err(e) = session.load_cookies(&cookies).await {
            warn!("Ignoring saved cookies: {}", e);
        }
    }

    if let Err(e) = ensure_logged_in(session.page(), &settings.timeouts, progress).await {
        session.close().await;
        return Err(e);
    }

    if let Err(e) = session.save_cookies(&cookies).await {
        session.close().await;
        return Err(e);
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::scripted::{FakeElement, FakePage, ScriptedPage};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn timeouts(wait_ms: u64) -> TimeoutSettings {
        TimeoutSettings {
            login_wait: wait_ms as f64 / 1000.0,
            login_poll: 0.01,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_logged_in_by_indicator() {
        let page = ScriptedPage::new().with_page(
            FEED_URL,
            FakePage::new().element(FakeElement::new(r#"nav[aria-label="Main navigation"]"#)),
        );
        page.navigate(FEED_URL).await.unwrap();
        assert!(is_logged_in(&page).await);
    }

    #[tokio::test]
    async fn test_login_url_is_not_logged_in() {
        let page = ScriptedPage::new().with_page(
            "https://www.linkedin.com/login",
            FakePage::new().element(FakeElement::new(r#"main[role="main"]"#)),
        );
        page.navigate("https://www.linkedin.com/login").await.unwrap();
        assert!(!is_logged_in(&page).await);
    }

    #[tokio::test]
    async fn test_profile_url_counts_as_logged_in() {
        let url = "https://www.linkedin.com/in/someone";
        let page = ScriptedPage::new().with_page(url, FakePage::new());
        page.navigate(url).await.unwrap();
        assert!(is_logged_in(&page).await);
    }

    const LOGIN_URL: &str = "https://www.linkedin.com/uas/login";

    fn logged_out_site() -> ScriptedPage {
        ScriptedPage::new()
            .with_page(FEED_URL, FakePage::new().redirect_to(LOGIN_URL))
            .with_page(LOGIN_URL, FakePage::new())
    }

    #[tokio::test]
    async fn test_already_logged_in_reports_nothing() {
        let page = ScriptedPage::new().with_page(
            FEED_URL,
            FakePage::new().element(FakeElement::new(r#"div[data-test-id="feed-container"]"#)),
        );
        let seen = Mutex::new(Vec::new());
        let record = |p: LoginProgress| seen.lock().unwrap().push(p);

        ensure_logged_in(&page, &timeouts(50), &record).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_logged_in_times_out() {
        let page = logged_out_site();
        let seen = Mutex::new(Vec::new());
        let record = |p: LoginProgress| seen.lock().unwrap().push(p);

        let err = ensure_logged_in(&page, &timeouts(50), &record)
            .await
            .unwrap_err();

        assert!(matches!(err, SetupError::LoginTimeout(0)));
        assert!(matches!(
            seen.lock().unwrap().first(),
            Some(LoginProgress::Required { .. })
        ));
    }

    #[tokio::test]
    async fn test_manual_login_is_detected() {
        let page = logged_out_site().with_page(
            "https://www.linkedin.com/in/me",
            FakePage::new().element(FakeElement::new(r#"main[role="main"]"#)),
        );

        // The operator finishes logging in while we poll.
        let operator = page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            operator.navigate("https://www.linkedin.com/in/me").await.ok();
        });

        let seen = Mutex::new(Vec::new());
        let record = |p: LoginProgress| seen.lock().unwrap().push(p);
        ensure_logged_in(&page, &timeouts(5_000), &record)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(matches!(seen.last(), Some(LoginProgress::Succeeded { .. })));
    }

    #[tokio::test]
    async fn test_http_error_on_feed_is_setup_failure() {
        let page = ScriptedPage::new().with_page(FEED_URL, FakePage::new().status(429));
        let err = ensure_logged_in(&page, &timeouts(50), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SetupError::Automation(AutomationError::HttpStatus { status: 429, .. })
        ));
    }

    struct FakeSession {
        page: ScriptedPage,
        fail_save: bool,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        fn page(&self) -> &dyn PageSurface {
            &self.page
        }

        async fn load_cookies(&self, _path: &Path) -> Result<usize, SetupError> {
            Ok(0)
        }

        async fn save_cookies(&self, _path: &Path) -> Result<usize, SetupError> {
            if self.fail_save {
                Err(SetupError::Cookies("read-only file system".into()))
            } else {
                Ok(1)
            }
        }

        async fn close(self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn logged_in_session(fail_save: bool) -> (FakeSession, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let page = ScriptedPage::new().with_page(
            FEED_URL,
            FakePage::new().element(FakeElement::new(r#"main[role="main"]"#)),
        );
        let session = FakeSession {
            page,
            fail_save,
            closed: Arc::clone(&closed),
        };
        (session, closed)
    }

    fn settings_in(dir: &TempDir) -> Settings {
        Settings {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_prepare_keeps_session_open_on_success() {
        let dir = TempDir::new().unwrap();
        let (session, closed) = logged_in_session(false);

        let session = prepare(session, &settings_in(&dir), &|_| {}).await;

        assert!(session.is_ok());
        assert!(!closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cookie_save_failure_closes_session() {
        let dir = TempDir::new().unwrap();
        let (session, closed) = logged_in_session(true);

        let err = prepare(session, &settings_in(&dir), &|_| {})
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SetupError::Cookies(_)));
        assert!(closed.load(Ordering::SeqCst));
    }
}
