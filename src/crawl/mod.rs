//! Paginated search-result crawl.
//!
//! Pages are extracted one at a time; identifiers are deduplicated across the
//! whole run. A failed page transition ends the crawl and is never retried.

mod profile;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use profile::{clean_profile_name, extract_profiles, normalize_profile_url, UNKNOWN_LOCATION};

use crate::automation::selectors::{NEXT_BUTTON, SEARCH_RESULT};
use crate::automation::{ClickMode, Element, PageSurface, Result, ScrollTarget, WaitCondition};
use crate::config::Settings;
use crate::error::ErrorKind;
use crate::models::DiscoveredProfile;
use crate::retry::{with_deadline, Deadline, RetryPolicy};
use crate::scheduler::{Camouflage, DelayRange};

/// Fraction of the document to scroll back to after hitting the bottom.
const LAZY_LOAD_RETURN: f64 = 0.8;

/// Why the crawl ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlStop {
    /// A page produced no new profiles.
    NoNewProfiles,
    PageLimit,
    /// No enabled next-page control.
    LastPage,
    NavigationFailed(String),
    /// Extraction or page transition exceeded the per-page deadline.
    PageTimeout,
}

impl fmt::Display for CrawlStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNewProfiles => write!(f, "no new profiles on page"),
            Self::PageLimit => write!(f, "page limit reached"),
            Self::LastPage => write!(f, "no next page"),
            Self::NavigationFailed(e) => write!(f, "navigation failed: {}", e),
            Self::PageTimeout => write!(f, "page timed out"),
        }
    }
}

/// Events emitted while crawling.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    PageStarted { page: u32 },
    PageExtracted { page: u32, found: usize, new: usize, total: usize },
    Camouflage { action: &'static str },
    Stopped { reason: CrawlStop },
}

/// Output of a crawl run.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Unique profiles in discovery order.
    pub profiles: Vec<DiscoveredProfile>,
    pub pages_visited: u32,
    pub stop: CrawlStop,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_pages: u32,
    pub selector_timeout: Duration,
    pub page_deadline: Duration,
    pub action_delay: DelayRange,
    pub page_delay: DelayRange,
    /// Applied to the initial navigation only.
    pub retry: RetryPolicy,
}

impl CrawlOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_pages: settings.crawl.max_pages,
            selector_timeout: settings.timeouts.selector(),
            page_deadline: settings.timeouts.page_deadline(),
            action_delay: settings.pacing.action_delay.to_delay(),
            page_delay: settings.pacing.page_delay.to_delay(),
            retry: settings.retry.policy(),
        }
    }
}

/// Deduplicating accumulator keyed by canonical URL.
#[derive(Debug, Default)]
struct Accumulator {
    seen: HashSet<String>,
    profiles: Vec<DiscoveredProfile>,
}

impl Accumulator {
    /// Add the unseen profiles and return how many were new.
    fn absorb(&mut self, found: Vec<DiscoveredProfile>) -> usize {
        let before = self.profiles.len();
        for profile in found {
            if self.seen.insert(profile.url.clone()) {
                self.profiles.push(profile);
            }
        }
        self.profiles.len() - before
    }
}

pub struct Crawler {
    options: CrawlOptions,
    camouflage: Camouflage,
}

impl Crawler {
    pub fn new(options: CrawlOptions, camouflage: Camouflage) -> Self {
        Self {
            options,
            camouflage,
        }
    }

    /// Crawl from `search_url` until a stop condition fires.
    pub async fn run(
        &self,
        page: &dyn PageSurface,
        search_url: &str,
        event_tx: mpsc::Sender<CrawlEvent>,
    ) -> CrawlReport {
        let mut acc = Accumulator::default();
        let mut current = 1;

        let label = format!("navigation to {}", search_url);
        let navigated = with_deadline(
            self.options
                .retry
                .run(&label, ErrorKind::TRANSIENT, || page.visit(search_url)),
            self.options.page_deadline,
            "initial search navigation",
            || (),
        )
        .await;
        let stop = match navigated {
            Deadline::Completed(Ok(_)) => {
                self.crawl_pages(page, &mut acc, &mut current, &event_tx)
                    .await
            }
            Deadline::Completed(Err(e)) => {
                warn!("Could not open search results: {}", e);
                current = 0;
                CrawlStop::NavigationFailed(e.to_string())
            }
            Deadline::Expired(()) => {
                current = 0;
                CrawlStop::PageTimeout
            }
        };

        info!(
            "Crawl stopped after {} pages ({}): {} unique profiles",
            current,
            stop,
            acc.profiles.len()
        );
        let _ = event_tx
            .send(CrawlEvent::Stopped {
                reason: stop.clone(),
            })
            .await;

        CrawlReport {
            profiles: acc.profiles,
            pages_visited: current,
            stop,
        }
    }

    async fn crawl_pages(
        &self,
        page: &dyn PageSurface,
        acc: &mut Accumulator,
        current: &mut u32,
        event_tx: &mpsc::Sender<CrawlEvent>,
    ) -> CrawlStop {
        loop {
            let _ = event_tx.send(CrawlEvent::PageStarted { page: *current }).await;

            let label = format!("extraction of page {}", current);
            let found = match with_deadline(
                self.extract_page(page),
                self.options.page_deadline,
                &label,
                || (),
            )
            .await
            {
                Deadline::Completed(Ok(found)) => found,
                Deadline::Completed(Err(e)) => {
                    warn!(page = *current, "Extraction failed: {}", e);
                    Vec::new()
                }
                Deadline::Expired(()) => return CrawlStop::PageTimeout,
            };

            let found_count = found.len();
            let new = acc.absorb(found);
            info!(
                page = *current,
                "Found {} profiles ({} new, {} total)",
                found_count,
                new,
                acc.profiles.len()
            );
            let _ = event_tx
                .send(CrawlEvent::PageExtracted {
                    page: *current,
                    found: found_count,
                    new,
                    total: acc.profiles.len(),
                })
                .await;

            if new == 0 {
                return CrawlStop::NoNewProfiles;
            }
            if *current >= self.options.max_pages {
                return CrawlStop::PageLimit;
            }

            if let Some(action) = self.camouflage.maybe_run(page).await {
                let _ = event_tx.send(CrawlEvent::Camouflage { action }).await;
            }
            self.options.page_delay.pause().await;

            let label = format!("transition from page {}", current);
            match with_deadline(
                self.next_page(page),
                self.options.page_deadline,
                &label,
                || (),
            )
            .await
            {
                Deadline::Completed(Ok(true)) => *current += 1,
                Deadline::Completed(Ok(false)) => return CrawlStop::LastPage,
                Deadline::Completed(Err(e)) => {
                    warn!(page = *current, "Next page failed: {}", e);
                    return CrawlStop::NavigationFailed(e.to_string());
                }
                Deadline::Expired(()) => return CrawlStop::PageTimeout,
            }
        }
    }

    /// Wait for results, trigger lazy loading and extract the current page.
    async fn extract_page(&self, page: &dyn PageSurface) -> Result<Vec<DiscoveredProfile>> {
        if !page
            .wait_for(
                WaitCondition::Present(SEARCH_RESULT),
                self.options.selector_timeout,
            )
            .await?
        {
            debug!("No search results rendered");
            return Ok(Vec::new());
        }

        page.scroll(ScrollTarget::Bottom).await?;
        self.options.action_delay.pause().await;
        page.scroll(ScrollTarget::Fraction(LAZY_LOAD_RETURN)).await?;
        self.options.action_delay.pause().await;

        extract_profiles(page).await
    }

    /// Click the first enabled next-page control. Returns `false` on the
    /// last page.
    async fn next_page(&self, page: &dyn PageSurface) -> Result<bool> {
        let Some(next) = first_enabled(page.find(NEXT_BUTTON).await?).await? else {
            info!("No enabled next-page control");
            return Ok(false);
        };

        next.scroll_into_view().await?;
        self.options.action_delay.pause().await;
        next.click(ClickMode::Normal).await?;
        self.options.action_delay.pause().await;

        if !page
            .wait_for(
                WaitCondition::Present(SEARCH_RESULT),
                self.options.selector_timeout,
            )
            .await?
        {
            debug!("Next page rendered no results");
        }
        Ok(true)
    }
}

async fn first_enabled(candidates: Vec<Box<dyn Element>>) -> Result<Option<Box<dyn Element>>> {
    for candidate in candidates {
        if candidate.is_enabled().await? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::scripted::{ClickEffect, FakeElement, FakePage, ScriptedPage};
    use crate::automation::selectors::{PROFILE_LINK, RESULT_LOCATION, RESULT_NAME};

    const SEARCH: &str = "https://www.linkedin.com/search/results/people/?network=F";
    const PAGE_2: &str = "https://www.linkedin.com/search/results/people/?network=F&page=2";

    fn options(max_pages: u32) -> CrawlOptions {
        CrawlOptions {
            max_pages,
            selector_timeout: Duration::from_millis(10),
            page_deadline: Duration::from_secs(5),
            action_delay: DelayRange::ZERO,
            page_delay: DelayRange::ZERO,
            retry: RetryPolicy::new(2, Duration::ZERO, 1.0),
        }
    }

    fn crawler(max_pages: u32) -> Crawler {
        Crawler::new(options(max_pages), Camouflage::disabled())
    }

    fn card(slug: &str) -> FakeElement {
        FakeElement::new(SEARCH_RESULT[0].css)
            .child(
                FakeElement::new(PROFILE_LINK)
                    .attr("href", format!("/in/{}?miniProfileUrn=urn", slug))
                    .child(FakeElement::new(RESULT_NAME).text(format!("{} • 1st", slug))),
            )
            .child(FakeElement::new(RESULT_LOCATION).text("Berlin"))
    }

    fn next_button(target: Option<&str>) -> FakeElement {
        let button = FakeElement::new(NEXT_BUTTON[0].css).text("Next");
        match target {
            Some(url) => button.on_click(ClickEffect::Navigate(url.to_string())),
            None => button.disabled(),
        }
    }

    fn results_page(slugs: impl IntoIterator<Item = String>, next: Option<&str>) -> FakePage {
        let mut page = FakePage::new();
        for slug in slugs {
            page = page.element(card(&slug));
        }
        page.element(next_button(next))
    }

    async fn crawl(page: &ScriptedPage, max_pages: u32) -> CrawlReport {
        let (tx, _rx) = mpsc::channel(64);
        crawler(max_pages).run(page, SEARCH, tx).await
    }

    #[tokio::test]
    async fn test_two_pages_with_one_overlap_yield_nineteen() {
        let first = (0..10).map(|i| format!("user-{}", i));
        let second = (9..19).map(|i| format!("user-{}", i));
        let page = ScriptedPage::new()
            .with_page(SEARCH, results_page(first, Some(PAGE_2)))
            .with_page(PAGE_2, results_page(second, None));

        let report = crawl(&page, 10).await;

        assert_eq!(report.profiles.len(), 19);
        assert_eq!(report.pages_visited, 2);
        assert_eq!(report.stop, CrawlStop::LastPage);

        let mut urls: Vec<&str> = report.profiles.iter().map(|p| p.url.as_str()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 19);
    }

    fn deadline_crawler(page_deadline: Duration, selector_timeout: Duration) -> Crawler {
        let options = CrawlOptions {
            page_deadline,
            selector_timeout,
            ..options(10)
        };
        Crawler::new(options, Camouflage::disabled())
    }

    #[tokio::test]
    async fn test_page_deadline_stops_crawl() {
        let page = ScriptedPage::new().with_page(SEARCH, results_page(Vec::new(), None));
        page.hang_navigation(SEARCH);

        let (tx, _rx) = mpsc::channel(64);
        let started = std::time::Instant::now();
        let report = deadline_crawler(Duration::from_millis(100), Duration::from_millis(10))
            .run(&page, SEARCH, tx)
            .await;

        assert_eq!(report.stop, CrawlStop::PageTimeout);
        assert_eq!(report.pages_visited, 0);
        assert!(report.profiles.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_stalled_next_page_hits_page_deadline() {
        let first = (0..3).map(|i| format!("user-{}", i));
        // Page 2 never renders results, so waiting for them outlasts the deadline
        let page = ScriptedPage::new()
            .with_page(SEARCH, results_page(first, Some(PAGE_2)))
            .with_page(PAGE_2, FakePage::new());

        let (tx, _rx) = mpsc::channel(64);
        let started = std::time::Instant::now();
        let report = deadline_crawler(Duration::from_millis(200), Duration::from_secs(30))
            .run(&page, SEARCH, tx)
            .await;

        assert_eq!(report.stop, CrawlStop::PageTimeout);
        assert_eq!(report.pages_visited, 1);
        assert_eq!(report.profiles.len(), 3);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_card_fields_are_cleaned() {
        let page = ScriptedPage::new().with_page(
            SEARCH,
            results_page(vec!["ada".to_string()], None),
        );

        let report = crawl(&page, 10).await;
        let ada = &report.profiles[0];
        assert_eq!(ada.name, "ada");
        assert_eq!(ada.url, "https://www.linkedin.com/in/ada");
        assert_eq!(ada.location, "Berlin");
    }

    #[tokio::test]
    async fn test_only_primary_link_per_card() {
        let card = FakeElement::new(SEARCH_RESULT[0].css)
            .child(FakeElement::new(PROFILE_LINK).attr("href", "/in/main").text("Main Person"))
            .child(
                FakeElement::new(PROFILE_LINK)
                    .attr("href", "/in/mutual-friend")
                    .text("Mutual Friend is a mutual connection"),
            );
        let page = ScriptedPage::new().with_page(SEARCH, FakePage::new().element(card));

        let report = crawl(&page, 10).await;
        assert_eq!(report.profiles.len(), 1);
        assert_eq!(report.profiles[0].name, "Main Person");
        assert_eq!(report.profiles[0].location, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_repeat_only_page_stops_crawl() {
        let slugs = || (0..3).map(|i| format!("user-{}", i));
        let page = ScriptedPage::new()
            .with_page(SEARCH, results_page(slugs(), Some(PAGE_2)))
            .with_page(PAGE_2, results_page(slugs(), Some(SEARCH)));

        let report = crawl(&page, 10).await;
        assert_eq!(report.profiles.len(), 3);
        assert_eq!(report.stop, CrawlStop::NoNewProfiles);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let page = ScriptedPage::new().with_page(
            SEARCH,
            results_page((0..5).map(|i| format!("user-{}", i)), Some(PAGE_2)),
        );

        let report = crawl(&page, 1).await;
        assert_eq!(report.stop, CrawlStop::PageLimit);
        assert_eq!(report.pages_visited, 1);
        assert_eq!(page.clicks().len(), 0);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let page = ScriptedPage::new().with_page(SEARCH, FakePage::new());
        let report = crawl(&page, 10).await;
        assert!(report.profiles.is_empty());
        assert_eq!(report.stop, CrawlStop::NoNewProfiles);
    }

    #[tokio::test]
    async fn test_initial_navigation_failure() {
        let page = ScriptedPage::new().with_page(SEARCH, FakePage::new().status(429));
        let report = crawl(&page, 10).await;
        assert!(matches!(report.stop, CrawlStop::NavigationFailed(_)));
        assert_eq!(report.pages_visited, 0);
    }

    #[tokio::test]
    async fn test_page_transition_is_not_retried() {
        let mut results = FakePage::new();
        for i in 0..3 {
            results = results.element(card(&format!("user-{}", i)));
        }
        // An enabled control whose click is swallowed by an overlay.
        let results = results.element(
            FakeElement::new(NEXT_BUTTON[0].css)
                .intercepted()
                .on_click(ClickEffect::Navigate(PAGE_2.to_string())),
        );
        let page = ScriptedPage::new().with_page(SEARCH, results);

        let report = crawl(&page, 10).await;
        assert!(matches!(report.stop, CrawlStop::NavigationFailed(_)));
        assert_eq!(report.profiles.len(), 3);
        assert_eq!(page.navigations(), vec![SEARCH.to_string()]);
    }
}
