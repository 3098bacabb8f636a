//! Crawl output flowing through CSV export into the store.

use std::time::Duration;

use netprune::automation::scripted::{ClickEffect, FakeElement, FakePage, ScriptedPage};
use netprune::automation::selectors::{NEXT_BUTTON, PROFILE_LINK, RESULT_NAME, SEARCH_RESULT};
use netprune::crawl::{CrawlOptions, CrawlStop, Crawler};
use netprune::export::{read_url_column, write_profiles_csv};
use netprune::models::ConnectionStatus;
use netprune::repository::EntityRepository;
use netprune::retry::RetryPolicy;
use netprune::scheduler::{Camouflage, DelayRange};
use tempfile::TempDir;
use tokio::sync::mpsc;

const SEARCH: &str = "https://www.linkedin.com/search/results/people/?network=%5B%22F%22%5D";

fn page_url(n: u32) -> String {
    format!("{}&page={}", SEARCH, n)
}

fn card(slug: &str) -> FakeElement {
    FakeElement::new(SEARCH_RESULT[0].css).child(
        FakeElement::new(PROFILE_LINK)
            .attr("href", format!("https://www.linkedin.com/in/{}?trk=search", slug))
            .child(FakeElement::new(RESULT_NAME).text(format!("Person {}\n• 1st", slug))),
    )
}

/// Three pages of four results; page 2 repeats one entry of page 1 and
/// lists one entry twice.
fn search_site() -> ScriptedPage {
    let pages: [(Vec<&str>, Option<String>); 3] = [
        (vec!["a", "b", "c", "d"], Some(page_url(2))),
        (vec!["d", "e", "e", "f"], Some(page_url(3))),
        (vec!["g", "h", "i", "j"], None),
    ];

    let site = ScriptedPage::new();
    for (index, (slugs, next)) in pages.into_iter().enumerate() {
        let mut page = FakePage::new();
        for slug in slugs {
            page = page.element(card(slug));
        }
        if let Some(next) = next {
            page = page.element(
                FakeElement::new(NEXT_BUTTON[0].css).on_click(ClickEffect::Navigate(next)),
            );
        }
        let url = if index == 0 {
            SEARCH.to_string()
        } else {
            page_url(index as u32 + 1)
        };
        site.add_page(url, page);
    }
    site
}

fn crawler(max_pages: u32) -> Crawler {
    Crawler::new(
        CrawlOptions {
            max_pages,
            selector_timeout: Duration::from_millis(10),
            page_deadline: Duration::from_secs(5),
            action_delay: DelayRange::ZERO,
            page_delay: DelayRange::ZERO,
            retry: RetryPolicy::new(1, Duration::ZERO, 1.0),
        },
        Camouflage::disabled(),
    )
}

#[tokio::test]
async fn test_crawl_dedups_within_and_across_pages() {
    let site = search_site();
    let (tx, _rx) = mpsc::channel(64);

    let report = crawler(10).run(&site, SEARCH, tx).await;

    assert_eq!(report.stop, CrawlStop::LastPage);
    assert_eq!(report.pages_visited, 3);
    let slugs: Vec<&str> = report
        .profiles
        .iter()
        .map(|p| p.url.trim_start_matches("https://www.linkedin.com/in/"))
        .collect();
    assert_eq!(slugs, vec!["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]);
    assert!(report.profiles.iter().all(|p| p.name.starts_with("Person ")));
}

#[tokio::test]
async fn test_exported_profiles_load_as_pending_once() {
    let dir = TempDir::new().unwrap();
    let site = search_site();
    let (tx, _rx) = mpsc::channel(64);
    let report = crawler(2).run(&site, SEARCH, tx).await;
    assert_eq!(report.stop, CrawlStop::PageLimit);

    let csv = dir.path().join("profiles.csv");
    write_profiles_csv(&csv, &report.profiles).unwrap();
    let urls = read_url_column(&csv).unwrap();
    assert_eq!(urls.len(), 6);

    let repo = EntityRepository::new(&dir.path().join("connections.db")).unwrap();
    repo.record(&urls[0], ConnectionStatus::Success, "Successfully removed")
        .unwrap();

    let added = urls
        .iter()
        .filter(|url| repo.insert_if_absent(url).unwrap())
        .count();
    assert_eq!(added, 5);
    // Existing rows are never downgraded.
    assert_eq!(
        repo.get_status(&urls[0]).unwrap(),
        Some(ConnectionStatus::Success)
    );
    assert_eq!(repo.list_pending().unwrap().len(), 5);
}
