//! End-to-end removal runs against the scripted page and a real SQLite store.

use std::time::Duration;

use netprune::automation::scripted::{ClickEffect, FakeElement, FakePage, ScriptedPage};
use netprune::automation::selectors::{
    CONNECT_BUTTON, DROPDOWN_CONTENT, MORE_BUTTON, REMOVE_CONNECTION,
};
use netprune::automation::ClickMode;
use netprune::models::ConnectionStatus;
use netprune::relationship::{ConnectionRemover, RemovalSettings, MSG_REMOVED};
use netprune::repository::EntityRepository;
use netprune::retry::RetryPolicy;
use netprune::scheduler::{BatchScheduler, Camouflage, DelayRange, SchedulerSettings};
use tempfile::TempDir;
use tokio::sync::mpsc;

const CONNECTED: &str = "https://www.linkedin.com/in/connected";
const STRANGER: &str = "https://www.linkedin.com/in/stranger";
const BROKEN: &str = "https://www.linkedin.com/in/broken";

fn connect_button() -> FakeElement {
    FakeElement::new(CONNECT_BUTTON[0].css).text("Connect")
}

fn connected_profile() -> FakePage {
    let option = FakeElement::new(REMOVE_CONNECTION[0].css)
        .on_click(ClickEffect::Remove(vec![
            MORE_BUTTON[0].css.to_string(),
            DROPDOWN_CONTENT[0].css.to_string(),
        ]))
        .on_click(ClickEffect::Insert(vec![connect_button()]));
    let menu = FakeElement::new(DROPDOWN_CONTENT[0].css)
        .dismissible()
        .child(option);
    FakePage::new().element(
        FakeElement::new(MORE_BUTTON[0].css)
            .text("More")
            .on_click(ClickEffect::Insert(vec![menu])),
    )
}

fn site() -> ScriptedPage {
    ScriptedPage::new()
        .with_page(CONNECTED, connected_profile())
        .with_page(STRANGER, FakePage::new().element(connect_button()))
        // Renders neither affordance.
        .with_page(BROKEN, FakePage::new())
}

fn scheduler() -> BatchScheduler {
    BatchScheduler::new(
        ConnectionRemover::new(RemovalSettings {
            short_selector: Duration::from_millis(10),
            verification: Duration::from_millis(10),
            action_delay: DelayRange::ZERO,
            retry: RetryPolicy::new(2, Duration::ZERO, 1.0),
        }),
        Camouflage::disabled(),
        SchedulerSettings {
            batch_size: 2,
            removal_delay: DelayRange::ZERO,
            batch_cooldown: DelayRange::ZERO,
            entity_deadline: Duration::from_secs(5),
        },
    )
}

fn seeded_store(dir: &TempDir) -> EntityRepository {
    let repo = EntityRepository::new(&dir.path().join("connections.db")).unwrap();
    for id in [CONNECTED, STRANGER, BROKEN] {
        assert!(repo.insert_if_absent(id).unwrap());
    }
    repo
}

#[tokio::test]
async fn test_every_entity_ends_in_a_terminal_status() {
    let dir = TempDir::new().unwrap();
    let repo = seeded_store(&dir);
    let page = site();
    let (tx, _rx) = mpsc::channel(256);

    let ids = repo.list_pending().unwrap();
    let summary = scheduler()
        .run(&page, &repo, &ids, false, tx)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.batches, 2);

    let removed = repo.get(CONNECTED).unwrap().unwrap();
    assert_eq!(removed.status, ConnectionStatus::Success);
    assert_eq!(removed.message.as_deref(), Some(MSG_REMOVED));
    assert_eq!(
        repo.get_status(STRANGER).unwrap(),
        Some(ConnectionStatus::NotConnected)
    );
    assert_eq!(
        repo.get_status(BROKEN).unwrap(),
        Some(ConnectionStatus::Failed)
    );
}

#[tokio::test]
async fn test_second_run_only_revisits_failures() {
    let dir = TempDir::new().unwrap();
    let repo = seeded_store(&dir);
    let page = site();

    let ids = repo.list_pending().unwrap();
    let (tx, _rx) = mpsc::channel(256);
    scheduler().run(&page, &repo, &ids, false, tx).await.unwrap();

    // Successes and observations are not picked up again.
    assert_eq!(repo.list_pending().unwrap(), vec![BROKEN.to_string()]);

    let before = page.navigations().len();
    let ids = repo.list_pending().unwrap();
    let (tx, _rx) = mpsc::channel(256);
    scheduler().run(&page, &repo, &ids, false, tx).await.unwrap();

    let revisited: Vec<String> = page.navigations().split_off(before);
    assert_eq!(revisited, vec![BROKEN.to_string()]);
}

#[tokio::test]
async fn test_dry_run_leaves_connected_entities_pending() {
    let dir = TempDir::new().unwrap();
    let repo = seeded_store(&dir);
    let page = site();
    let (tx, _rx) = mpsc::channel(256);

    let ids = vec![CONNECTED.to_string(), STRANGER.to_string()];
    let summary = scheduler()
        .run(&page, &repo, &ids, true, tx)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(
        repo.get_status(CONNECTED).unwrap(),
        Some(ConnectionStatus::Pending)
    );
    assert_eq!(
        repo.get_status(STRANGER).unwrap(),
        Some(ConnectionStatus::NotConnected)
    );
    // Only the menu trigger was clicked; the removal was never confirmed.
    assert_eq!(
        page.clicks(),
        vec![(MORE_BUTTON[0].css.to_string(), ClickMode::Normal)]
    );
}

#[test]
fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let repo = seeded_store(&dir);
        repo.record(CONNECTED, ConnectionStatus::Success, MSG_REMOVED)
            .unwrap();
    }

    let reopened = EntityRepository::new(&dir.path().join("connections.db")).unwrap();
    assert_eq!(
        reopened.get_status(CONNECTED).unwrap(),
        Some(ConnectionStatus::Success)
    );
    assert_eq!(reopened.list_all().unwrap().len(), 3);
}
