//! Search-results crawl command.

use std::path::PathBuf;

use console::style;
use tokio::sync::mpsc;

use crate::automation::selectors::DEFAULT_SEARCH_URL;
use crate::config::Settings;
use crate::crawl::{CrawlEvent, CrawlOptions, Crawler};
use crate::export::write_profiles_csv;
use crate::repository::EntityRepository;
use crate::scheduler::Camouflage;

use crate::cli::helpers::{open_session, print_banner, spinner};

/// Page budget of a dry run.
const DRY_RUN_PAGES: u32 = 2;
/// Profiles shown after a dry run.
const DRY_RUN_SAMPLE: usize = 5;

/// Crawl search results and export the discovered profiles.
pub async fn cmd_crawl(
    settings: &Settings,
    search_url: Option<String>,
    output: Option<PathBuf>,
    dry_run: bool,
    max_pages: Option<u32>,
    enqueue: bool,
) -> anyhow::Result<()> {
    let max_pages = match max_pages {
        Some(0) => anyhow::bail!("--max-pages must be >= 1"),
        Some(n) => n,
        None if dry_run => DRY_RUN_PAGES,
        None => settings.crawl.max_pages,
    };
    let search_url = search_url
        .or_else(|| settings.crawl.search_url.clone())
        .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
    let output = output.unwrap_or_else(|| settings.profiles_csv_path());

    print_banner("Search crawl", dry_run);
    println!("{:<12} {}", "Search:", search_url);
    println!("{:<12} {}", "Max pages:", max_pages);
    if !dry_run {
        println!("{:<12} {}", "Output:", output.display());
    }

    let Some(session) = open_session(settings).await else {
        return Ok(());
    };

    let mut options = CrawlOptions::from_settings(settings);
    options.max_pages = max_pages;
    let crawler = Crawler::new(
        options,
        Camouflage::new(
            settings.pacing.camouflage_probability,
            settings.pacing.action_delay.to_delay(),
        ),
    );

    let (event_tx, mut event_rx) = mpsc::channel::<CrawlEvent>(100);
    let event_handler = tokio::spawn(async move {
        let progress = spinner();
        while let Some(event) = event_rx.recv().await {
            match event {
                CrawlEvent::PageStarted { page } => {
                    progress.set_message(format!("Extracting page {}...", page));
                }
                CrawlEvent::PageExtracted {
                    page,
                    found,
                    new,
                    total,
                } => {
                    progress.println(format!(
                        "{} Page {}: {} profiles ({} new, {} total)",
                        style("✓").green(),
                        page,
                        found,
                        new,
                        total
                    ));
                }
                CrawlEvent::Camouflage { action } => {
                    progress.set_message(format!("Browsing ({})...", action));
                }
                CrawlEvent::Stopped { reason } => {
                    progress.println(format!("{} Stopped: {}", style("→").dim(), reason));
                }
            }
        }
        progress.finish_and_clear();
    });

    let report = crawler.run(session.page(), &search_url, event_tx).await;
    let _ = event_handler.await;
    session.close().await;

    println!(
        "\n{} Found {} unique profiles across {} pages",
        style("✓").green(),
        report.profiles.len(),
        report.pages_visited
    );

    if dry_run {
        for profile in report.profiles.iter().take(DRY_RUN_SAMPLE) {
            println!(
                "  {} {} ({})",
                style("•").dim(),
                profile.name,
                style(&profile.location).dim()
            );
            println!("    {}", style(&profile.url).dim());
        }
        println!(
            "  {} Dry run: no file written, nothing queued",
            style("→").dim()
        );
        return Ok(());
    }

    write_profiles_csv(&output, &report.profiles)?;
    println!(
        "{} Saved {} profiles to {}",
        style("✓").green(),
        report.profiles.len(),
        output.display()
    );

    if enqueue {
        let repo = EntityRepository::new(&settings.database_path())?;
        let mut added = 0;
        for profile in &report.profiles {
            if repo.insert_if_absent(&profile.url)? {
                added += 1;
            }
        }
        println!(
            "{} Queued {} new profiles ({} already tracked)",
            style("✓").green(),
            added,
            report.profiles.len() - added
        );
    }

    Ok(())
}
