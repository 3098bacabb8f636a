//! Connection removal command.

use console::style;
use indicatif::ProgressBar;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::crawl::normalize_profile_url;
use crate::models::RunSummary;
use crate::relationship::{ConnectionRemover, RemovalSettings};
use crate::repository::EntityRepository;
use crate::scheduler::{BatchScheduler, Camouflage, SchedulerEvent, SchedulerSettings};

use crate::cli::helpers::{
    open_session, outcome_mark, print_banner, progress_bar, status_style, truncate,
};

/// Profiles processed by a dry run.
const DRY_RUN_LIMIT: usize = 5;

fn build_scheduler(settings: &Settings) -> BatchScheduler {
    BatchScheduler::new(
        ConnectionRemover::new(RemovalSettings::from_settings(settings)),
        Camouflage::new(
            settings.pacing.camouflage_probability,
            settings.pacing.action_delay.to_delay(),
        ),
        SchedulerSettings::from_settings(settings),
    )
}

/// Remove connections for the pending queue or a single profile.
pub async fn cmd_remove(
    settings: &Settings,
    dry_run: bool,
    url: Option<String>,
    profiles: Option<usize>,
) -> anyhow::Result<()> {
    if profiles == Some(0) {
        anyhow::bail!("--profiles must be >= 1");
    }

    let repo = EntityRepository::new(&settings.database_path())?;

    match url {
        Some(url) => remove_single(settings, &repo, &url, dry_run).await,
        None => remove_pending(settings, &repo, dry_run, profiles).await,
    }
}

async fn remove_single(
    settings: &Settings,
    repo: &EntityRepository,
    url: &str,
    dry_run: bool,
) -> anyhow::Result<()> {
    let id = normalize_profile_url(url).unwrap_or_else(|| url.trim().to_string());
    print_banner("Single profile", dry_run);
    println!("  {}", id);

    let Some(session) = open_session(settings).await else {
        return Ok(());
    };

    let scheduler = build_scheduler(settings);
    let report = scheduler
        .process_entity(session.page(), repo, &id, dry_run, !dry_run)
        .await;
    session.close().await;
    let report = report?;

    println!();
    println!("{:<12} {}", "Observed:", status_style(report.observed));
    println!(
        "{:<12} {} {}",
        "Outcome:",
        outcome_mark(report.outcome),
        report.outcome.as_str()
    );
    println!("{:<12} {}", "Message:", report.message);
    if let Some(reason) = report.stop {
        println!("{} {}", style("!").yellow(), reason);
    }
    Ok(())
}

async fn remove_pending(
    settings: &Settings,
    repo: &EntityRepository,
    dry_run: bool,
    profiles: Option<usize>,
) -> anyhow::Result<()> {
    let mut pending = repo.list_pending()?;
    if pending.is_empty() {
        println!("{} No pending profiles to process", style("!").yellow());
        println!("  Queue profiles with 'netprune load' or 'netprune crawl --enqueue'");
        return Ok(());
    }

    let available = pending.len();
    if let Some(n) = profiles {
        pending.truncate(n);
    }
    if dry_run {
        pending.truncate(DRY_RUN_LIMIT);
    }

    print_banner("Connection removal", dry_run);
    println!(
        "{} Processing {} of {} pending profiles (batches of {})",
        style("→").cyan(),
        pending.len(),
        available,
        settings.pacing.batch_size
    );

    let Some(session) = open_session(settings).await else {
        return Ok(());
    };

    let (event_tx, mut event_rx) = mpsc::channel::<SchedulerEvent>(100);
    let event_handler = tokio::spawn(async move {
        let mut pb: Option<ProgressBar> = None;
        while let Some(event) = event_rx.recv().await {
            match event {
                SchedulerEvent::Started { total, .. } => {
                    pb = Some(progress_bar(total as u64));
                }
                SchedulerEvent::BatchStarted {
                    index,
                    batches,
                    size,
                } => {
                    if let Some(ref progress) = pb {
                        progress.println(format!(
                            "{} Batch {}/{} ({} profiles)",
                            style("→").cyan(),
                            index + 1,
                            batches,
                            size
                        ));
                    }
                }
                SchedulerEvent::EntityStarted { id, .. } => {
                    if let Some(ref progress) = pb {
                        progress.set_message(truncate(&id, 60));
                    }
                }
                SchedulerEvent::EntityFinished {
                    id,
                    outcome,
                    message,
                    ..
                } => {
                    if let Some(ref progress) = pb {
                        progress.println(format!(
                            "{} {} {}",
                            outcome_mark(outcome),
                            truncate(&id, 60),
                            style(message).dim()
                        ));
                        progress.inc(1);
                    }
                }
                SchedulerEvent::Camouflage { action } => {
                    if let Some(ref progress) = pb {
                        progress.set_message(format!("browsing ({})", action));
                    }
                }
                SchedulerEvent::Cooldown { delay } => {
                    if let Some(ref progress) = pb {
                        progress.set_message(format!(
                            "batch cooldown {:.0}s",
                            delay.as_secs_f64()
                        ));
                    }
                }
                SchedulerEvent::Stopped { reason } => {
                    if let Some(ref progress) = pb {
                        progress.println(format!("{} Stopping: {}", style("!").red(), reason));
                    }
                }
            }
        }
        if let Some(progress) = pb {
            progress.finish_and_clear();
        }
    });

    let scheduler = build_scheduler(settings);
    let result = scheduler
        .run(session.page(), repo, &pending, dry_run, event_tx)
        .await;
    let _ = event_handler.await;
    session.close().await;

    print_summary(&result?, dry_run);
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    println!("{}", style("Summary").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Succeeded:", summary.succeeded);
    println!("{:<20} {}", "Failed:", summary.failed);
    println!("{:<20} {}", "Skipped:", summary.skipped);
    println!("{:<20} {}", "Batches:", summary.batches);

    match &summary.stopped {
        Some(reason) => println!(
            "\n{} Run stopped early: {}",
            style("!").red().bold(),
            reason
        ),
        None => println!("\n{} Run complete", style("✓").green()),
    }
    if dry_run {
        println!(
            "  {} Dry run: removal outcomes were not saved",
            style("→").dim()
        );
    }
}
