//! Batch scheduler for the removal workflow.
//!
//! Separated from UI concerns: progress is reported through
//! [`SchedulerEvent`]s on a channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{Camouflage, DelayRange};
use crate::automation::PageSurface;
use crate::config::Settings;
use crate::error::StoreError;
use crate::models::{ConnectionStatus, Outcome, RunSummary, StopReason};
use crate::relationship::ConnectionRemover;
use crate::repository::EntityRepository;
use crate::retry::{timeout_message, with_deadline, Deadline};

/// Events emitted during a removal run.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Started { total: usize, batches: usize },
    BatchStarted { index: usize, batches: usize, size: usize },
    EntityStarted { id: String, position: usize },
    EntityFinished {
        id: String,
        observed: ConnectionStatus,
        outcome: Outcome,
        message: String,
    },
    Camouflage { action: &'static str },
    Cooldown { delay: Duration },
    Stopped { reason: StopReason },
}

/// Pacing and deadline knobs for a run.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub batch_size: usize,
    pub removal_delay: DelayRange,
    pub batch_cooldown: DelayRange,
    pub entity_deadline: Duration,
}

impl SchedulerSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.pacing.batch_size,
            removal_delay: settings.pacing.removal_delay.to_delay(),
            batch_cooldown: settings.pacing.batch_cooldown.to_delay(),
            entity_deadline: settings.timeouts.entity_deadline(),
        }
    }
}

/// Result of processing one entity under its deadline.
#[derive(Debug, Clone)]
pub struct EntityReport {
    pub observed: ConnectionStatus,
    pub outcome: Outcome,
    pub message: String,
    /// Set when the run must not continue past this entity.
    pub stop: Option<StopReason>,
}

/// Partitions the work list into batches and paces the removal workflow.
pub struct BatchScheduler {
    remover: ConnectionRemover,
    camouflage: Camouflage,
    settings: SchedulerSettings,
}

impl BatchScheduler {
    pub fn new(
        remover: ConnectionRemover,
        camouflage: Camouflage,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            remover,
            camouflage,
            settings,
        }
    }

    /// Run the state machine once for `id` under the per-entity deadline and
    /// write the result to the store when `persist` is set.
    pub async fn process_entity(
        &self,
        page: &dyn PageSurface,
        repo: &EntityRepository,
        id: &str,
        dry_run: bool,
        persist: bool,
    ) -> Result<EntityReport, StoreError> {
        let deadline = self.settings.entity_deadline;
        let label = format!("processing {}", id);

        let outcome = with_deadline(
            self.remover.process(page, id, dry_run),
            deadline,
            &label,
            || {
                let message = timeout_message(deadline);
                let written = if persist {
                    repo.record(id, ConnectionStatus::Failed, &message)
                } else {
                    Ok(())
                };
                (message, written)
            },
        )
        .await;

        match outcome {
            Deadline::Expired((message, written)) => {
                written?;
                Ok(EntityReport {
                    observed: ConnectionStatus::Unknown,
                    outcome: Outcome::Failed,
                    message,
                    stop: Some(StopReason::DeadlineExceeded { id: id.to_string() }),
                })
            }
            Deadline::Completed(result) => {
                if persist {
                    if let Some(status) = result.status_to_persist(dry_run) {
                        repo.record(id, status, &result.message)?;
                    }
                }
                let stop = result
                    .rate_limited
                    .then(|| StopReason::RateLimited { id: id.to_string() });
                Ok(EntityReport {
                    observed: result.observed,
                    outcome: result.outcome(),
                    message: result.message,
                    stop,
                })
            }
        }
    }

    /// Process `ids` in batches, stopping early on a deadline expiry or a
    /// rate-limit response. Store failures abort the run.
    pub async fn run(
        &self,
        page: &dyn PageSurface,
        repo: &EntityRepository,
        ids: &[String],
        dry_run: bool,
        event_tx: mpsc::Sender<SchedulerEvent>,
    ) -> Result<RunSummary, StoreError> {
        let batches: Vec<&[String]> = ids.chunks(self.settings.batch_size.max(1)).collect();
        let mut summary = RunSummary::default();

        let _ = event_tx
            .send(SchedulerEvent::Started {
                total: ids.len(),
                batches: batches.len(),
            })
            .await;

        let mut position = 0;
        for (batch_index, batch) in batches.iter().enumerate() {
            summary.batches += 1;
            info!(
                "Processing batch {}/{} ({} entities)",
                batch_index + 1,
                batches.len(),
                batch.len()
            );
            let _ = event_tx
                .send(SchedulerEvent::BatchStarted {
                    index: batch_index,
                    batches: batches.len(),
                    size: batch.len(),
                })
                .await;

            for (offset, id) in batch.iter().enumerate() {
                position += 1;
                let _ = event_tx
                    .send(SchedulerEvent::EntityStarted {
                        id: id.clone(),
                        position,
                    })
                    .await;

                let report = self
                    .process_entity(page, repo, id, dry_run, true)
                    .await?;
                summary.record(report.outcome);
                let _ = event_tx
                    .send(SchedulerEvent::EntityFinished {
                        id: id.clone(),
                        observed: report.observed,
                        outcome: report.outcome,
                        message: report.message,
                    })
                    .await;

                if let Some(reason) = report.stop {
                    warn!("Stopping run: {}", reason);
                    summary.stopped = Some(reason.clone());
                    let _ = event_tx.send(SchedulerEvent::Stopped { reason }).await;
                    return Ok(summary);
                }

                let end_of_batch = offset + 1 == batch.len();
                if end_of_batch && batch_index + 1 == batches.len() {
                    break;
                }

                if let Some(action) = self.camouflage.maybe_run(page).await {
                    let _ = event_tx.send(SchedulerEvent::Camouflage { action }).await;
                }

                if end_of_batch {
                    let delay = self.settings.batch_cooldown.sample();
                    info!("Batch cooldown: {:.0}s", delay.as_secs_f64());
                    summary.cooldowns += 1;
                    let _ = event_tx.send(SchedulerEvent::Cooldown { delay }).await;
                    tokio::time::sleep(delay).await;
                } else {
                    self.settings.removal_delay.pause().await;
                }
            }
        }

        info!(
            "Run complete: {} succeeded, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );
        Ok(summary)
    }
}
