//! Migration workers.
//!
//! An `ObjectMigrator` drains identifiers from the shared task queue and runs
//! one `Transferer` per identifier. The transferer is picked once, when the
//! worker is built: `CopyTransferer` for a real run, `DryRunTransferer` when
//! `Config::dry_run` is set.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::stage::{SendResult, Stage};
use crate::types::{MigrationStatistics, MigrationStatsReport};

pub mod copy;
pub mod dry_run;

pub use copy::CopyTransferer;
pub use dry_run::DryRunTransferer;


// ---------------------------------------------------------------------------
// Transferer trait
// ---------------------------------------------------------------------------

/// Outcome of one successful transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub source_key: String,
    pub destination_key: String,
    pub size: u64,
}

/// Moves a single object from the source to the destination.
///
/// Errors are per-object failures. Implementations do not retry.
#[async_trait]
pub trait Transferer: Send + Sync {
    async fn transfer(&self, identifier: &str) -> Result<TransferOutcome>;
}

// ---------------------------------------------------------------------------
// ObjectMigrator worker
// ---------------------------------------------------------------------------

/// Pool worker: dequeue, transfer, account. One identifier at a time.
pub struct ObjectMigrator {
    worker_index: usize,
    base: Stage,
    stats_report: Arc<MigrationStatsReport>,
    transferer: Box<dyn Transferer>,
}

impl ObjectMigrator {
    pub fn new(base: Stage, worker_index: usize, stats_report: Arc<MigrationStatsReport>) -> Self {
        let source = dyn_clone::clone_box(&*base.source);
        let destination = dyn_clone::clone_box(&*base.destination);

        let transferer: Box<dyn Transferer> = if base.config.dry_run {
            Box::new(DryRunTransferer::new(source, destination))
        } else {
            Box::new(CopyTransferer::new(source, destination))
        };

        Self {
            worker_index,
            base,
            stats_report,
            transferer,
        }
    }

    /// Main entry point: run until the task queue is closed and empty, or the
    /// run is cancelled.
    pub async fn migrate(&mut self) -> Result<()> {
        debug!(worker_index = self.worker_index, "migration worker started.");
        self.receive_and_migrate().await
    }

    async fn receive_and_migrate(&mut self) -> Result<()> {
        loop {
            // Cancellation wins over a ready identifier; an identifier already
            // taken is always carried through to its outcome.
            let identifier = tokio::select! {
                biased;
                _ = self.base.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "migration worker has been cancelled.");
                    return Ok(());
                }
                recv_result = self.base.receiver.recv() => {
                    match recv_result {
                        Ok(identifier) => identifier,
                        Err(_) => {
                            debug!(worker_index = self.worker_index, "migration worker has been completed.");
                            return Ok(());
                        }
                    }
                }
            };

            self.process_identifier(identifier).await?;
        }
    }

    async fn process_identifier(&self, identifier: String) -> Result<()> {
        match self.transferer.transfer(&identifier).await {
            Ok(outcome) => {
                self.stats_report.increment_migrated(outcome.size);
                self.base
                    .send_stats(MigrationStatistics::MigrateBytes(outcome.size))
                    .await;
                self.base
                    .send_stats(MigrationStatistics::MigrateComplete {
                        key: identifier.clone(),
                    })
                    .await;

                let prefix = if self.base.config.dry_run {
                    "[dry-run] "
                } else {
                    ""
                };
                info!(
                    worker_index = self.worker_index,
                    key = outcome.source_key,
                    destination_key = outcome.destination_key,
                    size = outcome.size,
                    "{prefix}migrated {} -> {}.",
                    outcome.source_key,
                    outcome.destination_key,
                );
            }
            Err(e) => {
                self.stats_report.increment_failed();
                self.base
                    .send_stats(MigrationStatistics::MigrateError {
                        key: identifier.clone(),
                    })
                    .await;

                warn!(
                    worker_index = self.worker_index,
                    key = identifier,
                    error = format!("{e:#}"),
                    "failed to migrate {}.",
                    identifier,
                );

                if self.base.send_failure(identifier.clone()).await? == SendResult::Closed {
                    error!(
                        worker_index = self.worker_index,
                        key = identifier,
                        "failure ledger is closed. the failed identifier was not recorded."
                    );
                }
            }
        }

        Ok(())
    }
}
