//! Migration pipeline controller.
//!
//! Owns the bounded task queue feeding the worker pool, the failure queue
//! feeding the ledger writer, and the shared counters. Shutdown is two-phase:
//! close the task queue and join every worker, then close the failure queue
//! and join the ledger writer.
//!
//! ```text
//! producer → submit → [task queue] → ObjectMigrator × N → counters
//!                                          │
//!                                          └→ [failure queue] → FailureLedgerWriter → migration_fails.txt
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::ledger::{FailureLedgerWriter, create_ledger_file};
use crate::listing::ListingReader;
use crate::migrator::ObjectMigrator;
use crate::stage::Stage;
use crate::storage::{self, Destination, Source};
use crate::types::error::{S3migError, is_cancelled_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{MigrationStatistics, MigrationStats, MigrationStatsReport};

/// Cloneable handle for feeding identifiers into a started pipeline from
/// another task.
#[derive(Clone)]
pub struct MigrationSubmitter {
    sender: Sender<String>,
    cancellation_token: PipelineCancellationToken,
}

impl MigrationSubmitter {
    /// Enqueue one identifier, waiting while the task queue is full.
    ///
    /// Fails with `S3migError::Cancelled` once the run is cancelled and with
    /// `S3migError::Pipeline` once the pipeline is shutting down.
    pub async fn submit(&self, identifier: String) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => Err(anyhow!(S3migError::Cancelled)),
            result = self.sender.send(identifier) => result.map_err(|_| {
                anyhow!(S3migError::Pipeline(
                    "task queue is closed. the pipeline is shutting down.".to_string()
                ))
            }),
        }
    }
}

/// The migration controller. One instance per run.
///
/// ## Usage
///
/// ```no_run
/// # async fn example() -> anyhow::Result<()> {
/// # use s3mig_rs::{Config, MigrationPipeline, create_pipeline_cancellation_token};
/// # let config: Config = todo!();
/// let cancellation_token = create_pipeline_cancellation_token();
/// let mut pipeline = MigrationPipeline::new(config, cancellation_token).await?;
/// pipeline.close_stats_sender();
/// let stats = pipeline.run(["a.txt", "b.txt"]).await?;
/// println!("{} migrated, {} failed", stats.stats_migrated_objects, stats.stats_failed_objects);
/// # Ok(())
/// # }
/// ```
pub struct MigrationPipeline {
    config: Config,
    source: Source,
    destination: Destination,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<MigrationStatistics>,
    stats_receiver: Receiver<MigrationStatistics>,
    stats_report: Arc<MigrationStatsReport>,
    has_error: Arc<AtomicBool>,
    has_panic: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<anyhow::Error>>>,
    task_sender: Option<Sender<String>>,
    failure_sender: Option<Sender<String>>,
    worker_handles: Vec<JoinHandle<()>>,
    ledger_handle: Option<JoinHandle<Result<u64>>>,
    started: bool,
}

impl MigrationPipeline {
    /// Create a pipeline backed by the S3 source and destination described
    /// in `config`.
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Result<Self> {
        let source = storage::create_source(&config).await?;
        let destination = storage::create_destination(&config).await?;

        Ok(Self::with_storage(
            config,
            source,
            destination,
            cancellation_token,
        ))
    }

    /// Create a pipeline with caller-provided source and destination.
    pub fn with_storage(
        config: Config,
        source: Source,
        destination: Destination,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        // Unbounded: progress reporting must never apply backpressure.
        let (stats_sender, stats_receiver) = async_channel::unbounded();

        Self {
            config,
            source,
            destination,
            cancellation_token,
            stats_sender,
            stats_receiver,
            stats_report: Arc::new(MigrationStatsReport::new()),
            has_error: Arc::new(AtomicBool::new(false)),
            has_panic: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            task_sender: None,
            failure_sender: None,
            worker_handles: Vec::new(),
            ledger_handle: None,
            started: false,
        }
    }

    /// Create the ledger, spawn its writer, then spawn `worker_count` workers.
    ///
    /// Both queues are sized to `worker_count`.
    pub async fn start(&mut self, worker_count: usize) -> Result<()> {
        if self.started {
            return Err(anyhow!(S3migError::Pipeline(
                "pipeline has already been started".to_string()
            )));
        }
        if worker_count == 0 {
            return Err(anyhow!(S3migError::InvalidConfig(
                "worker count must be at least 1".to_string()
            )));
        }

        let ledger_path = self.config.ledger_path();
        let ledger_file = create_ledger_file(&ledger_path).await?;
        self.started = true;

        let (task_sender, task_receiver) = async_channel::bounded::<String>(worker_count);
        let (failure_sender, failure_receiver) = async_channel::bounded::<String>(worker_count);

        // The writer holds the only receiver, so the failure queue closes
        // if the writer stops.
        let writer = FailureLedgerWriter::new(
            ledger_path,
            ledger_file,
            failure_receiver,
            self.cancellation_token.clone(),
        );
        self.ledger_handle = Some(tokio::spawn(writer.write()));

        for worker_index in 0..worker_count {
            let stage = self.create_mpmc_stage(task_receiver.clone(), failure_sender.clone());
            let object_migrator =
                ObjectMigrator::new(stage, worker_index, self.stats_report.clone());
            let handle = self.spawn_worker(worker_index, object_migrator);
            self.worker_handles.push(handle);
        }

        debug!(
            worker_count,
            dry_run = self.config.dry_run,
            "migration pipeline has started."
        );

        self.task_sender = Some(task_sender);
        self.failure_sender = Some(failure_sender);
        Ok(())
    }

    /// Get a submitter for a started pipeline.
    pub fn submitter(&self) -> Result<MigrationSubmitter> {
        let sender = self.task_sender.clone().ok_or_else(|| {
            anyhow!(S3migError::Pipeline(
                "pipeline has not been started or has already finished".to_string()
            ))
        })?;

        Ok(MigrationSubmitter {
            sender,
            cancellation_token: self.cancellation_token.clone(),
        })
    }

    /// Enqueue one identifier, waiting while the task queue is full.
    pub async fn submit(&self, identifier: impl Into<String>) -> Result<()> {
        self.submitter()?.submit(identifier.into()).await
    }

    /// Two-phase shutdown. Returns the final counters.
    ///
    /// A failure ledger error is returned as `S3migError::Ledger`; per-object
    /// failures are only reflected in the counters.
    pub async fn finish(&mut self) -> Result<MigrationStats> {
        if let Some(task_sender) = self.task_sender.take() {
            task_sender.close();
        }

        for handle in std::mem::take(&mut self.worker_handles) {
            if let Err(e) = handle.await {
                self.has_panic.store(true, Ordering::SeqCst);
                self.record_error(anyhow!("migration worker supervisor panicked: {}", e));
            }
        }
        debug!("all migration workers have been joined.");

        if let Some(failure_sender) = self.failure_sender.take() {
            failure_sender.close();
        }

        let mut ledger_error = None;
        if let Some(handle) = self.ledger_handle.take() {
            match handle.await {
                Ok(Ok(records)) => debug!(records, "failure ledger writer has been joined."),
                Ok(Err(e)) => ledger_error = Some(e),
                Err(e) => {
                    self.has_panic.store(true, Ordering::SeqCst);
                    error!("failure ledger writer panicked: {}", e);
                    ledger_error = Some(anyhow!(S3migError::Ledger(format!(
                        "failure ledger writer panicked: {e}"
                    ))));
                }
            }
        }

        self.close_stats_sender();

        let stats = self.stats_report.snapshot();
        self.log_summary(&stats);

        if let Some(e) = ledger_error {
            return Err(e);
        }
        if let Some(e) = self.take_first_error() {
            return Err(e);
        }
        Ok(stats)
    }

    /// Start with the effective worker size, submit every identifier, finish.
    pub async fn run<I, S>(&mut self, identifiers: I) -> Result<MigrationStats>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start(self.config.effective_worker_size()).await?;
        let submitter = self.submitter()?;

        for identifier in identifiers {
            if let Err(e) = submitter.submit(identifier.into()).await {
                if !is_cancelled_error(&e) {
                    self.record_error(e);
                }
                break;
            }
        }
        drop(submitter);

        self.finish().await
    }

    /// Like `run`, reading identifiers from a listing file.
    pub async fn run_listing(&mut self, path: &Path) -> Result<MigrationStats> {
        let reader = ListingReader::open(path).await?;
        self.start(self.config.effective_worker_size()).await?;

        let fed = reader.feed(&self.submitter()?).await;
        let stats = self.finish().await;

        let submitted = fed?;
        debug!(submitted, path = %path.display(), "listing has been consumed.");
        stats
    }

    /// Check if any non-per-object error occurred.
    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    /// Check if any spawned task panicked.
    pub fn has_panic(&self) -> bool {
        self.has_panic.load(Ordering::SeqCst)
    }

    /// Consume and return all accumulated errors.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_errors_and_consume(&self) -> Option<Vec<anyhow::Error>> {
        if !self.has_error() {
            return None;
        }
        let mut error_list = self.errors.lock().unwrap();
        Some(error_list.drain(..).collect())
    }

    /// Get the stats receiver for progress reporting.
    pub fn get_stats_receiver(&self) -> Receiver<MigrationStatistics> {
        self.stats_receiver.clone()
    }

    /// Snapshot of the counters. Final once `finish` has returned.
    pub fn get_migration_stats(&self) -> MigrationStats {
        self.stats_report.snapshot()
    }

    /// Close the stats sender to signal the progress reporter to finish.
    ///
    /// Call this before `start()` if you don't need progress reporting.
    pub fn close_stats_sender(&self) {
        self.stats_sender.close();
    }

    pub fn cancellation_token(&self) -> PipelineCancellationToken {
        self.cancellation_token.clone()
    }

    // -----------------------------------------------------------------------
    // Internal methods
    // -----------------------------------------------------------------------

    fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        self.errors.lock().unwrap().push_back(error);
    }

    fn take_first_error(&self) -> Option<anyhow::Error> {
        if !self.has_error() {
            return None;
        }
        self.errors.lock().unwrap().pop_front()
    }

    fn log_summary(&self, stats: &MigrationStats) {
        let cancelled = self.cancellation_token.is_cancelled();
        if self.config.dry_run {
            info!(
                processed = stats.processed(),
                migrated = stats.stats_migrated_objects,
                failed = stats.stats_failed_objects,
                cancelled,
                "[dry-run] Resolved {} objects, {} failures.",
                stats.stats_migrated_objects,
                stats.stats_failed_objects,
            );
        } else {
            info!(
                processed = stats.processed(),
                migrated = stats.stats_migrated_objects,
                failed = stats.stats_failed_objects,
                migrated_bytes = stats.stats_migrated_bytes,
                cancelled,
                "Migrated {} objects, {} failures.",
                stats.stats_migrated_objects,
                stats.stats_failed_objects,
            );
        }
    }

    /// Create an MPMC stage: every worker shares the same task receiver and
    /// failure sender.
    fn create_mpmc_stage(
        &self,
        receiver: Receiver<String>,
        failure_sender: Sender<String>,
    ) -> Stage {
        Stage::new(
            self.config.clone(),
            dyn_clone::clone_box(&*self.source),
            dyn_clone::clone_box(&*self.destination),
            receiver,
            failure_sender,
            self.cancellation_token.clone(),
            self.stats_sender.clone(),
        )
    }

    /// Spawn a worker, catching panics with an outer supervisor task.
    fn spawn_worker(&self, worker_index: usize, mut object_migrator: ObjectMigrator) -> JoinHandle<()> {
        let has_error = self.has_error.clone();
        let has_panic = self.has_panic.clone();
        let error_list = self.errors.clone();
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            let join_result = tokio::spawn(async move { object_migrator.migrate().await }).await;

            match join_result {
                Ok(Ok(())) => {
                    debug!(worker_index, "migration worker completed successfully.");
                }
                Ok(Err(e)) => {
                    if is_cancelled_error(&e) {
                        info!(worker_index, "migration worker cancelled.");
                    } else {
                        cancellation_token.cancel();
                        has_error.store(true, Ordering::SeqCst);
                        error!(worker_index, "migration worker failed: {}", e);
                        error_list.lock().unwrap().push_back(e);
                    }
                }
                Err(e) => {
                    cancellation_token.cancel();
                    has_error.store(true, Ordering::SeqCst);
                    has_panic.store(true, Ordering::SeqCst);
                    error!(worker_index, "migration worker task panicked: {}", e);
                    error_list
                        .lock()
                        .unwrap()
                        .push_back(anyhow!(S3migError::Pipeline(format!(
                            "migration worker panicked: {e}"
                        ))));
                }
            }
        })
    }
}
