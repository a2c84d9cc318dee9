use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};

use crate::config::Config;
use crate::storage::{Destination, Source};
use crate::types::MigrationStatistics;
use crate::types::token::PipelineCancellationToken;

/// Result of sending an identifier downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
}

/// Shared context handed to each migration worker.
///
/// Every worker reads identifiers from the shared `receiver` (MPMC) and
/// reports failed identifiers on `failure_sender`, which feeds the single
/// ledger writer.
pub struct Stage {
    pub config: Config,
    pub source: Source,
    pub destination: Destination,
    pub receiver: Receiver<String>,
    pub failure_sender: Sender<String>,
    pub cancellation_token: PipelineCancellationToken,
    pub stats_sender: Sender<MigrationStatistics>,
}

impl Stage {
    pub fn new(
        config: Config,
        source: Source,
        destination: Destination,
        receiver: Receiver<String>,
        failure_sender: Sender<String>,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<MigrationStatistics>,
    ) -> Self {
        Self {
            config,
            source,
            destination,
            receiver,
            failure_sender,
            cancellation_token,
            stats_sender,
        }
    }

    /// Hand a failed identifier to the ledger writer.
    ///
    /// Blocks while the failure queue is full. Returns `SendResult::Closed`
    /// if the ledger writer has gone away.
    pub async fn send_failure(&self, identifier: String) -> Result<SendResult> {
        let result = self
            .failure_sender
            .send(identifier)
            .await
            .context("async_channel::Sender::send() failed.");

        if let Err(e) = result {
            return if !self.failure_sender.is_closed() {
                Err(anyhow!(e))
            } else {
                Ok(SendResult::Closed)
            };
        }

        Ok(SendResult::Success)
    }

    /// Send a statistics event. Dropped silently once the reporter is gone.
    pub async fn send_stats(&self, stats: MigrationStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }
}
