//! Failure ledger.
//!
//! A single background task owns `migration_fails.txt` and appends one
//! identifier per line for every failed transfer, in the order the failures
//! arrive. The file is valid input for a retry run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info};

use crate::types::error::S3migError;
use crate::types::token::PipelineCancellationToken;

/// Create (or truncate) the ledger file.
///
/// Owner read/write only on unix.
pub async fn create_ledger_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    options.mode(0o600);

    options
        .open(path)
        .await
        .map_err(|e| S3migError::Ledger(format!("failed to create {}: {e}", path.display())))
        .context("tokio::fs::OpenOptions::open() failed.")
}

pub struct FailureLedgerWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    receiver: Receiver<String>,
    cancellation_token: PipelineCancellationToken,
    records: u64,
}

impl FailureLedgerWriter {
    pub fn new(
        path: PathBuf,
        file: File,
        receiver: Receiver<String>,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            path,
            writer: BufWriter::new(file),
            receiver,
            cancellation_token,
            records: 0,
        }
    }

    /// Drain the failure queue until it is closed and empty.
    ///
    /// Returns the number of records written. A write error cancels the run
    /// and is returned as `S3migError::Ledger`.
    pub async fn write(mut self) -> Result<u64> {
        debug!(path = %self.path.display(), "failure ledger writer started.");

        match self.receive_and_write().await {
            Ok(()) => {
                debug!(
                    path = %self.path.display(),
                    records = self.records,
                    "failure ledger writer has been completed."
                );
                Ok(self.records)
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = format!("{e:#}"),
                    "failed to write the failure ledger. the migration is cancelled."
                );
                self.cancellation_token.cancel();
                self.receiver.close();
                Err(e)
            }
        }
    }

    async fn receive_and_write(&mut self) -> Result<()> {
        let mut cancel_logged = false;

        loop {
            if !cancel_logged && self.cancellation_token.is_cancelled() {
                // Records from transfers that were already in flight still
                // arrive until the queue is closed.
                info!("failure ledger writer observed cancellation. draining remaining records.");
                cancel_logged = true;
            }

            match self.receiver.recv().await {
                Ok(identifier) => {
                    self.write_record(&identifier).await?;
                    if self.receiver.is_empty() {
                        self.flush().await?;
                    }
                }
                Err(_) => break,
            }
        }

        self.flush().await
    }

    async fn write_record(&mut self, identifier: &str) -> Result<()> {
        self.writer
            .write_all(identifier.as_bytes())
            .await
            .map_err(|e| self.ledger_error(e))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| self.ledger_error(e))?;
        self.records += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await.map_err(|e| self.ledger_error(e))?;
        Ok(())
    }

    fn ledger_error(&self, e: std::io::Error) -> anyhow::Error {
        anyhow::Error::new(S3migError::Ledger(format!(
            "failed to write {}: {e}",
            self.path.display()
        )))
    }
}
