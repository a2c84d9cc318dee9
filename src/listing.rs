//! Listing file ingestion.
//!
//! The listing is a newline-delimited file of source keys, written by a
//! separate listing step (or by a previous run's failure ledger).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tracing::{debug, info, warn};

use crate::config::{FAILED_MIGRATION_FILE, RETRY_INPUT_FILE};
use crate::pipeline::MigrationSubmitter;
use crate::types::error::{S3migError, is_cancelled_error};

/// Streams identifiers from a listing file into a running pipeline.
pub struct ListingReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
}

impl ListingReader {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await.with_context(|| {
            S3migError::InvalidConfig(format!("cannot open listing file {}", path.display()))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
        })
    }

    /// Submit every non-blank line. Returns the number of identifiers
    /// submitted.
    ///
    /// Stops early, without error, if the run is cancelled.
    pub async fn feed(mut self, submitter: &MigrationSubmitter) -> Result<u64> {
        let mut submitted = 0;

        while let Some(line) = self
            .lines
            .next_line()
            .await
            .with_context(|| format!("failed to read listing file {}", self.path.display()))?
        {
            let identifier = line.trim_end_matches('\r');
            if identifier.trim().is_empty() {
                continue;
            }

            if let Err(e) = submitter.submit(identifier.to_string()).await {
                if is_cancelled_error(&e) {
                    info!(
                        path = %self.path.display(),
                        submitted,
                        "listing ingestion stopped by cancellation."
                    );
                    return Ok(submitted);
                }
                return Err(e);
            }
            submitted += 1;
        }

        debug!(path = %self.path.display(), submitted, "listing ingestion has been completed.");
        Ok(submitted)
    }
}

/// Select the input of a retry run and return its path.
///
/// The previous run's ledger is moved to `migration_fails.retry.txt` so the
/// new run can truncate the ledger. A retry input left by an unfinished retry
/// run (cancelled, or stopped by a ledger error) is kept: the new ledger is
/// merged into it, since identifiers that run never reached are recorded
/// nowhere else.
///
/// The retry input is removed by [`complete_retry_input`] once a retry run
/// has consumed it completely.
pub async fn prepare_retry_input(working_dir: &Path) -> Result<PathBuf> {
    let ledger = working_dir.join(FAILED_MIGRATION_FILE);
    let retry_input = working_dir.join(RETRY_INPUT_FILE);

    let ledger_exists = tokio::fs::try_exists(&ledger).await.unwrap_or(false);
    let pending_exists = tokio::fs::try_exists(&retry_input).await.unwrap_or(false);

    match (pending_exists, ledger_exists) {
        (false, false) => {
            return Err(S3migError::InvalidConfig(format!(
                "no failure ledger to retry: {} not found",
                ledger.display()
            ))
            .into());
        }
        (false, true) => {
            tokio::fs::rename(&ledger, &retry_input)
                .await
                .with_context(|| {
                    format!(
                        "failed to move {} to {}",
                        ledger.display(),
                        retry_input.display()
                    )
                })?;
            info!(
                retry_input = %retry_input.display(),
                "previous failure ledger moved aside for the retry run."
            );
        }
        (true, false) => {
            warn!(
                retry_input = %retry_input.display(),
                "unfinished retry input found. retrying it as is."
            );
        }
        (true, true) => {
            let appended = merge_ledger_into(&ledger, &retry_input).await?;
            tokio::fs::remove_file(&ledger)
                .await
                .with_context(|| format!("failed to remove {}", ledger.display()))?;
            warn!(
                retry_input = %retry_input.display(),
                appended,
                "unfinished retry input found. the last failure ledger was merged into it."
            );
        }
    }

    Ok(retry_input)
}

/// Remove the retry input after a retry run that was neither cancelled nor
/// stopped by an error. Returns whether a file was removed.
pub async fn complete_retry_input(working_dir: &Path) -> Result<bool> {
    let retry_input = working_dir.join(RETRY_INPUT_FILE);
    if !tokio::fs::try_exists(&retry_input).await.unwrap_or(false) {
        return Ok(false);
    }

    tokio::fs::remove_file(&retry_input)
        .await
        .with_context(|| format!("failed to remove {}", retry_input.display()))?;
    debug!(retry_input = %retry_input.display(), "retry input has been consumed.");
    Ok(true)
}

// Append the ledger's identifiers that the retry input does not hold yet.
async fn merge_ledger_into(ledger: &Path, retry_input: &Path) -> Result<usize> {
    let pending = tokio::fs::read_to_string(retry_input)
        .await
        .with_context(|| format!("failed to read {}", retry_input.display()))?;
    let failed = tokio::fs::read_to_string(ledger)
        .await
        .with_context(|| format!("failed to read {}", ledger.display()))?;

    let mut known: HashSet<&str> = pending.lines().map(|l| l.trim_end_matches('\r')).collect();
    let mut appended = String::new();
    if !pending.is_empty() && !pending.ends_with('\n') {
        appended.push('\n');
    }

    let mut count = 0;
    for line in failed.lines() {
        let identifier = line.trim_end_matches('\r');
        if identifier.trim().is_empty() || !known.insert(identifier) {
            continue;
        }
        appended.push_str(identifier);
        appended.push('\n');
        count += 1;
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(retry_input)
        .await
        .with_context(|| format!("failed to open {}", retry_input.display()))?;
    file.write_all(appended.as_bytes()).await?;
    file.flush().await?;

    Ok(count)
}
