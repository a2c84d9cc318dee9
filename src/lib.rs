/*!
# Overview
s3mig-rs migrates objects between S3-compatible object stores, for example
from a Hitachi Content Platform namespace to MinIO.

It reads object keys from a listing file, copies every object with a bounded
pool of concurrent workers, and writes every key that failed to
`migration_fails.txt` so the failures can be retried in a later run.

## Features
- **Bounded concurrency**: a fixed worker pool fed through a bounded queue
- **Resumable**: failed keys are persisted to a ledger that is valid input for a retry run
- **Provenance**: the source ETag and modification time are forwarded to MinIO-compatible targets
- **Dry run**: resolve every object and report the mapping without writing
- **Library-First**: the s3mig CLI is a thin wrapper over this library

## As a Library

```toml
[dependencies]
s3mig-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3mig_rs::config::args::parse_from_args;
use s3mig_rs::{Config, MigrationPipeline, create_pipeline_cancellation_token};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = vec![
        "s3mig",
        "--data-dir",
        "/tmp/work",
        "s3://hcp-namespace/",
        "s3://minio-bucket/",
        "--dry-run",
    ];

    let config = Config::try_from(parse_from_args(args)?).map_err(anyhow::Error::msg)?;
    let listing = config.listing_path();
    let cancellation_token = create_pipeline_cancellation_token();

    let mut pipeline = MigrationPipeline::new(config, cancellation_token).await?;
    pipeline.close_stats_sender();
    let stats = pipeline.run_listing(&listing).await?;

    println!(
        "Migrated {} objects, {} failures",
        stats.stats_migrated_objects, stats.stats_failed_objects
    );
    Ok(())
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod config;
pub mod ledger;
pub mod listing;
pub mod migrator;
pub mod pipeline;
pub mod stage;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use config::args::{CLIArgs, build_config_from_args, parse_from_args};
pub use listing::{ListingReader, complete_retry_input, prepare_retry_input};
pub use pipeline::{MigrationPipeline, MigrationSubmitter};
pub use storage::{Destination, ObjectDestination, ObjectSource, PreserveHints, Source};
pub use types::error::{S3migError, exit_code_from_error, is_cancelled_error, is_ledger_error};
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{MigrationStatistics, MigrationStats, ObjectMetadata, SourceObject};
