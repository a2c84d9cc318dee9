pub mod args;

use std::path::PathBuf;

use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::types::{ClientConfigLocation, S3Credentials, StoragePath};

/// Name of the listing file read from the working directory by default.
pub const OBJECT_LISTING_FILE: &str = "object_listing.txt";

/// Name of the failure ledger written to the working directory.
pub const FAILED_MIGRATION_FILE: &str = "migration_fails.txt";

/// Name the previous ledger is moved to when a retry pass starts.
pub const RETRY_INPUT_FILE: &str = "migration_fails.retry.txt";

/// Main configuration for a migration run.
///
/// Constructed once (by the CLI layer or by library code) and passed into
/// [`MigrationPipeline`](crate::MigrationPipeline). Nothing in the pipeline
/// reads process-wide state.
///
/// ```
/// use s3mig_rs::Config;
///
/// let mut config = Config::for_migration("hcp-bucket", "", "minio-bucket", "", "/tmp/work");
/// config.dry_run = true;
/// config.worker_size = 8;
/// assert!(config.effective_worker_size() >= 8);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub source: StoragePath,
    pub target: StoragePath,
    pub source_client_config: Option<ClientConfig>,
    pub target_client_config: Option<ClientConfig>,
    pub working_dir: PathBuf,
    pub input_file: Option<PathBuf>,
    pub retry_failed: bool,
    pub worker_size: u16,
    pub dry_run: bool,
    pub rate_limit_objects: Option<u32>,
    pub show_no_progress: bool,
    pub tracing_config: Option<TracingConfig>,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` with defaults for the given source and target.
    pub fn for_migration(
        source_bucket: &str,
        source_prefix: &str,
        target_bucket: &str,
        target_prefix: &str,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Config {
            source: StoragePath::S3 {
                bucket: source_bucket.to_string(),
                prefix: source_prefix.to_string(),
            },
            target: StoragePath::S3 {
                bucket: target_bucket.to_string(),
                prefix: target_prefix.to_string(),
            },
            working_dir: working_dir.into(),
            ..Config::default()
        }
    }

    /// Worker count used when the caller does not pick one.
    ///
    /// The configured value is raised to the host's available parallelism so
    /// the pool never runs with fewer workers than execution units.
    pub fn effective_worker_size(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (self.worker_size as usize).max(available).max(1)
    }

    /// Path of the failure ledger for this run.
    pub fn ledger_path(&self) -> PathBuf {
        self.working_dir.join(FAILED_MIGRATION_FILE)
    }

    /// Path of the identifier listing consumed by this run.
    pub fn listing_path(&self) -> PathBuf {
        match &self.input_file {
            Some(path) => path.clone(),
            None => self.working_dir.join(OBJECT_LISTING_FILE),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source: StoragePath::S3 {
                bucket: String::new(),
                prefix: String::new(),
            },
            target: StoragePath::S3 {
                bucket: String::new(),
                prefix: String::new(),
            },
            source_client_config: None,
            target_client_config: None,
            working_dir: PathBuf::from("."),
            input_file: None,
            retry_failed: false,
            worker_size: 100,
            dry_run: false,
            rate_limit_objects: None,
            show_no_progress: false,
            tracing_config: None,
            auto_complete_shell: None,
        }
    }
}

/// S3 client configuration for one side of the migration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

/// Retry configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

/// Timeout configuration for AWS SDK operations.
#[derive(Debug, Clone, Default)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
