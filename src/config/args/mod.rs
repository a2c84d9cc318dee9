use crate::config::{CLITimeoutConfig, ClientConfig, Config, RetryConfig, TracingConfig};
use crate::types::error::S3migError;
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials, StoragePath};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;
use std::path::PathBuf;

pub mod value_parser;


use value_parser::dir_exist::is_dir_exist;
use value_parser::url::check_scheme;

// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_WORKER_SIZE: u16 = 100;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_RETRY_FAILED: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;
const DEFAULT_SHOW_NO_PROGRESS: bool = false;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_INVALID_PATH: &str =
    "Path must be an S3 path starting with 's3://' (e.g., s3://bucket/prefix).";
const ERROR_MESSAGE_WORKER_SIZE_ZERO: &str = "Worker size must be at least 1.";
const ERROR_MESSAGE_RATE_LIMIT_ZERO: &str = "Rate limit must be at least 1 object per second.";

// ---------------------------------------------------------------------------
// Value parser helpers
// ---------------------------------------------------------------------------

fn check_s3_path(s: &str) -> Result<String, String> {
    if s.starts_with("s3://") && s.len() > 5 {
        Ok(s.to_string())
    } else {
        Err(ERROR_MESSAGE_INVALID_PATH.to_string())
    }
}

fn parse_s3_path(uri: &str) -> Result<StoragePath, String> {
    let without_scheme = uri
        .strip_prefix("s3://")
        .ok_or_else(|| S3migError::InvalidUri(uri.to_string()).to_string())?;

    let (bucket, prefix) = match without_scheme.find('/') {
        Some(idx) => (&without_scheme[..idx], &without_scheme[idx + 1..]),
        None => (without_scheme, ""),
    };

    if bucket.is_empty() {
        return Err(S3migError::InvalidUri(uri.to_string()).to_string());
    }

    Ok(StoragePath::S3 {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
    })
}

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3mig - Migrate objects between S3-compatible object stores.
///
/// Reads object keys from a listing file in the working directory, copies
/// each object from the source to the target, and records every key that
/// failed in `migration_fails.txt` for a later retry pass.
///
/// Example:
///   s3mig -d /tmp/work s3://hcp-namespace/ s3://minio-bucket/ --dry-run
///   s3mig -d /tmp/work s3://hcp-namespace/ s3://minio-bucket/archive/ --worker-size 200
///   s3mig -d /tmp/work s3://hcp-namespace/ s3://minio-bucket/ --retry-failed
#[derive(Parser, Clone, Debug)]
#[command(name = "s3mig", version, about, long_about = None)]
pub struct CLIArgs {
    #[arg(
        env,
        help = "s3://<BUCKET_NAME>[/prefix]",
        value_parser = check_s3_path,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "s3://ignored"),
        required = false,
    )]
    pub source: String,

    #[arg(
        env,
        help = "s3://<BUCKET_NAME>[/prefix]",
        value_parser = check_s3_path,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "s3://ignored"),
        required = false,
    )]
    pub target: String,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Working directory holding the listing file and the failure ledger.
    #[arg(
        short = 'd',
        long,
        env,
        value_parser = is_dir_exist,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "."),
        required = false,
        help_heading = "General"
    )]
    pub data_dir: String,

    /// Read object keys from this file instead of <DATA_DIR>/object_listing.txt.
    #[arg(long, env, help_heading = "General")]
    pub input_file: Option<PathBuf>,

    /// Re-submit the keys recorded in the previous run's failure ledger.
    #[arg(
        long,
        env,
        default_value_t = DEFAULT_RETRY_FAILED,
        conflicts_with = "input_file",
        help_heading = "General"
    )]
    pub retry_failed: bool,

    /// Resolve every object and report the mapping without writing to the target.
    #[arg(long, env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    pub dry_run: bool,

    /// Don't show the progress bar.
    #[arg(long, env, default_value_t = DEFAULT_SHOW_NO_PROGRESS, help_heading = "General")]
    pub show_no_progress: bool,

    // -----------------------------------------------------------------------
    // Performance options
    // -----------------------------------------------------------------------
    /// Number of concurrent migration workers. Raised to the number of CPUs if lower.
    #[arg(long, env, default_value_t = DEFAULT_WORKER_SIZE, help_heading = "Performance")]
    pub worker_size: u16,

    /// Maximum source objects per second.
    #[arg(long, env, help_heading = "Performance")]
    pub rate_limit_objects: Option<u32>,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for SDK retries.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// AWS config file path.
    #[arg(long, env, help_heading = "AWS")]
    pub aws_config_file: Option<PathBuf>,

    /// AWS shared credentials file path.
    #[arg(long, env, help_heading = "AWS")]
    pub aws_shared_credentials_file: Option<PathBuf>,

    /// Disable stalled stream protection.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "AWS")]
    pub disable_stalled_stream_protection: bool,

    /// Profile for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), conflicts_with = "source_access_key", help_heading = "Source")]
    pub source_profile: Option<String>,

    /// Access key ID for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "source_secret_key", help_heading = "Source")]
    pub source_access_key: Option<String>,

    /// Secret access key for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "source_access_key", help_heading = "Source")]
    pub source_secret_key: Option<String>,

    /// Session token for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "source_access_key", help_heading = "Source")]
    pub source_session_token: Option<String>,

    /// Region for the source.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_region: Option<String>,

    /// Endpoint URL of the source namespace (e.g. an HCP tenant).
    #[arg(long, env, value_parser = check_scheme, help_heading = "Source")]
    pub source_endpoint_url: Option<String>,

    /// Force path-style access for the source.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Source")]
    pub source_force_path_style: bool,

    /// Profile for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), conflicts_with = "target_access_key", help_heading = "Target")]
    pub target_profile: Option<String>,

    /// Access key ID for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "target_secret_key", help_heading = "Target")]
    pub target_access_key: Option<String>,

    /// Secret access key for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "target_access_key", help_heading = "Target")]
    pub target_secret_key: Option<String>,

    /// Session token for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "target_access_key", help_heading = "Target")]
    pub target_session_token: Option<String>,

    /// Region for the target.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_region: Option<String>,

    /// Endpoint URL of the target (e.g. MinIO).
    #[arg(long, env, value_parser = check_scheme, help_heading = "Target")]
    pub target_endpoint_url: Option<String>,

    /// Force path-style access for the target.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Target")]
    pub target_force_path_style: bool,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// ```
/// use s3mig_rs::config::args::parse_from_args;
///
/// let args = vec!["s3mig", "-d", ".", "s3://source/", "s3://target/", "--dry-run"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(cli_args.dry_run);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

/// Per-side connection flags, borrowed from `CLIArgs`.
struct ClientArgs<'a> {
    profile: &'a Option<String>,
    access_key: &'a Option<String>,
    secret_key: &'a Option<String>,
    session_token: &'a Option<String>,
    region: &'a Option<String>,
    endpoint_url: &'a Option<String>,
    force_path_style: bool,
}

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.worker_size == 0 {
            return Err(ERROR_MESSAGE_WORKER_SIZE_ZERO.to_string());
        }
        if self.rate_limit_objects == Some(0) {
            return Err(ERROR_MESSAGE_RATE_LIMIT_ZERO.to_string());
        }
        Ok(())
    }

    fn source_client_args(&self) -> ClientArgs<'_> {
        ClientArgs {
            profile: &self.source_profile,
            access_key: &self.source_access_key,
            secret_key: &self.source_secret_key,
            session_token: &self.source_session_token,
            region: &self.source_region,
            endpoint_url: &self.source_endpoint_url,
            force_path_style: self.source_force_path_style,
        }
    }

    fn target_client_args(&self) -> ClientArgs<'_> {
        ClientArgs {
            profile: &self.target_profile,
            access_key: &self.target_access_key,
            secret_key: &self.target_secret_key,
            session_token: &self.target_session_token,
            region: &self.target_region,
            endpoint_url: &self.target_endpoint_url,
            force_path_style: self.target_force_path_style,
        }
    }

    fn build_client_config(&self, side: ClientArgs<'_>) -> ClientConfig {
        let credential = if let Some(profile) = side.profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(access_key) = side.access_key {
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: side.secret_key.clone().unwrap_or_default(),
                    session_token: side.session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential,
            region: side.region.clone(),
            endpoint_url: side.endpoint_url.clone(),
            force_path_style: side.force_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        }
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        let source = parse_s3_path(&args.source)?;
        let target = parse_s3_path(&args.target)?;
        let source_client_config = Some(args.build_client_config(args.source_client_args()));
        let target_client_config = Some(args.build_client_config(args.target_client_args()));
        let tracing_config = args.build_tracing_config();

        Ok(Config {
            source,
            target,
            source_client_config,
            target_client_config,
            working_dir: PathBuf::from(&args.data_dir),
            input_file: args.input_file,
            retry_failed: args.retry_failed,
            worker_size: args.worker_size,
            dry_run: args.dry_run,
            rate_limit_objects: args.rate_limit_objects,
            show_no_progress: args.show_no_progress,
            tracing_config,
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}
