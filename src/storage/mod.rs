use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use dyn_clone::DynClone;
use leaky_bucket::RateLimiter;
use std::sync::Arc;

use crate::config::Config;
use crate::types::error::S3migError;
use crate::types::{ObjectMetadata, SourceObject};

pub mod s3;

/// Type alias for a boxed source trait object.
pub type Source = Box<dyn ObjectSource + Send + Sync>;

/// Type alias for a boxed destination trait object.
pub type Destination = Box<dyn ObjectDestination + Send + Sync>;

/// Read side of a migration.
///
/// `resolve` is called concurrently by every worker with independent
/// identifiers, so implementations must not serialize requests internally.
#[async_trait]
pub trait ObjectSource: DynClone {
    /// Fetch the object named by `identifier`.
    ///
    /// The returned metadata carries the key relative to the source prefix.
    /// Any error is a per-object failure; the caller does not retry.
    async fn resolve(&self, identifier: &str) -> Result<SourceObject>;
}

dyn_clone::clone_trait_object!(ObjectSource);

/// Write side of a migration.
#[async_trait]
pub trait ObjectDestination: DynClone {
    /// Map a key relative to the source prefix to the full destination key.
    fn destination_key(&self, relative_key: &str) -> String;

    /// Store `body` under `key` (a full destination key).
    ///
    /// The write must be all-or-nothing: a failed store leaves no partial
    /// object visible at `key`.
    async fn store(
        &self,
        key: &str,
        body: ByteStream,
        metadata: &ObjectMetadata,
        hints: &PreserveHints,
    ) -> Result<()>;
}

dyn_clone::clone_trait_object!(ObjectDestination);

/// Provenance of the source object, forwarded to destinations that can keep
/// the original checksum and modification time on copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreserveHints {
    pub source_etag: Option<String>,
    pub source_mtime: Option<DateTime>,
}

impl PreserveHints {
    pub fn from_metadata(metadata: &ObjectMetadata) -> Self {
        PreserveHints {
            source_etag: metadata.e_tag.clone(),
            source_mtime: metadata.last_modified,
        }
    }
}

// Default refill interval 100ms
const REFILL_PER_INTERVAL_DIVIDER: usize = 10;

fn build_rate_limiter(rate_limit_value: u32) -> Arc<RateLimiter> {
    let refill = if (rate_limit_value as usize) <= REFILL_PER_INTERVAL_DIVIDER {
        1
    } else {
        rate_limit_value as usize / REFILL_PER_INTERVAL_DIVIDER
    };
    Arc::new(
        RateLimiter::builder()
            .max(rate_limit_value as usize)
            .initial(rate_limit_value as usize)
            .refill(refill)
            .fair(true)
            .build(),
    )
}

/// Create the S3 source described by `config.source`.
///
/// `config.rate_limit_objects` caps the number of objects resolved per
/// second across all workers.
pub async fn create_source(config: &Config) -> Result<Source> {
    let client_config = config.source_client_config.as_ref().ok_or_else(|| {
        S3migError::InvalidConfig("source client configuration is missing".to_string())
    })?;
    let client = Arc::new(client_config.create_client().await);
    let rate_limit_objects_per_sec = config.rate_limit_objects.map(build_rate_limiter);

    Ok(Box::new(s3::S3Source::new(
        client,
        config.source.clone(),
        rate_limit_objects_per_sec,
    )))
}

/// Create the S3 destination described by `config.target`.
pub async fn create_destination(config: &Config) -> Result<Destination> {
    let client_config = config.target_client_config.as_ref().ok_or_else(|| {
        S3migError::InvalidConfig("target client configuration is missing".to_string())
    })?;
    let client = Arc::new(client_config.create_client().await);

    Ok(Box::new(s3::S3Destination::new(
        client,
        config.target.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_dummy_tracing_subscriber, make_test_client_config};
    use crate::types::error::S3migError;

    fn make_test_config(source_prefix: &str, target_prefix: &str) -> Config {
        let mut config =
            Config::for_migration("hcp-bucket", source_prefix, "minio-bucket", target_prefix, ".");
        config.source_client_config = Some(make_test_client_config());
        config.target_client_config = Some(make_test_client_config());
        config
    }

    #[tokio::test]
    async fn create_source_and_destination_with_credentials() {
        init_dummy_tracing_subscriber();

        let config = make_test_config("tenant/", "archive/");
        let _source = create_source(&config).await.unwrap();
        let destination = create_destination(&config).await.unwrap();

        assert_eq!(destination.destination_key("a.txt"), "archive/a.txt");
    }

    #[tokio::test]
    async fn create_source_with_rate_limiting() {
        init_dummy_tracing_subscriber();

        let mut config = make_test_config("", "");
        config.rate_limit_objects = Some(100);
        assert!(create_source(&config).await.is_ok());

        // <= REFILL_PER_INTERVAL_DIVIDER
        config.rate_limit_objects = Some(5);
        assert!(create_source(&config).await.is_ok());
    }

    #[tokio::test]
    async fn create_without_client_config_is_config_error() {
        init_dummy_tracing_subscriber();

        let mut config = make_test_config("", "");
        config.source_client_config = None;
        config.target_client_config = None;

        let e = create_source(&config).await.err().unwrap();
        assert!(matches!(
            e.downcast_ref::<S3migError>(),
            Some(S3migError::InvalidConfig(_))
        ));
        let e = create_destination(&config).await.err().unwrap();
        assert_eq!(crate::types::error::exit_code_from_error(&e), 2);
    }

    #[test]
    fn preserve_hints_from_metadata() {
        let metadata = ObjectMetadata {
            key: "a".to_string(),
            e_tag: Some("\"abc\"".to_string()),
            last_modified: Some(DateTime::from_secs(1_700_000_000)),
            ..Default::default()
        };
        let hints = PreserveHints::from_metadata(&metadata);
        assert_eq!(hints.source_etag.as_deref(), Some("\"abc\""));
        assert_eq!(hints.source_mtime, Some(DateTime::from_secs(1_700_000_000)));

        assert_eq!(
            PreserveHints::from_metadata(&ObjectMetadata::default()),
            PreserveHints::default()
        );
    }

    #[tokio::test]
    async fn rate_limiter_allows_initial_burst() {
        let limiter = build_rate_limiter(20);
        let start = std::time::Instant::now();
        limiter.acquire(20).await;
        assert!(start.elapsed() < std::time::Duration::from_millis(500));
    }
}
