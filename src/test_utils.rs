//! Shared test utilities for the s3mig library crate.
//!
//! In-memory source and destination fakes plus canonical config builders,
//! used across the unit test modules.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::config::{CLITimeoutConfig, ClientConfig, Config, RetryConfig};
use crate::storage::{Destination, ObjectDestination, ObjectSource, PreserveHints, Source};
use crate::types::error::S3migError;
use crate::types::{
    AccessKeys, ClientConfigLocation, ObjectMetadata, S3Credentials, SourceObject,
};

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// Create a [`Config`] that migrates `hcp-bucket` to `minio-bucket` with
/// `working_dir` as the ledger location.
pub(crate) fn make_test_config(working_dir: &Path) -> Config {
    let mut config = Config::for_migration("hcp-bucket", "", "minio-bucket", "", working_dir);
    config.worker_size = 4;
    config
}

/// Client configuration with static credentials that never touches the
/// network when the client is built.
pub(crate) fn make_test_client_config() -> ClientConfig {
    ClientConfig {
        client_config_location: ClientConfigLocation::default(),
        credential: S3Credentials::Credentials {
            access_keys: AccessKeys {
                access_key: "test_key".to_string(),
                secret_access_key: "test_secret".to_string(),
                session_token: None,
            },
        },
        region: Some("us-east-1".to_string()),
        endpoint_url: Some("https://localhost:9000".to_string()),
        force_path_style: true,
        retry_config: RetryConfig {
            aws_max_attempts: 3,
            initial_backoff_milliseconds: 100,
        },
        cli_timeout_config: CLITimeoutConfig::default(),
        disable_stalled_stream_protection: false,
        request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
    }
}

// ---------------------------------------------------------------------------
// Fake source
// ---------------------------------------------------------------------------

/// In-memory source. Every identifier resolves to a body equal to the
/// identifier's bytes unless it was registered as failing.
#[derive(Clone, Default)]
pub(crate) struct FakeSource {
    pub prefix: String,
    pub failing_keys: Arc<HashSet<String>>,
    pub delay: Option<Duration>,
    pub resolve_calls: Arc<Mutex<Vec<String>>>,
    pub started: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_keys(mut self, keys: &[&str]) -> Self {
        self.failing_keys = Arc::new(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn resolved(&self) -> Vec<String> {
        self.resolve_calls.lock().unwrap().clone()
    }

    pub fn boxed(&self) -> Source {
        Box::new(self.clone())
    }
}

#[async_trait]
impl ObjectSource for FakeSource {
    async fn resolve(&self, identifier: &str) -> Result<SourceObject> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.resolve_calls
            .lock()
            .unwrap()
            .push(identifier.to_string());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_keys.contains(identifier) {
            return Err(anyhow!(S3migError::Resolve {
                key: identifier.to_string(),
                message: "NoSuchKey (The specified key does not exist.)".to_string(),
            }));
        }

        let body = identifier.as_bytes().to_vec();
        let metadata = ObjectMetadata {
            key: identifier
                .strip_prefix(&self.prefix)
                .unwrap_or(identifier)
                .to_string(),
            size: body.len() as u64,
            content_type: Some("text/plain".to_string()),
            user_metadata: [("origin".to_string(), "hcp".to_string())].into(),
            e_tag: Some(format!("\"etag-{identifier}\"")),
            last_modified: Some(DateTime::from_secs(1_700_000_000)),
        };

        Ok(SourceObject {
            body: ByteStream::from(body),
            metadata,
        })
    }
}

// ---------------------------------------------------------------------------
// Fake destination
// ---------------------------------------------------------------------------

/// An object accepted by [`FakeDestination`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredObject {
    pub key: String,
    pub body: Vec<u8>,
    pub metadata: ObjectMetadata,
    pub hints: PreserveHints,
}

/// In-memory destination recording every successful store.
#[derive(Clone, Default)]
pub(crate) struct FakeDestination {
    pub prefix: String,
    pub failing_keys: Arc<HashSet<String>>,
    pub stored: Arc<Mutex<Vec<StoredObject>>>,
    pub store_calls: Arc<AtomicUsize>,
}

impl FakeDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Fail stores whose full destination key is in `keys`.
    pub fn with_failing_keys(mut self, keys: &[&str]) -> Self {
        self.failing_keys = Arc::new(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn stored_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .stored
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn boxed(&self) -> Destination {
        Box::new(self.clone())
    }
}

#[async_trait]
impl ObjectDestination for FakeDestination {
    fn destination_key(&self, relative_key: &str) -> String {
        format!("{}{relative_key}", self.prefix)
    }

    async fn store(
        &self,
        key: &str,
        body: ByteStream,
        metadata: &ObjectMetadata,
        hints: &PreserveHints,
    ) -> Result<()> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_keys.contains(key) {
            return Err(anyhow!(S3migError::Store {
                key: key.to_string(),
                message: "AccessDenied (Access Denied.)".to_string(),
            }));
        }

        let body = body
            .collect()
            .await
            .context("ByteStream::collect() failed.")?
            .into_bytes()
            .to_vec();

        self.stored.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            body,
            metadata: metadata.clone(),
            hints: hints.clone(),
        });
        Ok(())
    }
}
