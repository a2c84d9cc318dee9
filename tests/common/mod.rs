//! Shared integration test infrastructure for s3mig-rs.
//!
//! `InMemoryBucket` stands in for an S3-compatible bucket on both sides of a
//! migration. It implements the public `ObjectSource` and
//! `ObjectDestination` traits so the pipeline can be driven end to end
//! without a network.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use s3mig_rs::{
    Config, Destination, MigrationPipeline, MigrationStats, ObjectDestination, ObjectMetadata,
    ObjectSource, PreserveHints, S3migError, Source, SourceObject,
    create_pipeline_cancellation_token,
};

/// An object as held by an `InMemoryBucket`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub hints: PreserveHints,
}

/// Result of running a migration pipeline.
#[derive(Debug)]
pub struct PipelineResult {
    pub stats: Option<MigrationStats>,
    pub error: Option<anyhow::Error>,
    pub ledger: Option<String>,
}

#[derive(Default)]
struct BucketState {
    objects: BTreeMap<String, StoredObject>,
    unavailable: HashSet<String>,
    put_count: usize,
}

/// Cheaply cloneable handle to a shared in-memory bucket.
#[derive(Clone, Default)]
pub struct InMemoryBucket {
    prefix: String,
    state: Arc<Mutex<BucketState>>,
}

impl InMemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view of the same bucket rooted at `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            state: self.state.clone(),
        }
    }

    pub fn put(&self, key: &str, body: &[u8]) {
        self.state.lock().unwrap().objects.insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                content_type: Some("application/octet-stream".to_string()),
                hints: PreserveHints {
                    source_etag: Some(format!("\"{}\"", body.len())),
                    source_mtime: Some(DateTime::from_secs(1_600_000_000)),
                },
            },
        );
    }

    /// Make every read and write of `key` fail until `restore` is called.
    pub fn make_unavailable(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .unavailable
            .insert(key.to_string());
    }

    pub fn restore(&self, key: &str) {
        self.state.lock().unwrap().unavailable.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn put_count(&self) -> usize {
        self.state.lock().unwrap().put_count
    }

    pub fn source(&self) -> Source {
        Box::new(self.clone())
    }

    pub fn destination(&self) -> Destination {
        Box::new(self.clone())
    }
}

#[async_trait]
impl ObjectSource for InMemoryBucket {
    async fn resolve(&self, identifier: &str) -> Result<SourceObject> {
        let object = {
            let state = self.state.lock().unwrap();
            if state.unavailable.contains(identifier) {
                return Err(anyhow!(S3migError::Resolve {
                    key: identifier.to_string(),
                    message: "ServiceUnavailable".to_string(),
                }));
            }
            state.objects.get(identifier).cloned().ok_or_else(|| {
                anyhow!(S3migError::Resolve {
                    key: identifier.to_string(),
                    message: "NoSuchKey".to_string(),
                })
            })?
        };

        let key = identifier
            .strip_prefix(&self.prefix)
            .unwrap_or(identifier)
            .to_string();
        let size = object.body.len() as u64;
        Ok(SourceObject {
            body: ByteStream::from(object.body),
            metadata: ObjectMetadata {
                key,
                size,
                content_type: object.content_type,
                e_tag: object.hints.source_etag,
                last_modified: object.hints.source_mtime,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl ObjectDestination for InMemoryBucket {
    fn destination_key(&self, relative_key: &str) -> String {
        format!("{}{}", self.prefix, relative_key)
    }

    async fn store(
        &self,
        key: &str,
        body: ByteStream,
        metadata: &ObjectMetadata,
        hints: &PreserveHints,
    ) -> Result<()> {
        let bytes = body.collect().await?.into_bytes().to_vec();

        let mut state = self.state.lock().unwrap();
        if state.unavailable.contains(key) {
            return Err(anyhow!(S3migError::Store {
                key: key.to_string(),
                message: "SlowDown".to_string(),
            }));
        }
        state.put_count += 1;
        state.objects.insert(
            key.to_string(),
            StoredObject {
                body: bytes,
                content_type: metadata.content_type.clone(),
                hints: hints.clone(),
            },
        );
        Ok(())
    }
}

pub fn make_config(working_dir: &Path) -> Config {
    let mut config = Config::for_migration("hcp-namespace", "", "minio-bucket", "", working_dir);
    config.worker_size = 4;
    config.show_no_progress = true;
    config
}

pub fn write_listing(working_dir: &Path, keys: &[&str]) {
    let mut content = keys.join("\n");
    content.push('\n');
    std::fs::write(working_dir.join("object_listing.txt"), content).unwrap();
}

pub fn read_ledger(working_dir: &Path) -> Option<String> {
    std::fs::read_to_string(working_dir.join("migration_fails.txt")).ok()
}

/// Run a pipeline over the listing at `listing` and collect the outcome.
pub async fn run_pipeline(
    config: Config,
    source: Source,
    destination: Destination,
    listing: &Path,
) -> PipelineResult {
    let working_dir = config.working_dir.clone();
    let mut pipeline = MigrationPipeline::with_storage(
        config,
        source,
        destination,
        create_pipeline_cancellation_token(),
    );
    pipeline.close_stats_sender();

    let (stats, error) = match pipeline.run_listing(listing).await {
        Ok(stats) => (Some(stats), None),
        Err(e) => (None, Some(e)),
    };

    PipelineResult {
        stats,
        error,
        ledger: read_ledger(&working_dir),
    }
}
