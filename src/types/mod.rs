use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use aws_sdk_s3::primitives::{ByteStream, DateTime};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod token;

/// Metadata of a resolved source object.
///
/// `key` is the object key relative to the source prefix; the destination
/// prepends its own prefix to obtain the final key. Everything else is
/// passed through to the destination unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime>,
}

/// A resolved source object: an owned body stream and its metadata.
///
/// Dropping the value releases the underlying read handle.
#[derive(Debug)]
pub struct SourceObject {
    pub body: ByteStream,
    pub metadata: ObjectMetadata,
}

/// Statistics sent through the stats channel during pipeline execution.
#[derive(Debug, PartialEq)]
pub enum MigrationStatistics {
    MigrateBytes(u64),
    MigrateComplete { key: String },
    MigrateError { key: String },
}

/// Snapshot of the migration counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    pub stats_migrated_objects: u64,
    pub stats_failed_objects: u64,
    pub stats_migrated_bytes: u64,
}

impl MigrationStats {
    /// Number of identifiers fully processed (migrated or failed).
    pub fn processed(&self) -> u64 {
        self.stats_migrated_objects + self.stats_failed_objects
    }
}

/// Lock-free counters shared by every worker of one run.
///
/// Counters only ever increase; a consistent final value is read after all
/// workers have been joined.
#[derive(Debug, Default)]
pub struct MigrationStatsReport {
    migrated_objects: AtomicU64,
    failed_objects: AtomicU64,
    migrated_bytes: AtomicU64,
}

impl MigrationStatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_migrated(&self, size: u64) {
        self.migrated_objects.fetch_add(1, Ordering::SeqCst);
        self.migrated_bytes.fetch_add(size, Ordering::SeqCst);
    }

    pub fn increment_failed(&self) {
        self.failed_objects.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MigrationStats {
        MigrationStats {
            stats_migrated_objects: self.migrated_objects.load(Ordering::SeqCst),
            stats_failed_objects: self.failed_objects.load(Ordering::SeqCst),
            stats_migrated_bytes: self.migrated_bytes.load(Ordering::SeqCst),
        }
    }
}

/// S3 storage path specification.
#[derive(Debug, Clone, PartialEq)]
pub enum StoragePath {
    S3 { bucket: String, prefix: String },
}

impl StoragePath {
    pub fn bucket(&self) -> &str {
        let StoragePath::S3 { bucket, .. } = self;
        bucket
    }

    pub fn prefix(&self) -> &str {
        let StoragePath::S3 { prefix, .. } = self;
        prefix
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let StoragePath::S3 { bucket, prefix } = self;
        write!(f, "s3://{bucket}/{prefix}")
    }
}

/// AWS configuration file locations.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

/// Credential sources supported for either side of the migration.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// Access key pair with secure zeroization.
///
/// The secret_access_key and session_token are cleared from memory
/// when this struct is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
