pub mod client_builder;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpRequest;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::date_time::Format;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use leaky_bucket::RateLimiter;
use std::sync::Arc;

use crate::storage::{ObjectDestination, ObjectSource, PreserveHints};
use crate::types::error::S3migError;
use crate::types::{ObjectMetadata, SourceObject, StoragePath};

/// Header MinIO reads to keep the source ETag on a copied object.
pub const SOURCE_ETAG_HEADER: &str = "X-Minio-Source-Etag";

/// Header MinIO reads to keep the source modification time on a copied object.
pub const SOURCE_MTIME_HEADER: &str = "X-Minio-Source-Mtime";

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "AccessDenied", "NoSuchKey") and the human-readable error
/// message from the response. For other error types (network, timeout,
/// construction failure), returns "N/A" as the code and the full error
/// description as the message.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

/// Source namespace reached through the S3 API (e.g. HCP).
#[derive(Clone)]
pub struct S3Source {
    client: Arc<Client>,
    bucket: String,
    prefix: String,
    rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
}

impl S3Source {
    pub fn new(
        client: Arc<Client>,
        path: StoragePath,
        rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
    ) -> Self {
        let StoragePath::S3 { bucket, prefix } = path;
        S3Source {
            client,
            bucket,
            prefix,
            rate_limit_objects_per_sec,
        }
    }

    async fn exec_rate_limit_objects_per_sec(&self) {
        if let Some(ref rate_limiter) = self.rate_limit_objects_per_sec {
            rate_limiter.acquire_one().await;
        }
    }
}

#[async_trait]
impl ObjectSource for S3Source {
    async fn resolve(&self, identifier: &str) -> Result<SourceObject> {
        self.exec_rate_limit_objects_per_sec().await;

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(identifier)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::debug!(
                    bucket = self.bucket,
                    key = identifier,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    identifier,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context(S3migError::Resolve {
                    key: identifier.to_string(),
                    message: format!("{s3_error_code} ({s3_error_message})"),
                })
            })?;

        let metadata = ObjectMetadata {
            key: strip_prefix(&self.prefix, identifier),
            size: output.content_length().unwrap_or_default().max(0) as u64,
            content_type: output.content_type().map(String::from),
            user_metadata: output.metadata().cloned().unwrap_or_default(),
            e_tag: output.e_tag().map(String::from),
            last_modified: output.last_modified().copied(),
        };

        Ok(SourceObject {
            body: output.body,
            metadata,
        })
    }
}

/// Destination bucket reached through the S3 API (e.g. MinIO).
#[derive(Clone)]
pub struct S3Destination {
    client: Arc<Client>,
    bucket: String,
    prefix: String,
}

impl S3Destination {
    pub fn new(client: Arc<Client>, path: StoragePath) -> Self {
        let StoragePath::S3 { bucket, prefix } = path;
        S3Destination {
            client,
            bucket,
            prefix,
        }
    }
}

#[async_trait]
impl ObjectDestination for S3Destination {
    fn destination_key(&self, relative_key: &str) -> String {
        prepend_prefix(&self.prefix, relative_key)
    }

    async fn store(
        &self,
        key: &str,
        body: ByteStream,
        metadata: &ObjectMetadata,
        hints: &PreserveHints,
    ) -> Result<()> {
        let user_metadata = if metadata.user_metadata.is_empty() {
            None
        } else {
            Some(metadata.user_metadata.clone())
        };
        let preserve_headers = build_preserve_headers(hints);
        let header_key = key.to_string();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_length(metadata.size as i64)
            .set_content_type(metadata.content_type.clone())
            .set_metadata(user_metadata)
            .customize()
            .mutate_request(move |request| {
                insert_preserve_headers(request, &preserve_headers, &header_key);
            })
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::debug!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context(S3migError::Store {
                    key: key.to_string(),
                    message: format!("{s3_error_code} ({s3_error_message})"),
                })
            })?;

        Ok(())
    }
}

fn build_preserve_headers(hints: &PreserveHints) -> Vec<(&'static str, String)> {
    let mut headers = Vec::new();
    if let Some(e_tag) = &hints.source_etag {
        headers.push((SOURCE_ETAG_HEADER, e_tag.trim_matches('"').to_string()));
    }
    if let Some(mtime) = hints
        .source_mtime
        .and_then(|mtime| mtime.fmt(Format::DateTime).ok())
    {
        headers.push((SOURCE_MTIME_HEADER, mtime));
    }
    headers
}

/// Prepend the storage prefix to a relative key to form the full S3 key.
///
/// If the prefix is empty, returns the relative key as-is.
// A header the request rejects is dropped; the object is still stored.
fn insert_preserve_headers(
    request: &mut HttpRequest,
    headers: &[(&'static str, String)],
    key: &str,
) -> usize {
    let mut inserted = 0;
    for (name, value) in headers {
        match request.headers_mut().try_insert(*name, value.clone()) {
            Ok(_) => inserted += 1,
            Err(e) => tracing::warn!(
                key = key,
                header = name,
                value = value,
                error = %e,
                "provenance header rejected for {}. the object is stored without it.",
                key,
            ),
        }
    }
    inserted
}

fn prepend_prefix(prefix: &str, relative_key: &str) -> String {
    if prefix.is_empty() {
        relative_key.to_string()
    } else {
        format!("{prefix}{relative_key}")
    }
}

/// Inverse of `prepend_prefix`. Keys outside the prefix are kept whole.
fn strip_prefix(prefix: &str, key: &str) -> String {
    key.strip_prefix(prefix).unwrap_or(key).to_string()
}
