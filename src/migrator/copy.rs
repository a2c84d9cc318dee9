//! Full copy: stream the source object into the destination.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::storage::{Destination, PreserveHints, Source};

use super::{TransferOutcome, Transferer};

pub struct CopyTransferer {
    source: Source,
    destination: Destination,
}

impl CopyTransferer {
    pub fn new(source: Source, destination: Destination) -> Self {
        Self {
            source,
            destination,
        }
    }
}

#[async_trait]
impl Transferer for CopyTransferer {
    async fn transfer(&self, identifier: &str) -> Result<TransferOutcome> {
        let source_object = self.source.resolve(identifier).await?;
        let metadata = source_object.metadata;
        let destination_key = self.destination.destination_key(&metadata.key);
        let hints = PreserveHints::from_metadata(&metadata);

        debug!(
            key = identifier,
            destination_key = destination_key,
            size = metadata.size,
            "sending object to destination."
        );

        // The body is moved into the store call and released whatever the
        // outcome.
        self.destination
            .store(&destination_key, source_object.body, &metadata, &hints)
            .await?;

        Ok(TransferOutcome {
            source_key: identifier.to_string(),
            destination_key,
            size: metadata.size,
        })
    }
}
