//! Dry run: resolve the source object and report where it would go.
//!
//! The destination is only asked for the key mapping; nothing is written.

use anyhow::Result;
use async_trait::async_trait;

use crate::storage::{Destination, Source};

use super::{TransferOutcome, Transferer};

pub struct DryRunTransferer {
    source: Source,
    destination: Destination,
}

impl DryRunTransferer {
    pub fn new(source: Source, destination: Destination) -> Self {
        Self {
            source,
            destination,
        }
    }
}

#[async_trait]
impl Transferer for DryRunTransferer {
    async fn transfer(&self, identifier: &str) -> Result<TransferOutcome> {
        let source_object = self.source.resolve(identifier).await?;
        let destination_key = self
            .destination
            .destination_key(&source_object.metadata.key);

        Ok(TransferOutcome {
            source_key: identifier.to_string(),
            destination_key,
            size: source_object.metadata.size,
        })
    }
}
