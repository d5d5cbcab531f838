//! Blob service clients.
//!
//! The [`api::BlobClient`] trait abstracts over where blobs physically
//! live.  Implementations cover the Azure Blob REST API and an
//! in-memory store for tests and offline runs.

pub mod api;
pub mod azure;
pub mod memory;

use std::sync::Arc;

use crate::config::Config;
use crate::errors::{Result, StorageError};

/// Build the configured client provider.
///
/// Validates the config first so a bad container name or missing
/// credentials fail here rather than on first use.
pub fn from_config(config: &Config) -> Result<Arc<dyn api::BlobClient>> {
    config.validate()?;
    match config.account.provider.as_str() {
        "azure" => Ok(Arc::new(azure::AzureBlobClient::new(config)?)),
        "memory" => Ok(Arc::new(memory::MemoryBlobClient::new(config))),
        other => Err(StorageError::Config(format!(
            "unknown account.provider {:?} (expected azure or memory)",
            other
        ))),
    }
}

// -- Tests -------------------------------------------------------------------
