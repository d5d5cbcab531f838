//! The uniform file-storage contract.
//!
//! Every store must implement [`FileStore`].  The trait works in terms
//! of path-like names and opaque bytes; which container the blobs live
//! in, and whether a local mirror exists, are implementation concerns
//! fixed at construction.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;

/// A payload handed to `save`: the bytes plus an optional explicit
/// content type.  Without a hint the store guesses from the name's
/// extension.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Raw bytes to store.
    pub data: Bytes,
    /// Explicit MIME type; `None` lets the store guess.
    pub content_type: Option<String>,
}

impl Payload {
    /// Payload with no content-type hint.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    /// Payload with an explicit content type.
    pub fn with_content_type(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: Some(content_type.into()),
        }
    }
}

/// One level of a hierarchical listing over flat keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Synthetic directory names, deduplicated and lexically ordered.
    pub dirs: BTreeSet<String>,
    /// File names, in service listing order.
    pub files: Vec<String>,
}

/// Interpret flat `keys` as one hierarchy level under `prefix`.
///
/// The prefix contributes its `/`-separated segments; for each key, the
/// segments beyond those are the remainder.  A one-segment remainder is
/// a file at this level, more segments make the first one a directory,
/// and an empty remainder (the key equals the prefix) contributes
/// nothing.
pub fn split_listing(prefix: &str, keys: &[String]) -> Listing {
    let base_parts = if prefix.is_empty() {
        0
    } else {
        prefix.split('/').count()
    };

    let mut listing = Listing::default();
    for key in keys {
        let parts: Vec<&str> = key.split('/').collect();
        let remainder = &parts[base_parts.min(parts.len())..];
        match remainder.len() {
            0 => {}
            1 => listing.files.push(remainder[0].to_string()),
            _ => {
                listing.dirs.insert(remainder[0].to_string());
            }
        }
    }
    listing
}

/// Async file-storage contract.
pub trait FileStore: Send + Sync + 'static {
    /// Check whether a blob exists under the cleaned `name`.
    fn exists(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    /// Store `payload` under the cleaned `name`, returning the key the
    /// bytes actually landed on (it differs from `name` when overwrite
    /// is disabled and the name was taken).
    fn save(
        &self,
        name: &str,
        payload: Payload,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Read the stored bytes verbatim.  Compressed blobs come back
    /// compressed.
    fn open(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>>;

    /// Delete the blob.  Succeeds whether or not it existed.
    fn delete(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Size of the stored bytes (post-transformation).
    fn size(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>>;

    /// Last-modified time as reported by the service.
    fn modified_time(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DateTime<Utc>>> + Send + '_>>;

    /// Public URL for the blob.  Pure string construction; works for
    /// names that do not exist.
    fn url(&self, name: &str) -> String;

    /// One hierarchy level under `prefix`: synthetic directories plus
    /// files at that level.
    fn listdir(&self, prefix: &str) -> Pin<Box<dyn Future<Output = Result<Listing>> + Send + '_>>;

    /// Every key under `prefix` as a flat file list, prefix stripped.
    fn listdir_flat(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Listing>> + Send + '_>>;

    /// The key a save of `name` would land on under the store's
    /// collision policy.
    fn available_name(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

// -- Tests --------------------------------------------------------------------
