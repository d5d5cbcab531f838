//! Blob-service backed store.
//!
//! `RemoteStore` implements the [`FileStore`] contract on top of a
//! [`BlobClient`], adding the pieces the raw client does not have: name
//! normalization, the collision policy for non-overwriting saves, gzip
//! transformation of eligible content types, CDN-aware URL resolution,
//! and hierarchical directory emulation over the service's flat keys.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

use super::contract::{split_listing, FileStore, Listing, Payload};
use crate::client::api::{BlobClient, PutOptions};
use crate::config::Config;
use crate::errors::{Result, StorageError};
use crate::naming::{alternative_name, clean_name};
use crate::resolve::UrlResolver;
use crate::transform::ContentTransformer;

/// Content type recorded when nothing can be guessed from the key.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Outcome of an upload: the final key and the exact bytes that were
/// stored (post-transformation).
#[derive(Debug, Clone)]
pub struct SavedObject {
    pub key: String,
    pub data: Bytes,
}

/// Store over a remote blob service.
pub struct RemoteStore {
    client: Arc<dyn BlobClient>,
    resolver: UrlResolver,
    transformer: ContentTransformer,
    /// When false, saves never replace an existing blob; a suffixed
    /// alternative name is chosen instead.
    overwrite: bool,
    timestamp_format: String,
    container: String,
}

impl RemoteStore {
    pub fn new(config: &Config, client: Arc<dyn BlobClient>) -> Self {
        Self {
            client,
            resolver: UrlResolver::new(
                config.account.protocol.as_str(),
                config.store.cdn_host.as_str(),
                config.store.container.as_str(),
            ),
            transformer: ContentTransformer::new(
                config.gzip.enabled,
                config.gzip.content_types.clone(),
            ),
            overwrite: config.store.overwrite,
            timestamp_format: config.store.timestamp_format.clone(),
            container: config.store.container.clone(),
        }
    }

    /// Whether saves replace existing blobs under the same name.
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Content type for an upload: the payload's explicit hint wins,
    /// then a guess from the key's extension, then the octet-stream
    /// fallback.
    fn content_type_for(key: &str, payload: &Payload) -> String {
        if let Some(content_type) = &payload.content_type {
            return content_type.clone();
        }
        mime_guess::from_path(key)
            .first_raw()
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    }

    /// Upload `payload` under exactly `key`, applying the content
    /// transformation but no name policy.  Returns the final stored
    /// bytes so callers can mirror them elsewhere.
    pub async fn put_object(&self, key: &str, payload: &Payload) -> Result<SavedObject> {
        let content_type = Self::content_type_for(key, payload);
        let (data, encoding) = self
            .transformer
            .transform(payload.data.clone(), &content_type)?;

        debug!(
            container = %self.container,
            key = %key,
            content_type = %content_type,
            compressed = encoding.is_some(),
            "uploading object"
        );

        let options = PutOptions {
            content_type,
            content_encoding: encoding.map(str::to_string),
        };
        self.client.put(key, data.clone(), options).await?;
        Ok(SavedObject {
            key: key.to_string(),
            data,
        })
    }

    /// Save under the cleaned name, applying the collision policy when
    /// overwriting is disabled.
    pub async fn save_object(&self, name: &str, payload: &Payload) -> Result<SavedObject> {
        let key = self.next_available_name(name).await?;
        let saved = self.put_object(&key, payload).await?;
        info!(container = %self.container, key = %saved.key, "saved object");
        Ok(saved)
    }

    pub async fn open_object(&self, name: &str) -> Result<Bytes> {
        let key = clean_name(name);
        self.client.get(&key).await
    }

    /// Delete the blob.  A missing blob counts as deleted.
    pub async fn delete_object(&self, name: &str) -> Result<()> {
        let key = clean_name(name);
        match self.client.delete(&key).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(container = %self.container, key = %key, "delete of missing object ignored");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn object_exists(&self, name: &str) -> Result<bool> {
        let key = clean_name(name);
        match self.client.get_properties(&key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn object_size(&self, name: &str) -> Result<u64> {
        let key = clean_name(name);
        let properties = self.client.get_properties(&key).await?;
        Ok(properties.content_length)
    }

    pub async fn object_modified_time(&self, name: &str) -> Result<DateTime<Utc>> {
        let key = clean_name(name);
        let properties = self.client.get_properties(&key).await?;
        parse_timestamp(&properties.last_modified, &self.timestamp_format)
    }

    /// The key a save of `name` would land on.  With overwriting
    /// enabled that is just the cleaned name; otherwise suffixed
    /// alternatives (`_1`, `_2`, ...) are tried until one is unused.
    pub async fn next_available_name(&self, name: &str) -> Result<String> {
        let cleaned = clean_name(name);
        if self.overwrite {
            return Ok(cleaned);
        }

        let mut candidate = cleaned.clone();
        let mut attempt = 1u32;
        while self.object_exists(&candidate).await? {
            candidate = alternative_name(&cleaned, attempt);
            attempt += 1;
        }
        Ok(candidate)
    }

    pub fn object_url(&self, name: &str) -> String {
        let key = clean_name(name);
        self.resolver.resolve(self.client.as_ref(), &key)
    }

    /// One level of the emulated hierarchy under `path`.
    pub async fn list_directory(&self, path: &str) -> Result<Listing> {
        let prefix = normalize_prefix(path);
        // The service matches prefixes as plain strings, so scope the
        // listing with a trailing separator or "ab/x" shows up under "a".
        let keys = self.client.list(&list_scope(&prefix)).await?;
        Ok(split_listing(&prefix, &keys))
    }

    /// Every key below `path`, prefix-stripped, as a flat file list
    /// with an empty directory set.  Keys that merely share a string
    /// prefix without a `/` boundary are omitted.
    pub async fn list_flat(&self, path: &str) -> Result<Listing> {
        let prefix = normalize_prefix(path);
        let keys = self.client.list(&list_scope(&prefix)).await?;

        let mut listing = Listing::default();
        if prefix.is_empty() {
            listing.files = keys;
            return Ok(listing);
        }

        let base = format!("{}/", prefix);
        for key in keys {
            if let Some(relative) = key.strip_prefix(&base) {
                listing.files.push(relative.to_string());
            }
        }
        Ok(listing)
    }
}

/// Normalize a listing prefix: backslashes become slashes and any
/// trailing separator is dropped.
fn normalize_prefix(path: &str) -> String {
    clean_name(path).trim_end_matches('/').to_string()
}

/// The prefix actually sent to the service: non-empty prefixes get a
/// trailing separator back so only keys below them match.
fn list_scope(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/", prefix)
    }
}

/// Parse a service timestamp with the configured format into UTC.
fn parse_timestamp(value: &str, format: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, format)
        .map(|naive| naive.and_utc())
        .map_err(|_| StorageError::TimestampParse {
            value: value.to_string(),
            format: format.to_string(),
        })
}

impl FileStore for RemoteStore {
    fn exists(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.object_exists(&name).await })
    }

    fn save(
        &self,
        name: &str,
        payload: Payload,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { Ok(self.save_object(&name, &payload).await?.key) })
    }

    fn open(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.open_object(&name).await })
    }

    fn delete(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.delete_object(&name).await })
    }

    fn size(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.object_size(&name).await })
    }

    fn modified_time(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DateTime<Utc>>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.object_modified_time(&name).await })
    }

    fn url(&self, name: &str) -> String {
        self.object_url(name)
    }

    fn listdir(&self, prefix: &str) -> Pin<Box<dyn Future<Output = Result<Listing>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(async move { self.list_directory(&prefix).await })
    }

    fn listdir_flat(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Listing>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(async move { self.list_flat(&prefix).await })
    }

    fn available_name(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.next_available_name(&name).await })
    }
}

// -- Tests --------------------------------------------------------------------
