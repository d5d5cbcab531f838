//! In-memory blob service client.
//!
//! Blobs are held in a `tokio::sync::RwLock<BTreeMap<...>>` keyed by
//! blob name, so listings come back in lexical key order the way the
//! real service returns them.  Listing pages through the map in
//! `page_size` chunks and follows its own continuation markers, keeping
//! the pagination path exercised without a network.
//!
//! Used by tests and by the `memory` provider for offline runs.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use super::api::{BlobClient, BlobProperties, CorsRule, PutOptions};
use crate::config::Config;
use crate::errors::{Result, StorageError};
use crate::resolve::KEY_ENCODE_SET;

/// Listing page size matching the service default.
const DEFAULT_PAGE_SIZE: usize = 5000;

/// A stored blob: bytes plus the properties recorded at put time.
#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
    content_encoding: Option<String>,
    last_modified: String,
}

/// In-memory blob service client.
#[derive(Debug)]
pub struct MemoryBlobClient {
    /// Blob store: key -> stored blob.
    blobs: tokio::sync::RwLock<BTreeMap<String, StoredBlob>>,
    /// Service-level CORS rules, replaced wholesale by `set_cors`.
    cors: tokio::sync::RwLock<Vec<CorsRule>>,
    /// Base URL used for canonical blob URLs.
    base_url: String,
    /// Container name, included in blob URLs.
    container: String,
    /// Keys per listing page.
    page_size: usize,
    /// Format used to render last-modified values, matching what the
    /// store layer parses.
    timestamp_format: String,
}

impl MemoryBlobClient {
    /// Create an empty client for the configured container.
    pub fn new(config: &Config) -> Self {
        let account = if config.account.name.is_empty() {
            "memory"
        } else {
            config.account.name.as_str()
        };
        let base_url = if config.account.endpoint.is_empty() {
            format!("{}://{}.blob.core.windows.net", config.account.protocol, account)
        } else {
            config.account.endpoint.trim_end_matches('/').to_string()
        };

        Self {
            blobs: tokio::sync::RwLock::new(BTreeMap::new()),
            cors: tokio::sync::RwLock::new(Vec::new()),
            base_url,
            container: config.store.container.clone(),
            page_size: DEFAULT_PAGE_SIZE,
            timestamp_format: config.store.timestamp_format.clone(),
        }
    }

    /// Override the listing page size (small values force marker
    /// traversal in tests).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Snapshot of the current CORS rules.
    pub async fn cors_rules(&self) -> Vec<CorsRule> {
        self.cors.read().await.clone()
    }

    /// Render the current time in the configured last-modified format.
    fn now_string(&self) -> String {
        chrono::Utc::now().format(&self.timestamp_format).to_string()
    }
}

impl BlobClient for MemoryBlobClient {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let blob = StoredBlob {
                data,
                content_type: options.content_type,
                content_encoding: options.content_encoding,
                last_modified: self.now_string(),
            };
            let mut blobs = self.blobs.write().await;
            blobs.insert(key, blob);
            Ok(())
        })
    }

    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            match blobs.get(&key) {
                Some(blob) => Ok(blob.data.clone()),
                None => Err(StorageError::not_found(key)),
            }
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut blobs = self.blobs.write().await;
            match blobs.remove(&key) {
                Some(_) => Ok(()),
                None => Err(StorageError::not_found(key)),
            }
        })
    }

    fn get_properties(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BlobProperties>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            match blobs.get(&key) {
                Some(blob) => Ok(BlobProperties {
                    content_type: blob.content_type.clone(),
                    content_length: blob.data.len() as u64,
                    last_modified: blob.last_modified.clone(),
                    content_encoding: blob.content_encoding.clone(),
                }),
                None => Err(StorageError::not_found(key)),
            }
        })
    }

    fn list(&self, prefix: &str) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            let mut all: Vec<String> = Vec::new();
            let mut marker: Option<String> = None;

            loop {
                let page: Vec<String> = blobs
                    .keys()
                    .filter(|k| k.starts_with(&prefix))
                    .filter(|k| marker.as_deref().map_or(true, |m| k.as_str() > m))
                    .take(self.page_size)
                    .cloned()
                    .collect();

                let full_page = page.len() == self.page_size;
                if let Some(last) = page.last() {
                    marker = Some(last.clone());
                }
                all.extend(page);

                if !full_page {
                    break;
                }
            }

            Ok(all)
        })
    }

    fn set_cors(
        &self,
        rules: &[CorsRule],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let rules = rules.to_vec();
        Box::pin(async move {
            let mut cors = self.cors.write().await;
            *cors = rules;
            Ok(())
        })
    }

    fn blob_url(&self, key: &str) -> String {
        let encoded = percent_encoding::utf8_percent_encode(key, &KEY_ENCODE_SET);
        format!("{}/{}/{}", self.base_url, self.container, encoded)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> MemoryBlobClient {
        let mut config = Config::default();
        config.account.provider = "memory".to_string();
        config.store.container = "static".to_string();
        MemoryBlobClient::new(&config)
    }

    fn options(content_type: &str) -> PutOptions {
        PutOptions {
            content_type: content_type.to_string(),
            content_encoding: None,
        }
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let client = test_client();
        let data = Bytes::from("hello world");

        client.put("a.txt", data.clone(), options("text/plain")).await.unwrap();

        let read = client.get("a.txt").await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let client = test_client();
        let err = client.get("no-such-key").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let client = test_client();
        let err = client.delete("no-such-key").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_blob() {
        let client = test_client();
        client.put("a.txt", Bytes::from("x"), options("text/plain")).await.unwrap();

        client.delete("a.txt").await.unwrap();
        assert!(client.get("a.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_properties_reflect_put_options() {
        let client = test_client();
        let opts = PutOptions {
            content_type: "text/css".to_string(),
            content_encoding: Some("gzip".to_string()),
        };
        client.put("style.css", Bytes::from("body{}"), opts).await.unwrap();

        let props = client.get_properties("style.css").await.unwrap();
        assert_eq!(props.content_type, "text/css");
        assert_eq!(props.content_length, 6);
        assert_eq!(props.content_encoding, Some("gzip".to_string()));
    }

    #[tokio::test]
    async fn test_last_modified_parses_with_default_format() {
        let client = test_client();
        client.put("a.txt", Bytes::from("x"), options("text/plain")).await.unwrap();

        let props = client.get_properties("a.txt").await.unwrap();
        let parsed = chrono::NaiveDateTime::parse_from_str(
            &props.last_modified,
            "%a, %d %b %Y %H:%M:%S GMT",
        );
        assert!(parsed.is_ok(), "unparseable last-modified: {}", props.last_modified);
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix_in_lexical_order() {
        let client = test_client();
        for key in ["b/2", "a/1", "b/1", "c"] {
            client.put(key, Bytes::from("x"), options("text/plain")).await.unwrap();
        }

        let keys = client.list("b/").await.unwrap();
        assert_eq!(keys, vec!["b/1".to_string(), "b/2".to_string()]);

        let all = client.list("").await.unwrap();
        assert_eq!(all, vec!["a/1", "b/1", "b/2", "c"]);
    }

    #[tokio::test]
    async fn test_list_follows_markers_across_pages() {
        let client = test_client().with_page_size(2);
        for key in ["k1", "k2", "k3", "k4", "k5"] {
            client.put(key, Bytes::from("x"), options("text/plain")).await.unwrap();
        }

        let keys = client.list("").await.unwrap();
        assert_eq!(keys, vec!["k1", "k2", "k3", "k4", "k5"]);
    }

    #[tokio::test]
    async fn test_set_cors_replaces_rules() {
        let client = test_client();
        let rules = vec![CorsRule {
            allowed_origins: vec!["https://example.com".to_string()],
            allowed_methods: vec!["GET".to_string()],
            max_age_seconds: 600,
        }];
        client.set_cors(&rules).await.unwrap();
        assert_eq!(client.cors_rules().await.len(), 1);

        client.set_cors(&[]).await.unwrap();
        assert!(client.cors_rules().await.is_empty());
    }

    #[test]
    fn test_blob_url_encodes_key_as_single_segment() {
        let client = test_client();
        assert_eq!(
            client.blob_url("img/a.png"),
            "https://memory.blob.core.windows.net/static/img%2Fa.png"
        );
    }
}
