//! Dual-write store: remote blob service plus a local mirror.
//!
//! Saves go to the remote service first; only after the remote write
//! succeeds are the same stored bytes mirrored to the local filesystem.
//! Reads prefer the mirror and fall back to the service, so a blob that
//! exists only remotely (a crash between the two save phases) is still
//! readable.  The remote side stays the source of truth for metadata
//! and listings.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::contract::{FileStore, Listing, Payload};
use super::local::LocalStore;
use super::remote::RemoteStore;
use crate::errors::Result;
use crate::naming::clean_name;

/// Remote store with a write-through local mirror.
pub struct DualWriteStore {
    remote: RemoteStore,
    local: LocalStore,
}

impl DualWriteStore {
    pub fn new(remote: RemoteStore, local: LocalStore) -> Self {
        Self { remote, local }
    }

    /// Remove `key` from both sides.  Local goes first; both deletes
    /// are idempotent.
    async fn clear_both(&self, key: &str) -> Result<()> {
        self.local.delete(key)?;
        self.remote.delete_object(key).await
    }

    /// The key a save of `name` will land on.
    ///
    /// With overwriting enabled any existing blob under the cleaned
    /// name is cleared from both sides first, so the two backing stores
    /// cannot disagree about what a subsequent save replaced.  With
    /// overwriting disabled the remote suffix policy decides.
    pub async fn resolve_name(&self, name: &str) -> Result<String> {
        let cleaned = clean_name(name);
        if self.remote.overwrite() {
            if self.remote.object_exists(&cleaned).await? || self.local.contains(&cleaned) {
                self.clear_both(&cleaned).await?;
            }
            return Ok(cleaned);
        }
        self.remote.next_available_name(&cleaned).await
    }

    /// Save remotely, then mirror the exact stored bytes locally.
    ///
    /// A remote failure aborts before the mirror is touched; a local
    /// failure after a successful remote write surfaces as an error
    /// while the remote copy remains.
    pub async fn save_object(&self, name: &str, payload: &Payload) -> Result<String> {
        let key = self.resolve_name(name).await?;
        let saved = self.remote.put_object(&key, payload).await?;
        self.local.save(&saved.key, &saved.data)?;
        info!(key = %saved.key, "mirrored object locally");
        Ok(saved.key)
    }

    /// Read from the mirror when present, else from the service.
    pub async fn open_object(&self, name: &str) -> Result<Bytes> {
        let key = clean_name(name);
        if self.local.contains(&key) {
            debug!(key = %key, "serving object from local mirror");
            return self.local.open(&key);
        }
        self.remote.open_object(&key).await
    }

    /// Delete from both sides.  The local attempt never prevents the
    /// remote one; the first failure is reported.
    pub async fn delete_object(&self, name: &str) -> Result<()> {
        let key = clean_name(name);
        let local = self.local.delete(&key);
        let remote = self.remote.delete_object(&key).await;
        local?;
        remote
    }
}

impl FileStore for DualWriteStore {
    fn exists(&self, name: &str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        self.remote.exists(name)
    }

    fn save(
        &self,
        name: &str,
        payload: Payload,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.save_object(&name, &payload).await })
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
        self.remote.size(name)
    }

    fn modified_time(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DateTime<Utc>>> + Send + '_>> {
        self.remote.modified_time(name)
    }

    fn url(&self, name: &str) -> String {
        self.remote.object_url(name)
    }

    fn listdir(&self, prefix: &str) -> Pin<Box<dyn Future<Output = Result<Listing>> + Send + '_>> {
        self.remote.listdir(prefix)
    }

    fn listdir_flat(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Listing>> + Send + '_>> {
        self.remote.listdir_flat(prefix)
    }

    fn available_name(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move { self.resolve_name(&name).await })
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api::{BlobClient, BlobProperties, CorsRule, PutOptions};
    use crate::client::memory::MemoryBlobClient;
    use crate::config::Config;
    use crate::errors::StorageError;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::Arc;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.account.provider = "memory".to_string();
        config.store.container = "static".to_string();
        config
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        client: Arc<MemoryBlobClient>,
        store: DualWriteStore,
        mirror_root: std::path::PathBuf,
    }

    fn fixture(config: &Config) -> Fixture {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let client = Arc::new(MemoryBlobClient::new(config));
        let remote = RemoteStore::new(config, Arc::clone(&client) as Arc<dyn BlobClient>);
        let local = LocalStore::new(dir.path()).expect("failed to create mirror");
        Fixture {
            mirror_root: dir.path().to_path_buf(),
            _dir: dir,
            client,
            store: DualWriteStore::new(remote, local),
        }
    }

    fn mirror(f: &Fixture) -> LocalStore {
        LocalStore::new(&f.mirror_root).unwrap()
    }

    #[tokio::test]
    async fn test_save_mirrors_identical_bytes() {
        let f = fixture(&memory_config());

        let key = f
            .store
            .save_object("docs/note.txt", &Payload::new("hello"))
            .await
            .unwrap();

        let remote_bytes = f.client.get(&key).await.unwrap();
        let local_bytes = mirror(&f).open(&key).unwrap();
        assert_eq!(remote_bytes, Bytes::from("hello"));
        assert_eq!(remote_bytes, local_bytes);
    }

    #[tokio::test]
    async fn test_save_mirrors_compressed_bytes() {
        let mut config = memory_config();
        config.gzip.enabled = true;
        let f = fixture(&config);

        let body = "h1 { font-size: 2em; } ".repeat(40);
        let key = f
            .store
            .save_object("site.css", &Payload::with_content_type(body.clone(), "text/css"))
            .await
            .unwrap();

        // Both sides hold the same compressed bytes.
        let remote_bytes = f.client.get(&key).await.unwrap();
        let local_bytes = mirror(&f).open(&key).unwrap();
        assert_eq!(remote_bytes, local_bytes);
        assert_eq!(&local_bytes[..2], &[0x1f, 0x8b]);

        let mut decompressed = Vec::new();
        GzDecoder::new(&local_bytes[..])
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, body.as_bytes());
    }

    #[tokio::test]
    async fn test_open_prefers_local_mirror() {
        let f = fixture(&memory_config());

        let key = f
            .store
            .save_object("page.html", &Payload::new("<html/>"))
            .await
            .unwrap();

        // Remove the remote copy; the mirror still serves the read.
        f.client.delete(&key).await.unwrap();
        assert_eq!(f.store.open_object(&key).await.unwrap(), Bytes::from("<html/>"));
    }

    #[tokio::test]
    async fn test_open_falls_back_to_remote() {
        let f = fixture(&memory_config());

        // Blob exists only remotely, as after a crash between phases.
        f.client
            .put("orphan.txt", Bytes::from("remote only"), PutOptions::default())
            .await
            .unwrap();

        assert_eq!(
            f.store.open_object("orphan.txt").await.unwrap(),
            Bytes::from("remote only")
        );
    }

    #[tokio::test]
    async fn test_delete_clears_both_sides() {
        let f = fixture(&memory_config());

        let key = f
            .store
            .save_object("gone.txt", &Payload::new("x"))
            .await
            .unwrap();
        f.store.delete_object(&key).await.unwrap();

        assert!(f.client.get(&key).await.unwrap_err().is_not_found());
        assert!(!mirror(&f).contains(&key));
    }

    #[tokio::test]
    async fn test_delete_missing_is_idempotent() {
        let f = fixture(&memory_config());
        f.store.delete_object("never-existed").await.unwrap();
        f.store.delete_object("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_still_attempts_remote_without_mirror_entry() {
        let f = fixture(&memory_config());

        // Remote-only blob: delete must reach the service.
        f.client
            .put("orphan.txt", Bytes::from("x"), PutOptions::default())
            .await
            .unwrap();
        f.store.delete_object("orphan.txt").await.unwrap();
        assert!(f.client.get("orphan.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_resolve_name_with_overwrite_clears_existing() {
        let f = fixture(&memory_config());

        f.store
            .save_object("asset.js", &Payload::new("v1"))
            .await
            .unwrap();
        let name = f.store.resolve_name("asset.js").await.unwrap();

        assert_eq!(name, "asset.js");
        assert!(f.client.get("asset.js").await.unwrap_err().is_not_found());
        assert!(!mirror(&f).contains("asset.js"));
    }

    #[tokio::test]
    async fn test_save_without_overwrite_mirrors_suffixed_key() {
        let mut config = memory_config();
        config.store.overwrite = false;
        let f = fixture(&config);

        f.store
            .save_object("report.txt", &Payload::new("v1"))
            .await
            .unwrap();
        let second = f
            .store
            .save_object("report.txt", &Payload::new("v2"))
            .await
            .unwrap();

        assert_eq!(second, "report_1.txt");
        assert_eq!(mirror(&f).open("report_1.txt").unwrap(), Bytes::from("v2"));
        assert_eq!(mirror(&f).open("report.txt").unwrap(), Bytes::from("v1"));
    }

    #[tokio::test]
    async fn test_overwrite_save_replaces_both_sides() {
        let f = fixture(&memory_config());

        f.store
            .save_object("asset.js", &Payload::new("v1"))
            .await
            .unwrap();
        f.store
            .save_object("asset.js", &Payload::new("v2"))
            .await
            .unwrap();

        assert_eq!(f.client.get("asset.js").await.unwrap(), Bytes::from("v2"));
        assert_eq!(mirror(&f).open("asset.js").unwrap(), Bytes::from("v2"));
    }

    // Client whose writes always fail, for ordering assertions.
    #[derive(Debug)]
    struct FailingClient;

    impl BlobClient for FailingClient {
        fn put(
            &self,
            _key: &str,
            _data: Bytes,
            _options: PutOptions,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Err(StorageError::transport("put blob", "service down")) })
        }

        fn get(&self, _key: &str) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
            Box::pin(async { Err(StorageError::transport("get blob", "service down")) })
        }

        fn delete(&self, _key: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Err(StorageError::transport("delete blob", "service down")) })
        }

        fn get_properties(
            &self,
            key: &str,
        ) -> Pin<Box<dyn Future<Output = Result<BlobProperties>> + Send + '_>> {
            let key = key.to_string();
            Box::pin(async move { Err(StorageError::not_found(&key)) })
        }

        fn list(
            &self,
            _prefix: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
            Box::pin(async { Err(StorageError::transport("list blobs", "service down")) })
        }

        fn set_cors(
            &self,
            _rules: &[CorsRule],
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Err(StorageError::transport("set cors", "service down")) })
        }

        fn blob_url(&self, key: &str) -> String {
            format!("https://unreachable.invalid/{key}")
        }
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_mirror_untouched() {
        let config = memory_config();
        let dir = tempfile::tempdir().unwrap();
        let remote = RemoteStore::new(&config, Arc::new(FailingClient) as Arc<dyn BlobClient>);
        let local = LocalStore::new(dir.path()).unwrap();
        let store = DualWriteStore::new(remote, local);

        let err = store
            .save_object("file.txt", &Payload::new("data"))
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert!(!LocalStore::new(dir.path()).unwrap().contains("file.txt"));
    }
}
