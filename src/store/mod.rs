//! Storage contract and its implementations.
//!
//! [`contract::FileStore`] is the uniform surface callers program
//! against.  [`remote::RemoteStore`] implements it over a blob service
//! client; [`dual::DualWriteStore`] layers a local filesystem mirror
//! ([`local::LocalStore`]) on top when the cache is enabled.

pub mod contract;
pub mod dual;
pub mod local;
pub mod remote;

use std::sync::Arc;
use tracing::info;

use crate::client::api::BlobClient;
use crate::config::Config;
use crate::errors::Result;

use contract::FileStore;
use dual::DualWriteStore;
use local::LocalStore;
use remote::RemoteStore;

/// Build the store selected by `config`: the plain remote store, or the
/// dual-write variant when the local mirror is enabled.
pub fn from_config(config: &Config, client: Arc<dyn BlobClient>) -> Result<Arc<dyn FileStore>> {
    let remote = RemoteStore::new(config, client);
    if config.cache.enabled {
        let local = LocalStore::new(config.cache.root_dir.as_str())?;
        info!(root = %config.cache.root_dir, "local mirror enabled");
        return Ok(Arc::new(DualWriteStore::new(remote, local)));
    }
    Ok(Arc::new(remote))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract::Payload;
    use bytes::Bytes;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.account.provider = "memory".to_string();
        config.store.container = "static".to_string();
        config
    }

    #[tokio::test]
    async fn test_from_config_builds_working_remote_store() {
        let config = memory_config();
        let client = crate::client::from_config(&config).unwrap();
        let store = from_config(&config, client).unwrap();

        let key = store.save("file.txt", Payload::new("data")).await.unwrap();
        assert_eq!(store.open(&key).await.unwrap(), Bytes::from("data"));
    }

    #[tokio::test]
    async fn test_from_config_with_cache_mirrors_to_root_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config();
        config.cache.enabled = true;
        config.cache.root_dir = dir.path().to_string_lossy().into_owned();

        let client = crate::client::from_config(&config).unwrap();
        let store = from_config(&config, client).unwrap();

        let key = store.save("mirrored.txt", Payload::new("data")).await.unwrap();
        assert!(dir.path().join(&key).is_file());
    }
}
