//! Configuration loading and types for mirrorstore.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: the blob service account, core store behavior, pre-upload
//! compression, the local read mirror, and logging.

use serde::Deserialize;
use std::path::Path;

use crate::errors::{Result, StorageError};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Blob service account and credentials.
    #[serde(default)]
    pub account: AccountConfig,

    /// Core store behavior.
    #[serde(default)]
    pub store: StoreConfig,

    /// Pre-upload gzip compression.
    #[serde(default)]
    pub gzip: GzipConfig,

    /// Local read mirror (dual-write mode).
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Blob service account configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Client provider: `azure` or `memory`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Storage account name.
    #[serde(default)]
    pub name: String,

    /// Base64-encoded shared account key.  Empty means SAS auth.
    #[serde(default)]
    pub key: String,

    /// SAS token, used when no account key is set.
    #[serde(default)]
    pub sas_token: String,

    /// URL scheme for service and CDN URLs: `https` or `http`.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Service endpoint override (e.g. an emulator).  Empty derives
    /// `{protocol}://{name}.blob.core.windows.net`.
    #[serde(default)]
    pub endpoint: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: String::new(),
            key: String::new(),
            sas_token: String::new(),
            protocol: default_protocol(),
            endpoint: String::new(),
        }
    }
}

/// Core store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Container holding all blobs.
    #[serde(default)]
    pub container: String,

    /// CDN hostname for public URLs.  Empty serves URLs straight from the
    /// blob service endpoint.
    #[serde(default)]
    pub cdn_host: String,

    /// Whether `save` replaces same-named blobs.  When false, saves pick a
    /// fresh suffixed name instead.
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// strftime-style format used to parse service last-modified values.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            container: String::new(),
            cdn_host: String::new(),
            overwrite: true,
            timestamp_format: default_timestamp_format(),
        }
    }
}

/// Pre-upload gzip configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GzipConfig {
    /// Whether eligible payloads are compressed before upload.
    #[serde(default)]
    pub enabled: bool,

    /// Content types eligible for compression (exact match).
    #[serde(default = "default_gzip_content_types")]
    pub content_types: Vec<String>,
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            content_types: default_gzip_content_types(),
        }
    }
}

/// Local read mirror configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Whether saves are mirrored to the local filesystem.
    #[serde(default)]
    pub enabled: bool,

    /// Root directory of the mirror.
    #[serde(default = "default_cache_root")]
    pub root_dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root_dir: default_cache_root(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Validation ---------------------------------------------------------------

/// Validation struct for container names: 3-63 lowercase alphanumeric
/// characters and hyphens, starting and ending alphanumeric.
#[derive(Debug, garde::Validate)]
pub struct ContainerNameInput {
    #[garde(length(min = 3, max = 63), pattern(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$"))]
    pub name: String,
}

/// Validation struct for storage account names: 3-24 lowercase
/// alphanumeric characters.
#[derive(Debug, garde::Validate)]
pub struct AccountNameInput {
    #[garde(length(min = 3, max = 24), pattern(r"^[a-z0-9]+$"))]
    pub name: String,
}

impl Config {
    /// Check the parts of the configuration that every provider needs.
    ///
    /// Called by client construction so a bad container or account name
    /// fails before any request is made.
    pub fn validate(&self) -> Result<()> {
        use garde::Validate;

        if self.store.container.is_empty() {
            return Err(StorageError::Config("store.container is required".to_string()));
        }
        let container = ContainerNameInput {
            name: self.store.container.clone(),
        };
        if let Err(report) = container.validate() {
            return Err(StorageError::Config(format!(
                "invalid container name {:?}: {}",
                self.store.container, report
            )));
        }

        match self.account.protocol.as_str() {
            "http" | "https" => {}
            other => {
                return Err(StorageError::Config(format!(
                    "account.protocol must be http or https, got {:?}",
                    other
                )));
            }
        }

        if self.account.provider == "azure" {
            if self.account.name.is_empty() {
                return Err(StorageError::Config(
                    "account.name is required for the azure provider".to_string(),
                ));
            }
            let account = AccountNameInput {
                name: self.account.name.clone(),
            };
            if let Err(report) = account.validate() {
                return Err(StorageError::Config(format!(
                    "invalid account name {:?}: {}",
                    self.account.name, report
                )));
            }
        }

        if self.cache.enabled && self.cache.root_dir.is_empty() {
            return Err(StorageError::Config(
                "cache.root_dir is required when cache.enabled is true".to_string(),
            ));
        }

        Ok(())
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "azure".to_string()
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_timestamp_format() -> String {
    // The service reports RFC 1123 dates and always in GMT.
    "%a, %d %b %Y %H:%M:%S GMT".to_string()
}

fn default_gzip_content_types() -> Vec<String> {
    [
        "text/css",
        "text/html",
        "text/plain",
        "text/javascript",
        "application/javascript",
        "application/json",
        "application/xml",
        "image/svg+xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_cache_root() -> String {
    "./data/mirror".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

// -- Tests --------------------------------------------------------------------
