//! Abstract blob service client trait.
//!
//! Every blob service client must implement [`BlobClient`].  A client is
//! bound to one container at construction; the trait works in terms of
//! flat string keys and opaque bytes so the store layer does not need to
//! know the wire protocol.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;

/// Metadata recorded with an uploaded blob.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// MIME type stored as the blob's content type.
    pub content_type: String,
    /// Content encoding (e.g. `gzip`), when the payload was transformed.
    pub content_encoding: Option<String>,
}

/// Properties the service reports for a stored blob.
#[derive(Debug, Clone)]
pub struct BlobProperties {
    /// MIME type recorded at upload.
    pub content_type: String,
    /// Size of the stored bytes.
    pub content_length: u64,
    /// Last-modified value exactly as the service sent it; parsing is the
    /// store layer's job.
    pub last_modified: String,
    /// Content encoding recorded at upload, if any.
    pub content_encoding: Option<String>,
}

/// One CORS rule for the blob service.
#[derive(Debug, Clone)]
pub struct CorsRule {
    /// Origins allowed to make cross-origin requests.
    pub allowed_origins: Vec<String>,
    /// HTTP methods the origins may use.
    pub allowed_methods: Vec<String>,
    /// How long browsers may cache the preflight response, in seconds.
    pub max_age_seconds: u32,
}

/// Async blob service contract.
pub trait BlobClient: std::fmt::Debug + Send + Sync + 'static {
    /// Upload `data` under `key`, replacing any existing blob.
    fn put(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Download the full blob at `key`.
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>>;

    /// Delete the blob at `key`.  Fails with `NotFound` when absent.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Fetch the blob's properties without its content.
    fn get_properties(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BlobProperties>> + Send + '_>>;

    /// List every key starting with `prefix`, following service
    /// pagination until exhausted.
    fn list(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>>;

    /// Replace the service's CORS rules.
    fn set_cors(
        &self,
        rules: &[CorsRule],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Canonical service URL for `key`.  Pure string construction; no
    /// request is made and no existence check happens.
    fn blob_url(&self, key: &str) -> String;
}
