//! Public URL resolution.
//!
//! Public URLs either go through a configured CDN host or fall back to
//! the client's canonical service URL.  Resolution is pure string work:
//! no request is made and no existence check happens.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::client::api::BlobClient;

/// Percent-encoding set for the key portion of public URLs: everything
/// except unreserved characters is encoded, including `/`.  A key is one
/// opaque path segment in a public URL, so `img/a.png` renders as
/// `img%2Fa.png`.
pub const KEY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Builds public URLs for stored keys.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    /// URL scheme (`https` or `http`).
    protocol: String,
    /// CDN hostname; empty means no CDN is configured.
    cdn_host: String,
    /// Container name, included in the CDN path.
    container: String,
}

impl UrlResolver {
    pub fn new(
        protocol: impl Into<String>,
        cdn_host: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            cdn_host: cdn_host.into(),
            container: container.into(),
        }
    }

    /// Resolve the public URL for `key`.
    ///
    /// With a CDN host configured the URL is
    /// `{protocol}://{cdn_host}/{container}/{encoded_key}`; otherwise the
    /// client's canonical service URL is used.
    pub fn resolve(&self, client: &dyn BlobClient, key: &str) -> String {
        if self.cdn_host.is_empty() {
            return client.blob_url(key);
        }
        let encoded = utf8_percent_encode(key, &KEY_ENCODE_SET);
        format!(
            "{}://{}/{}/{}",
            self.protocol, self.cdn_host, self.container, encoded
        )
    }
}

// -- Tests --------------------------------------------------------------------
