//! Pre-upload content transformation.
//!
//! The only transformation is gzip: payloads whose content type is in the
//! configured allow list are compressed before upload and tagged with a
//! `gzip` content encoding.  Stored bytes are returned verbatim on read;
//! nothing here runs on the download path.

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

use crate::errors::Result;

/// Compression level applied to eligible payloads.
const GZIP_LEVEL: u32 = 6;

/// Content encoding recorded for compressed blobs.
pub const GZIP_ENCODING: &str = "gzip";

/// Compresses eligible upload payloads.
///
/// Eligibility is an exact content-type match against the configured set.
/// When disabled, or for types outside the set, payloads pass through
/// untouched.
#[derive(Debug, Clone)]
pub struct ContentTransformer {
    enabled: bool,
    content_types: Vec<String>,
}

impl ContentTransformer {
    /// Create a transformer for the given content-type allow list.
    pub fn new(enabled: bool, content_types: Vec<String>) -> Self {
        Self {
            enabled,
            content_types,
        }
    }

    /// True when payloads of `content_type` would be compressed.
    pub fn applies_to(&self, content_type: &str) -> bool {
        self.enabled && self.content_types.iter().any(|ct| ct == content_type)
    }

    /// Apply the transformation for `content_type`.
    ///
    /// Returns the bytes to upload and the content encoding to record with
    /// them (`None` when the payload passed through unchanged).
    pub fn transform(&self, data: Bytes, content_type: &str) -> Result<(Bytes, Option<&'static str>)> {
        if !self.applies_to(content_type) {
            return Ok((data, None));
        }

        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 2),
            Compression::new(GZIP_LEVEL),
        );
        encoder.write_all(&data)?;
        let compressed = encoder.finish()?;

        Ok((Bytes::from(compressed), Some(GZIP_ENCODING)))
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn css_transformer() -> ContentTransformer {
        ContentTransformer::new(true, vec!["text/css".to_string(), "text/html".to_string()])
    }

    #[test]
    fn test_disabled_passes_through() {
        let t = ContentTransformer::new(false, vec!["text/css".to_string()]);
        let data = Bytes::from("body { color: red; }");
        let (out, encoding) = t.transform(data.clone(), "text/css").unwrap();
        assert_eq!(out, data);
        assert_eq!(encoding, None);
    }

    #[test]
    fn test_type_outside_set_passes_through() {
        let t = css_transformer();
        let data = Bytes::from(vec![0u8; 256]);
        let (out, encoding) = t.transform(data.clone(), "image/png").unwrap();
        assert_eq!(out, data);
        assert_eq!(encoding, None);
    }

    #[test]
    fn test_eligible_type_is_gzipped() {
        let t = css_transformer();
        let data = Bytes::from("body { color: red; } ".repeat(50));
        let (out, encoding) = t.transform(data.clone(), "text/css").unwrap();

        assert_eq!(encoding, Some(GZIP_ENCODING));
        // Gzip magic bytes.
        assert_eq!(&out[..2], &[0x1f, 0x8b]);
        assert!(out.len() < data.len());

        // The stream must decompress back to the original payload.
        let mut decoder = GzDecoder::new(out.as_ref());
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).unwrap();
        assert_eq!(Bytes::from(restored), data);
    }

    #[test]
    fn test_empty_payload_still_valid_gzip() {
        let t = css_transformer();
        let (out, encoding) = t.transform(Bytes::new(), "text/html").unwrap();

        assert_eq!(encoding, Some(GZIP_ENCODING));
        let mut decoder = GzDecoder::new(out.as_ref());
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_content_type_match_is_exact() {
        let t = css_transformer();
        assert!(t.applies_to("text/css"));
        assert!(!t.applies_to("text/css; charset=utf-8"));
        assert!(!t.applies_to("TEXT/CSS"));
    }
}
