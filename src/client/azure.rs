//! Azure Blob Storage client.
//!
//! Talks to the Azure Blob REST API via `reqwest`.  One client is bound
//! to one container.  Requests are authenticated with Shared Key
//! signatures (HMAC-SHA256 over the canonical string-to-sign) or, when
//! no account key is configured, a SAS token appended to each URL.
//!
//! Listing uses the List Blobs API and follows `NextMarker` continuation
//! tokens until the result set is exhausted, so callers always see the
//! complete key set for a prefix.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::Sha256;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::api::{BlobClient, BlobProperties, CorsRule, PutOptions};
use crate::config::{AccountConfig, Config};
use crate::errors::{Result, StorageError};
use crate::resolve::KEY_ENCODE_SET;

/// Azure REST API version used for all requests.
const AZURE_API_VERSION: &str = "2023-11-03";

/// Percent-encoding set for blob paths in wire requests: encode
/// everything except unreserved characters and `/` (the service expects
/// `/` unencoded in request paths).
const AZURE_PATH_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Blob service client backed by the Azure Blob REST API.
#[derive(Debug)]
pub struct AzureBlobClient {
    /// HTTP client for REST calls.
    client: reqwest::Client,
    /// The container all keys live in.
    container: String,
    /// Storage account name.
    account: String,
    /// Base URL of the blob service endpoint.
    base_url: String,
    /// Authentication method.
    auth: AzureAuth,
}

/// Azure authentication method.
#[derive(Debug)]
enum AzureAuth {
    /// Shared Key authentication using the storage account key.
    SharedKey { key_bytes: Vec<u8> },
    /// SAS token authentication (appended as query parameters).
    SasToken { token: String },
}

impl AzureBlobClient {
    /// Create a client bound to the configured account and container.
    ///
    /// Credentials come from the config: `account.key` (Shared Key,
    /// preferred) or `account.sas_token`.  Construction fails with a
    /// `Config` error when neither is usable; no request is made here.
    pub fn new(config: &Config) -> Result<Self> {
        let auth = Self::resolve_auth(&config.account)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| StorageError::Config(format!("failed to create HTTP client: {}", e)))?;

        let base_url = Self::base_url(&config.account);

        info!(
            "azure client initialized: account={} container={} endpoint={}",
            config.account.name, config.store.container, base_url
        );

        Ok(Self {
            client,
            container: config.store.container.clone(),
            account: config.account.name.clone(),
            base_url,
            auth,
        })
    }

    /// Resolve the authentication method from the account config.
    fn resolve_auth(account: &AccountConfig) -> Result<AzureAuth> {
        if !account.key.is_empty() {
            let key_bytes = BASE64_STANDARD.decode(&account.key).map_err(|e| {
                StorageError::Config(format!("account.key is not valid base64: {}", e))
            })?;
            return Ok(AzureAuth::SharedKey { key_bytes });
        }

        if !account.sas_token.is_empty() {
            let token = account
                .sas_token
                .strip_prefix('?')
                .unwrap_or(&account.sas_token)
                .to_string();
            return Ok(AzureAuth::SasToken { token });
        }

        Err(StorageError::Config(
            "no credentials: set account.key or account.sas_token".to_string(),
        ))
    }

    /// Derive the service base URL from the account config.
    fn base_url(account: &AccountConfig) -> String {
        if account.endpoint.is_empty() {
            format!("{}://{}.blob.core.windows.net", account.protocol, account.name)
        } else {
            account.endpoint.trim_end_matches('/').to_string()
        }
    }

    /// Build the request URL for a blob operation.
    fn request_url(&self, key: &str) -> String {
        let encoded = percent_encoding::utf8_percent_encode(key, &AZURE_PATH_ENCODE_SET);
        format!("{}/{}/{}", self.base_url, self.container, encoded)
    }

    /// Sign a request using Shared Key authentication and return the
    /// Authorization header value.
    ///
    /// `resource` is the canonical path after the account: a blob
    /// (`/{container}/{key}`), the container (`/{container}`), or the
    /// service root (`/`).  The string-to-sign format:
    /// ```text
    /// VERB\n
    /// Content-Encoding\n
    /// Content-Language\n
    /// Content-Length\n
    /// Content-MD5\n
    /// Content-Type\n
    /// Date\n
    /// If-Modified-Since\n
    /// If-Match\n
    /// If-None-Match\n
    /// If-Unmodified-Since\n
    /// Range\n
    /// CanonicalizedHeaders\n
    /// CanonicalizedResource
    /// ```
    fn sign_request(
        &self,
        method: &str,
        resource: &str,
        content_length: Option<usize>,
        content_type: &str,
        date: &str,
        extra_headers: &[(String, String)],
        query_params: &[(String, String)],
    ) -> Result<String> {
        let key_bytes = match &self.auth {
            AzureAuth::SharedKey { key_bytes } => key_bytes,
            AzureAuth::SasToken { .. } => {
                return Err(StorageError::Config(
                    "cannot sign requests with SAS token auth".to_string(),
                ));
            }
        };

        // Content-Length: empty for 0 or if not provided (GET/DELETE/HEAD).
        let content_length_str = match content_length {
            Some(0) | None => String::new(),
            Some(len) => len.to_string(),
        };

        // Build canonicalized headers (x-ms-* headers, sorted).
        let mut ms_headers: Vec<(String, String)> = vec![
            ("x-ms-date".to_string(), date.to_string()),
            ("x-ms-version".to_string(), AZURE_API_VERSION.to_string()),
        ];
        for (k, v) in extra_headers {
            let lk = k.to_lowercase();
            if lk.starts_with("x-ms-") && lk != "x-ms-date" && lk != "x-ms-version" {
                ms_headers.push((lk, v.clone()));
            }
        }
        ms_headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonicalized_headers: String = ms_headers
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        // Build the canonicalized resource.  Shared Key auth uses the
        // un-encoded blob name, not the percent-encoded URL form.
        let mut canonicalized_resource = format!("/{}{}", self.account, resource);
        // Append query parameters sorted by key.
        if !query_params.is_empty() {
            let mut sorted_params = query_params.to_vec();
            sorted_params.sort_by(|a, b| a.0.cmp(&b.0));
            for (k, v) in &sorted_params {
                canonicalized_resource.push_str(&format!("\n{}:{}", k.to_lowercase(), v));
            }
        }

        let string_to_sign = format!(
            "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}\n{}",
            method, content_length_str, content_type, canonicalized_headers, canonicalized_resource
        );

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(key_bytes)
            .map_err(|e| StorageError::Config(format!("HMAC key error: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    /// Get the current UTC date in RFC 1123 format for request headers.
    fn rfc1123_date() -> String {
        use std::time::SystemTime;
        httpdate::fmt_http_date(SystemTime::now())
    }

    /// Append the SAS token to a URL if using SAS auth.
    fn maybe_append_sas(&self, url: &str) -> String {
        match &self.auth {
            AzureAuth::SasToken { token } => {
                if url.contains('?') {
                    format!("{}&{}", url, token)
                } else {
                    format!("{}?{}", url, token)
                }
            }
            AzureAuth::SharedKey { .. } => url.to_string(),
        }
    }

    /// Map a non-404 HTTP error to a typed storage error.
    fn op_error(context: &str, status: StatusCode, body: &str) -> StorageError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            StorageError::Unauthorized {
                message: format!("{}: HTTP {}", context, status),
            }
        } else {
            StorageError::Transport {
                context: context.to_string(),
                message: format!("HTTP {} - {}", status, body),
            }
        }
    }

    /// Check if a status code indicates "not found" (404).
    fn is_not_found(status: StatusCode) -> bool {
        status == StatusCode::NOT_FOUND
    }

    // -- Azure Blob REST API operations ----------------------------------------

    /// Upload a blob (Put Blob), replacing any existing blob at `key`.
    async fn upload_blob(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()> {
        let url = self.request_url(key);
        let date = Self::rfc1123_date();

        let mut extra_headers = vec![
            ("x-ms-blob-type".to_string(), "BlockBlob".to_string()),
            (
                "x-ms-blob-content-type".to_string(),
                options.content_type.clone(),
            ),
        ];
        if let Some(encoding) = &options.content_encoding {
            extra_headers.push(("x-ms-blob-content-encoding".to_string(), encoding.clone()));
        }

        let mut req = self
            .client
            .put(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Content-Type", &options.content_type)
            .body(data.to_vec());
        for (k, v) in &extra_headers {
            req = req.header(k, v);
        }

        if let AzureAuth::SharedKey { .. } = &self.auth {
            let auth_header = self.sign_request(
                "PUT",
                &format!("/{}/{}", self.container, key),
                Some(data.len()),
                &options.content_type,
                &date,
                &extra_headers,
                &[],
            )?;
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StorageError::transport("upload", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::op_error("upload", status, &body));
        }

        Ok(())
    }

    /// Download a blob (Get Blob).
    async fn download_blob(&self, key: &str) -> Result<Bytes> {
        let url = self.request_url(key);
        let date = Self::rfc1123_date();

        let mut req = self
            .client
            .get(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION);

        if let AzureAuth::SharedKey { .. } = &self.auth {
            let auth_header = self.sign_request(
                "GET",
                &format!("/{}/{}", self.container, key),
                None,
                "",
                &date,
                &[],
                &[],
            )?;
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StorageError::transport("download", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            if Self::is_not_found(status) {
                return Err(StorageError::not_found(key));
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::op_error("download", status, &body));
        }

        resp.bytes()
            .await
            .map_err(|e| StorageError::transport("download body", e))
    }

    /// Delete a blob.  Reports 404 as `NotFound`; callers that want
    /// idempotence absorb it.
    async fn delete_blob(&self, key: &str) -> Result<()> {
        let url = self.request_url(key);
        let date = Self::rfc1123_date();

        let mut req = self
            .client
            .delete(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION);

        if let AzureAuth::SharedKey { .. } = &self.auth {
            let auth_header = self.sign_request(
                "DELETE",
                &format!("/{}/{}", self.container, key),
                None,
                "",
                &date,
                &[],
                &[],
            )?;
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StorageError::transport("delete", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            if Self::is_not_found(status) {
                return Err(StorageError::not_found(key));
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::op_error("delete", status, &body));
        }

        Ok(())
    }

    /// Fetch blob properties via HEAD (Get Blob Properties).
    async fn head_blob(&self, key: &str) -> Result<BlobProperties> {
        let url = self.request_url(key);
        let date = Self::rfc1123_date();

        let mut req = self
            .client
            .head(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION);

        if let AzureAuth::SharedKey { .. } = &self.auth {
            let auth_header = self.sign_request(
                "HEAD",
                &format!("/{}/{}", self.container, key),
                None,
                "",
                &date,
                &[],
                &[],
            )?;
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StorageError::transport("properties", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            if Self::is_not_found(status) {
                return Err(StorageError::not_found(key));
            }
            return Err(Self::op_error("properties", status, ""));
        }

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(BlobProperties {
            content_type: header("content-type")
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            content_length: header("content-length")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0),
            last_modified: header("last-modified").unwrap_or_default(),
            content_encoding: header("content-encoding"),
        })
    }

    /// List blob keys with a given prefix, following continuation markers.
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<String>> {
        let mut all_names: Vec<String> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/{}?restype=container&comp=list&prefix={}",
                self.base_url,
                self.container,
                percent_encoding::utf8_percent_encode(prefix, &AZURE_PATH_ENCODE_SET)
            );
            if let Some(ref m) = marker {
                url.push_str(&format!("&marker={}", m));
            }

            let date = Self::rfc1123_date();

            let mut query_params = vec![
                ("comp".to_string(), "list".to_string()),
                ("prefix".to_string(), prefix.to_string()),
                ("restype".to_string(), "container".to_string()),
            ];
            if let Some(ref m) = marker {
                query_params.push(("marker".to_string(), m.clone()));
            }

            let mut req = self
                .client
                .get(self.maybe_append_sas(&url))
                .header("x-ms-date", &date)
                .header("x-ms-version", AZURE_API_VERSION);

            if let AzureAuth::SharedKey { .. } = &self.auth {
                let auth_header = self.sign_request(
                    "GET",
                    &format!("/{}", self.container),
                    None,
                    "",
                    &date,
                    &[],
                    &query_params,
                )?;
                req = req.header("Authorization", auth_header);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| StorageError::transport("list", e))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(Self::op_error("list", status, &body));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| StorageError::transport("list body", e))?;

            let (names, next_marker) = Self::parse_list_page(&body);
            all_names.extend(names);

            match next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(all_names)
    }

    /// Extract blob names and the continuation marker from one List Blobs
    /// response page.
    ///
    /// The response shape is stable enough for substring extraction:
    /// `<Name>` elements inside `<Blob>` elements, plus an optional
    /// non-empty `<NextMarker>`.
    fn parse_list_page(body: &str) -> (Vec<String>, Option<String>) {
        let mut names: Vec<String> = Vec::new();

        let mut next_marker: Option<String> = None;
        if let Some(start) = body.find("<NextMarker>") {
            let start = start + "<NextMarker>".len();
            if let Some(end) = body[start..].find("</NextMarker>") {
                let nm = &body[start..start + end];
                if !nm.is_empty() {
                    next_marker = Some(nm.to_string());
                }
            }
        }

        let mut search_from = 0;
        while let Some(blob_start) = body[search_from..].find("<Blob>") {
            let blob_start = search_from + blob_start;
            if let Some(blob_end) = body[blob_start..].find("</Blob>") {
                let blob_xml = &body[blob_start..blob_start + blob_end];
                if let Some(name_start) = blob_xml.find("<Name>") {
                    let name_start = name_start + "<Name>".len();
                    if let Some(name_end) = blob_xml[name_start..].find("</Name>") {
                        names.push(blob_xml[name_start..name_start + name_end].to_string());
                    }
                }
                search_from = blob_start + blob_end;
            } else {
                break;
            }
        }

        (names, next_marker)
    }

    /// Render the Set Blob Service Properties XML body for CORS rules.
    ///
    /// An empty rule list clears all rules.
    fn cors_xml(rules: &[CorsRule]) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<StorageServiceProperties>\n  <Cors>\n",
        );
        for rule in rules {
            xml.push_str("    <CorsRule>\n");
            xml.push_str(&format!(
                "      <AllowedOrigins>{}</AllowedOrigins>\n",
                rule.allowed_origins.join(",")
            ));
            xml.push_str(&format!(
                "      <AllowedMethods>{}</AllowedMethods>\n",
                rule.allowed_methods.join(",")
            ));
            xml.push_str(&format!(
                "      <MaxAgeInSeconds>{}</MaxAgeInSeconds>\n",
                rule.max_age_seconds
            ));
            xml.push_str("      <ExposedHeaders></ExposedHeaders>\n");
            xml.push_str("      <AllowedHeaders></AllowedHeaders>\n");
            xml.push_str("    </CorsRule>\n");
        }
        xml.push_str("  </Cors>\n</StorageServiceProperties>");
        xml
    }

    /// Replace the blob service's CORS rules (Set Blob Service Properties).
    async fn put_service_properties(&self, rules: &[CorsRule]) -> Result<()> {
        let url = format!("{}/?restype=service&comp=properties", self.base_url);
        let date = Self::rfc1123_date();
        let content_type = "application/xml";

        let xml_bytes = Self::cors_xml(rules).into_bytes();
        let query_params = vec![
            ("comp".to_string(), "properties".to_string()),
            ("restype".to_string(), "service".to_string()),
        ];

        let mut req = self
            .client
            .put(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Content-Type", content_type)
            .body(xml_bytes.clone());

        if let AzureAuth::SharedKey { .. } = &self.auth {
            let auth_header = self.sign_request(
                "PUT",
                "/",
                Some(xml_bytes.len()),
                content_type,
                &date,
                &[],
                &query_params,
            )?;
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StorageError::transport("set_cors", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::op_error("set_cors", status, &body));
        }

        Ok(())
    }
}

impl BlobClient for AzureBlobClient {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            debug!(
                "azure put: container={} key={} bytes={}",
                self.container,
                key,
                data.len()
            );
            self.upload_blob(&key, &data, &options).await
        })
    }

    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            debug!("azure get: container={} key={}", self.container, key);
            self.download_blob(&key).await
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            debug!("azure delete: container={} key={}", self.container, key);
            self.delete_blob(&key).await
        })
    }

    fn get_properties(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BlobProperties>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            debug!("azure properties: container={} key={}", self.container, key);
            self.head_blob(&key).await
        })
    }

    fn list(&self, prefix: &str) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            debug!("azure list: container={} prefix={:?}", self.container, prefix);
            self.list_blobs(&prefix).await
        })
    }

    fn set_cors(
        &self,
        rules: &[CorsRule],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let rules = rules.to_vec();
        Box::pin(async move {
            debug!("azure set_cors: account={} rules={}", self.account, rules.len());
            self.put_service_properties(&rules).await
        })
    }

    fn blob_url(&self, key: &str) -> String {
        let encoded = percent_encoding::utf8_percent_encode(key, &KEY_ENCODE_SET);
        format!("{}/{}/{}", self.base_url, self.container, encoded)
    }
}

// -- Tests -------------------------------------------------------------------
