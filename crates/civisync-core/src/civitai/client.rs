//! HTTP client for the Civitai metadata service.
//!
//! Thin wrapper around reqwest with:
//! - Configured timeout and user-agent
//! - Optional bearer credential
//! - Typed decoding of lookup responses
//! - Streamed-to-disk asset downloads (temp file, then atomic rename)

use crate::civitai::types::{ModelResponse, VersionResponse};
use crate::error::{Result, SyncError};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Base URL of the Civitai v1 API.
pub const API_BASE: &str = "https://civitai.com/api/v1";

/// Number of leading hex characters of the digest used as the lookup key.
pub const HASH_LOOKUP_LEN: usize = 12;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TEMP_SUFFIX: &str = ".part";

/// Result of a remote lookup: the decoded record, or the non-success status
/// the caller records in the missing registry.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Success(T),
    Failed { status: u16 },
}

/// Client for the remote metadata and image services.
pub struct CivitaiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CivitaiClient {
    /// Create a client against the production API.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(API_BASE, api_key)
    }

    /// Create a client against a custom base URL (used by tests).
    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("civisync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network {
                message: format!("failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Look up a model version by content identity.
    ///
    /// Only the first [`HASH_LOOKUP_LEN`] hex characters of the digest are
    /// sent; that is the service's short-hash lookup form.
    pub async fn version_by_hash(&self, digest: &str) -> Result<FetchOutcome<VersionResponse>> {
        let key = &digest[..digest.len().min(HASH_LOOKUP_LEN)];
        let url = format!("{}/model-versions/by-hash/{}", self.base_url, key);
        self.get_json(&url).await
    }

    /// Look up full model details by model id.
    pub async fn model_by_id(&self, model_id: u64) -> Result<FetchOutcome<ModelResponse>> {
        let url = format!("{}/models/{}", self.base_url, model_id);
        self.get_json(&url).await
    }

    /// URL of the models/{id} endpoint, for error reporting.
    pub fn model_url(&self, model_id: u64) -> String {
        format!("{}/models/{}", self.base_url, model_id)
    }

    /// Stream a URL's body into `dest`.
    ///
    /// Downloads to a `.part` temp file and renames on completion so a
    /// failed transfer never leaves a plausible-looking asset behind.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io_with_path(e, parent))?;
        }

        let response = self.send(self.http.get(url)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Remote {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let temp_path = PathBuf::from(format!("{}{}", dest.display(), DOWNLOAD_TEMP_SUFFIX));
        let result = write_stream(response, &temp_path).await;

        match result {
            Ok(bytes) => {
                std::fs::rename(&temp_path, dest).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    SyncError::io_with_path(e, dest)
                })?;
                debug!("downloaded {} bytes to {}", bytes, dest.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    // Internal methods

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<FetchOutcome<T>> {
        debug!("GET {}", url);
        let response = self.send(self.http.get(url)).await?;
        let status = response.status();

        if !status.is_success() {
            return Ok(FetchOutcome::Failed {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| SyncError::Network {
            message: format!("failed to read response body from {}: {}", url, e),
            source: Some(e),
        })?;

        let record: T = serde_json::from_str(&body).map_err(|e| SyncError::Json {
            message: format!("unexpected payload from {}: {}", url, e),
            source: Some(e),
        })?;

        Ok(FetchOutcome::Success(record))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        request.send().await.map_err(|e| SyncError::Network {
            message: format!("request failed: {}", e),
            source: Some(e),
        })
    }
}

async fn write_stream(response: reqwest::Response, temp_path: &Path) -> Result<u64> {
    let mut file =
        std::fs::File::create(temp_path).map_err(|e| SyncError::io_with_path(e, temp_path))?;

    let mut bytes_written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| SyncError::Network {
            message: format!("error reading download stream: {}", e),
            source: Some(e),
        })?;
        file.write_all(&chunk)
            .map_err(|e| SyncError::io_with_path(e, temp_path))?;
        bytes_written += chunk.len() as u64;
    }

    file.flush()
        .map_err(|e| SyncError::io_with_path(e, temp_path))?;
    Ok(bytes_written)
}
