//! Storage collaborator interface.
//!
//! The repository store is an external service: files are downloaded by
//! storage id and uploaded into repositories. [`StorageClient`] is the
//! seam the rest of the crate depends on; [`HttpStorageClient`] is the
//! production implementation speaking the store's HTTP surface.

mod fetcher;
mod publisher;

pub use fetcher::DatasetFetcher;
pub use publisher::{Artifact, ArtifactId, ArtifactPublisher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StorageConfig;
use crate::request::AccessToken;

/// Response header carrying the sha-256 digest of a stored file.
pub const CHECKSUM_HEADER: &str = "x-checksum-sha256";

/// Errors surfaced by a storage client.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The file or repository does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The bearer token was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The request failed below the application layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an unexpected status.
    #[error("unexpected status {status}")]
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
    },
}

/// Integrity metadata the store reports alongside a download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    /// Declared payload size in bytes, if reported.
    pub size: Option<u64>,
    /// Hex-encoded sha-256 digest, if reported.
    pub sha256: Option<String>,
}

/// A downloaded file with its integrity metadata.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// The raw payload.
    pub bytes: Vec<u8>,
    /// Integrity metadata reported by the store.
    pub metadata: FileMetadata,
}

/// Record of a file created in a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Store-assigned file identifier.
    pub id: String,
    /// The uploaded file name.
    pub name: String,
    /// Stored payload size in bytes.
    pub size: u64,
    /// The repository the file lives in.
    pub repository_id: String,
}

/// Client for the external repository store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Downloads a file by storage reference.
    async fn download(
        &self,
        storage_ref: &str,
        token: &AccessToken,
    ) -> Result<DownloadedFile, StorageError>;

    /// Uploads a payload as a new file in the given repository.
    async fn upload(
        &self,
        repository_id: &str,
        file_name: &str,
        content_type: &str,
        payload: Vec<u8>,
        token: &AccessToken,
    ) -> Result<FileRecord, StorageError>;
}

/// HTTP implementation of [`StorageClient`].
#[derive(Debug, Clone)]
pub struct HttpStorageClient {
    config: StorageConfig,
    client: reqwest::Client,
}

impl HttpStorageClient {
    /// Creates a client for the configured storage service.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn map_status(status: reqwest::StatusCode, what: &str) -> StorageError {
        match status.as_u16() {
            401 | 403 => StorageError::Unauthorized,
            404 => StorageError::NotFound(what.to_string()),
            status => StorageError::UnexpectedStatus { status },
        }
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn download(
        &self,
        storage_ref: &str,
        token: &AccessToken,
    ) -> Result<DownloadedFile, StorageError> {
        let url = format!("{}/downloads/{storage_ref}", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::map_status(response.status(), storage_ref));
        }

        let metadata = FileMetadata {
            size: response.content_length(),
            sha256: response
                .headers()
                .get(CHECKSUM_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        Ok(DownloadedFile {
            bytes: bytes.to_vec(),
            metadata,
        })
    }

    async fn upload(
        &self,
        repository_id: &str,
        file_name: &str,
        content_type: &str,
        payload: Vec<u8>,
        token: &AccessToken,
    ) -> Result<FileRecord, StorageError> {
        let url = format!(
            "{}/repositories/{repository_id}/files",
            self.config.base_url
        );

        let part = reqwest::multipart::Part::bytes(payload)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose())
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::map_status(response.status(), repository_id));
        }

        response
            .json::<FileRecord>()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))
    }
}
