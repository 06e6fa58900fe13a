//! Artifact publishing into the repository store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{StorageClient, StorageError};
use crate::errors::PublishError;
use crate::request::AccessToken;

/// Identifier of a published artifact, assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Wraps a store-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A serialized model awaiting publication.
///
/// The publisher owns the payload until the store accepts it; after a
/// successful publish only the [`ArtifactId`] remains with the pipeline.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Serialized model bytes.
    pub payload: Vec<u8>,
    /// File name the artifact is stored under.
    pub file_name: String,
    /// Content type of the payload.
    pub content_type: String,
}

impl Artifact {
    /// Creates an artifact from a serialized payload.
    #[must_use]
    pub fn new(payload: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            payload,
            file_name: file_name.into(),
            content_type: "application/octet-stream".to_string(),
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Uploads model artifacts to the repository store.
///
/// A successful return means the artifact is durably stored; the caller
/// must not publish the same artifact again after success.
#[derive(Clone)]
pub struct ArtifactPublisher {
    client: Arc<dyn StorageClient>,
}

impl ArtifactPublisher {
    /// Creates a publisher over the given storage client.
    #[must_use]
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }

    /// Publishes the artifact into `repository_id` and returns its id.
    pub async fn publish(
        &self,
        artifact: Artifact,
        repository_id: &str,
        token: &AccessToken,
    ) -> Result<ArtifactId, PublishError> {
        let size = artifact.size();
        let record = self
            .client
            .upload(
                repository_id,
                &artifact.file_name,
                &artifact.content_type,
                artifact.payload,
                token,
            )
            .await
            .map_err(|e| map_storage_error(e, repository_id))?;

        info!(
            repository_id,
            artifact_id = %record.id,
            bytes = size,
            "artifact published"
        );
        Ok(ArtifactId::new(record.id))
    }
}

fn map_storage_error(error: StorageError, repository_id: &str) -> PublishError {
    match error {
        StorageError::Unauthorized => PublishError::AuthorizationFailed {
            repository_id: repository_id.to_string(),
        },
        StorageError::NotFound(what) => PublishError::UploadFailed {
            repository_id: repository_id.to_string(),
            detail: format!("unknown repository or path: {what}"),
        },
        StorageError::Transport(detail) => PublishError::UploadFailed {
            repository_id: repository_id.to_string(),
            detail,
        },
        StorageError::UnexpectedStatus { status } => PublishError::UploadFailed {
            repository_id: repository_id.to_string(),
            detail: format!("unexpected status {status}"),
        },
    }
}

impl std::fmt::Debug for ArtifactPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPublisher").finish()
    }
}
