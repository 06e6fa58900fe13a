//! Dataset fetching into a job workspace.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{StorageClient, StorageError};
use crate::errors::FetchError;
use crate::request::AccessToken;

/// Materializes a dataset from the storage collaborator into a local
/// workspace and validates the transfer.
///
/// The fetcher never retries; retry policy belongs to the orchestrator's
/// caller, which re-submits the whole pipeline.
#[derive(Clone)]
pub struct DatasetFetcher {
    client: Arc<dyn StorageClient>,
}

impl DatasetFetcher {
    /// Creates a fetcher over the given storage client.
    #[must_use]
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }

    /// Downloads `storage_ref` into `workspace/file_name` and returns the
    /// local path.
    ///
    /// The transfer is validated against the metadata the store reports:
    /// an empty payload, a byte-count mismatch, or a digest mismatch all
    /// fail with [`FetchError::TransferIncomplete`].
    pub async fn fetch(
        &self,
        storage_ref: &str,
        token: &AccessToken,
        workspace: &Path,
        file_name: &str,
    ) -> Result<PathBuf, FetchError> {
        let downloaded = self
            .client
            .download(storage_ref, token)
            .await
            .map_err(|e| map_storage_error(e, storage_ref))?;

        if downloaded.bytes.is_empty() {
            return Err(FetchError::TransferIncomplete {
                storage_ref: storage_ref.to_string(),
                detail: "payload is empty".to_string(),
            });
        }

        if let Some(expected) = downloaded.metadata.size {
            let actual = downloaded.bytes.len() as u64;
            if actual != expected {
                return Err(FetchError::TransferIncomplete {
                    storage_ref: storage_ref.to_string(),
                    detail: format!("got {actual} bytes, store declared {expected}"),
                });
            }
        }

        if let Some(ref expected) = downloaded.metadata.sha256 {
            let actual = hex::encode(Sha256::digest(&downloaded.bytes));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(FetchError::TransferIncomplete {
                    storage_ref: storage_ref.to_string(),
                    detail: format!("sha-256 mismatch: got {actual}, store declared {expected}"),
                });
            }
        }

        let local_path = workspace.join(file_name);
        tokio::fs::write(&local_path, &downloaded.bytes)
            .await
            .map_err(|source| FetchError::Write {
                storage_ref: storage_ref.to_string(),
                source,
            })?;

        debug!(
            storage_ref,
            bytes = downloaded.bytes.len(),
            path = %local_path.display(),
            "dataset fetched"
        );
        Ok(local_path)
    }
}

fn map_storage_error(error: StorageError, storage_ref: &str) -> FetchError {
    match error {
        StorageError::NotFound(_) => FetchError::DatasetUnavailable {
            storage_ref: storage_ref.to_string(),
        },
        StorageError::Unauthorized => FetchError::AuthorizationFailed {
            storage_ref: storage_ref.to_string(),
        },
        StorageError::Transport(detail) => FetchError::Transport {
            storage_ref: storage_ref.to_string(),
            detail,
        },
        StorageError::UnexpectedStatus { status } => FetchError::Transport {
            storage_ref: storage_ref.to_string(),
            detail: format!("unexpected status {status}"),
        },
    }
}

impl std::fmt::Debug for DatasetFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetFetcher").finish()
    }
}
