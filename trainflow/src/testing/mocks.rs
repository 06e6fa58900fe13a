//! In-memory collaborator doubles.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::aggregate::SelectedConfiguration;
use crate::errors::{FetchError, JobError, TrainingError, WorkspaceError};
use crate::request::{AccessToken, PipelineId, PipelineRequest};
use crate::storage::{
    Artifact, DownloadedFile, FileMetadata, FileRecord, StorageClient, StorageError,
};
use crate::trainer::{FoldJob, FoldResult, FoldRunner, ParamAssignment, Retrainer};
use crate::workspace::{TempWorkspaceManager, Workspace, WorkspaceManager};

/// Failure modes an in-memory storage client can be scripted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFailure {
    /// Behave as if the file or repository does not exist.
    NotFound,
    /// Reject the bearer token.
    Unauthorized,
    /// Fail below the application layer.
    Transport,
}

impl StorageFailure {
    fn to_error(self, what: &str) -> StorageError {
        match self {
            Self::NotFound => StorageError::NotFound(what.to_string()),
            Self::Unauthorized => StorageError::Unauthorized,
            Self::Transport => StorageError::Transport("injected transport failure".to_string()),
        }
    }
}

/// In-memory [`StorageClient`] with scriptable failures and upload
/// accounting.
#[derive(Debug, Default)]
pub struct InMemoryStorageClient {
    files: DashMap<String, Vec<u8>>,
    uploads: Mutex<Vec<FileRecord>>,
    upload_counter: AtomicUsize,
    download_failure: Mutex<Option<StorageFailure>>,
    upload_failure: Mutex<Option<StorageFailure>>,
}

impl InMemoryStorageClient {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a downloadable file.
    pub fn put_file(&self, storage_ref: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(storage_ref.into(), bytes);
    }

    /// Makes every download fail with the given mode.
    pub fn fail_downloads(&self, failure: StorageFailure) {
        *self.download_failure.lock() = Some(failure);
    }

    /// Makes every upload fail with the given mode.
    pub fn fail_uploads(&self, failure: StorageFailure) {
        *self.upload_failure.lock() = Some(failure);
    }

    /// Returns how many uploads were accepted.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }

    /// Returns the accepted upload records.
    #[must_use]
    pub fn uploads(&self) -> Vec<FileRecord> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl StorageClient for InMemoryStorageClient {
    async fn download(
        &self,
        storage_ref: &str,
        _token: &AccessToken,
    ) -> Result<DownloadedFile, StorageError> {
        if let Some(failure) = *self.download_failure.lock() {
            return Err(failure.to_error(storage_ref));
        }

        let bytes = self
            .files
            .get(storage_ref)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(storage_ref.to_string()))?;

        let metadata = FileMetadata {
            size: Some(bytes.len() as u64),
            sha256: Some(hex::encode(Sha256::digest(&bytes))),
        };
        Ok(DownloadedFile { bytes, metadata })
    }

    async fn upload(
        &self,
        repository_id: &str,
        file_name: &str,
        _content_type: &str,
        payload: Vec<u8>,
        _token: &AccessToken,
    ) -> Result<FileRecord, StorageError> {
        if let Some(failure) = *self.upload_failure.lock() {
            return Err(failure.to_error(repository_id));
        }

        let n = self.upload_counter.fetch_add(1, Ordering::SeqCst);
        let record = FileRecord {
            id: format!("file-{n}"),
            name: file_name.to_string(),
            size: payload.len() as u64,
            repository_id: repository_id.to_string(),
        };
        self.uploads.lock().push(record.clone());
        Ok(record)
    }
}

/// Workspace manager that counts acquisitions and releases.
///
/// The balance check is the test for the no-leaked-directories
/// guarantee: after any mix of successes, failures, and cancellations,
/// `acquired() == released()`.
#[derive(Debug)]
pub struct CountingWorkspaceManager {
    inner: TempWorkspaceManager,
    acquired: AtomicUsize,
    released: AtomicUsize,
    fail_acquire: AtomicBool,
}

impl CountingWorkspaceManager {
    /// Creates a counting manager over a temp-directory backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: TempWorkspaceManager::new(),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            fail_acquire: AtomicBool::new(false),
        }
    }

    /// Makes subsequent acquisitions fail.
    pub fn fail_acquisitions(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful acquisitions.
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Returns the number of releases.
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Returns true if every acquisition was released.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.acquired() == self.released()
    }
}

impl Default for CountingWorkspaceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceManager for CountingWorkspaceManager {
    fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(WorkspaceError::Allocation {
                root: self.inner.root().to_path_buf(),
                source: std::io::Error::other("injected allocation failure"),
            });
        }
        let workspace = self.inner.acquire()?;
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(workspace)
    }

    fn release(&self, workspace: Workspace) -> Result<(), WorkspaceError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(workspace)
    }
}

/// Script for one fold of a [`StubFoldRunner`].
#[derive(Debug, Clone)]
pub enum FoldScript {
    /// Return a successful result with this accuracy and assignment.
    Succeed {
        /// Held-out accuracy to report.
        accuracy: f64,
        /// Hyper-parameters to report.
        params: ParamAssignment,
    },
    /// Fail the fold with a dataset-access error.
    FailFetch,
    /// Fail the fold with a training error.
    FailTraining,
}

impl FoldScript {
    /// A success script with a single `c` hyper-parameter.
    #[must_use]
    pub fn succeed_with_c(accuracy: f64, c: f64) -> Self {
        Self::Succeed {
            accuracy,
            params: ParamAssignment::from([("c".to_string(), c)]),
        }
    }
}

/// Fold runner with per-fold scripted outcomes.
#[derive(Debug, Default)]
pub struct StubFoldRunner {
    scripts: Mutex<HashMap<usize, FoldScript>>,
    calls: AtomicUsize,
}

impl StubFoldRunner {
    /// Creates a runner with no scripts; unscripted folds succeed with
    /// accuracy 0.5 and empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome of one fold.
    pub fn script(&self, fold_index: usize, script: FoldScript) {
        self.scripts.lock().insert(fold_index, script);
    }

    /// Returns how many folds were executed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FoldRunner for StubFoldRunner {
    async fn run(&self, job: &FoldJob) -> Result<FoldResult, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .get(&job.fold_index)
            .cloned()
            .unwrap_or(FoldScript::Succeed {
                accuracy: 0.5,
                params: ParamAssignment::new(),
            });

        match script {
            FoldScript::Succeed { accuracy, params } => Ok(FoldResult {
                fold_index: job.fold_index,
                accuracy,
                params,
                elapsed: Duration::from_millis(1),
            }),
            FoldScript::FailFetch => Err(FetchError::DatasetUnavailable {
                storage_ref: job.request.dataset_ref.clone(),
            }
            .into()),
            FoldScript::FailTraining => Err(TrainingError::failed(anyhow::anyhow!(
                "injected training failure"
            ))
            .into()),
        }
    }
}

/// Retrainer double producing a fixed artifact or an injected failure.
#[derive(Debug, Default)]
pub struct StubRetrainer {
    fail: AtomicBool,
    calls: AtomicUsize,
    last_selected: Mutex<Option<SelectedConfiguration>>,
}

impl StubRetrainer {
    /// Creates a succeeding stub retrainer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent retrain calls fail.
    pub fn fail_retrains(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns how many retrains were invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the configuration of the last retrain invocation.
    #[must_use]
    pub fn last_selected(&self) -> Option<SelectedConfiguration> {
        self.last_selected.lock().clone()
    }
}

#[async_trait]
impl Retrainer for StubRetrainer {
    async fn retrain(
        &self,
        pipeline_id: PipelineId,
        _request: &PipelineRequest,
        selected: &SelectedConfiguration,
    ) -> Result<Artifact, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_selected.lock() = Some(selected.clone());

        if self.fail.load(Ordering::SeqCst) {
            return Err(JobError::Training(TrainingError::failed(anyhow::anyhow!(
                "injected retrain failure"
            ))));
        }
        Ok(Artifact::new(
            b"stub-model".to_vec(),
            format!("model-{pipeline_id}.bin"),
        ))
    }
}
