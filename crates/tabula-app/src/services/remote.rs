//! Contract with the remote document-storage, indexing, and completion
//! service.
//!
//! The status vocabularies are owned by the remote side; anything outside the
//! known set deserializes to `Unknown`, which the orchestrator treats as
//! non-terminal rather than guessing.

use async_trait::async_trait;
use serde::Deserialize;
use strum::AsRefStr;
use thiserror::Error;

/// Lifecycle of an indexing job ("file batch") attached to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IndexingJobStatus {
    InProgress,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// Lifecycle of an indexing container ("vector store").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContainerStatus {
    InProgress,
    Completed,
    Expired,
    #[serde(other)]
    Unknown,
}

/// Per-file indexing state inside a container. This, not the job status, is
/// the authoritative readiness signal for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileIndexingStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// One entry of the container's per-file result listing.
#[derive(Debug, Clone)]
pub struct FileIndexingResult {
    pub file_id: String,
    pub status: FileIndexingStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Error)]
pub enum RemoteClientError {
    #[error("missing OPENAI_API_KEY environment variable")]
    MissingApiKey,
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected remote payload: {0}")]
    UnexpectedPayload(String),
}

/// The six operations the pipeline needs from the remote service, plus the
/// container status fetch the readiness poll is built on.
#[async_trait]
pub trait DocumentIndexClient: Send + Sync {
    /// Store raw bytes under the declared filename and content type and
    /// return the opaque file reference.
    async fn create_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, RemoteClientError>;

    /// Create an indexing container with an inactivity-based expiration
    /// policy and return its id.
    async fn create_container(
        &self,
        name: &str,
        expiration_days: u32,
    ) -> Result<String, RemoteClientError>;

    async fn container_status(
        &self,
        container_id: &str,
    ) -> Result<ContainerStatus, RemoteClientError>;

    /// Submit files into a container as one asynchronous indexing job.
    async fn create_indexing_job(
        &self,
        container_id: &str,
        file_ids: &[String],
    ) -> Result<String, RemoteClientError>;

    async fn indexing_job_status(
        &self,
        container_id: &str,
        job_id: &str,
    ) -> Result<IndexingJobStatus, RemoteClientError>;

    async fn list_container_files(
        &self,
        container_id: &str,
    ) -> Result<Vec<FileIndexingResult>, RemoteClientError>;

    /// Run one completion referencing an already stored file and return the
    /// raw output text.
    async fn create_completion(
        &self,
        file_id: &str,
        instruction: &str,
    ) -> Result<String, RemoteClientError>;
}
