//! Upload orchestration: submit, index, and verify a single document.
//!
//! One strictly sequential pass per upload; any failure is terminal for the
//! request and the caller must resubmit. Job-level completion alone is not
//! trusted: the per-file result is checked before a file is declared ready.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_CONTAINER_TIMEOUT_SECS, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS,
};
use crate::services::poller::{self, PollError};
use crate::services::remote::{
    ContainerStatus, DocumentIndexClient, FileIndexingResult, FileIndexingStatus,
    IndexingJobStatus, RemoteClientError,
};

const CONTAINER_NAME_MAX_CHARS: usize = 40;
const FALLBACK_DOCUMENT_NAME: &str = "document";

/// Everything a successful ingestion hands back to the caller.
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub file_id: String,
    pub container_id: String,
    pub job_id: String,
    pub indexed_files: Vec<FileIndexingResult>,
}

/// Per-operation polling budgets. Container readiness gets a longer deadline
/// than job completion; both use the same fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct PollingOptions {
    pub container_timeout: Duration,
    pub job_timeout: Duration,
    pub interval: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            container_timeout: Duration::from_secs(DEFAULT_CONTAINER_TIMEOUT_SECS),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Remote(#[from] RemoteClientError),
    #[error("container {container_id} entered terminal state `{status}` before becoming ready")]
    ContainerFailed { container_id: String, status: String },
    #[error(
        "container {container_id} readiness timed out after {waited:?} (last status `{last_status}`)"
    )]
    ContainerTimedOut {
        container_id: String,
        last_status: String,
        waited: Duration,
    },
    #[error("indexing job {job_id} failed with status `{status}`")]
    JobFailed { job_id: String, status: String },
    #[error("indexing job {job_id} timed out after {waited:?} (last status `{last_status}`)")]
    JobTimedOut {
        job_id: String,
        last_status: String,
        waited: Duration,
    },
    #[error("indexing failed for file {file_id}: {detail}")]
    FileFailed { file_id: String, detail: String },
    #[error(
        "indexing result for file {file_id} missing from container {container_id} after job completion"
    )]
    ResultMissing {
        file_id: String,
        container_id: String,
    },
}

pub struct IngestionOrchestrator {
    client: Arc<dyn DocumentIndexClient>,
    expiration_days: u32,
    polling: PollingOptions,
}

impl IngestionOrchestrator {
    pub fn new(
        client: Arc<dyn DocumentIndexClient>,
        expiration_days: u32,
        polling: PollingOptions,
    ) -> Self {
        debug_assert!(expiration_days > 0);
        Self {
            client,
            expiration_days,
            polling,
        }
    }

    /// Drive one upload through the full submit → index → verify sequence.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<IngestionOutcome, IngestError> {
        let filename = sanitize_filename(filename);

        let file_id = self
            .client
            .create_file(bytes, &filename, content_type)
            .await?;
        tracing::info!(
            event = "file_submitted",
            file_id = %file_id,
            filename = %filename,
            "file stored by remote service"
        );

        let container_name = container_name_for(&filename);
        let container_id = self
            .client
            .create_container(&container_name, self.expiration_days)
            .await?;
        tracing::info!(
            event = "container_created",
            container_id = %container_id,
            name = %container_name,
            expiration_days = self.expiration_days,
        );

        self.wait_for_container(&container_id).await?;

        let job_id = self
            .client
            .create_indexing_job(&container_id, std::slice::from_ref(&file_id))
            .await?;
        tracing::info!(
            event = "job_submitted",
            job_id = %job_id,
            container_id = %container_id,
        );

        self.wait_for_job(&container_id, &job_id).await?;

        // Job completion does not imply per-file success; the listing is the
        // authoritative signal for the submitted file.
        let indexed_files = self.client.list_container_files(&container_id).await?;
        let entry = indexed_files
            .iter()
            .find(|result| result.file_id == file_id);

        match entry {
            None => Err(IngestError::ResultMissing {
                file_id,
                container_id,
            }),
            Some(result) if result.status == FileIndexingStatus::Failed => {
                Err(IngestError::FileFailed {
                    detail: result
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "remote service reported no error detail".to_string()),
                    file_id,
                })
            }
            Some(_) => {
                tracing::info!(
                    event = "file_ready",
                    file_id = %file_id,
                    container_id = %container_id,
                    job_id = %job_id,
                    "document indexed and ready for extraction"
                );
                Ok(IngestionOutcome {
                    file_id,
                    container_id,
                    job_id,
                    indexed_files,
                })
            }
        }
    }

    async fn wait_for_container(&self, container_id: &str) -> Result<(), IngestError> {
        let client = Arc::clone(&self.client);
        let outcome = poller::await_completion(
            || {
                let client = Arc::clone(&client);
                let id = container_id.to_string();
                async move { client.container_status(&id).await }
            },
            |status| *status == ContainerStatus::Completed,
            |status| *status == ContainerStatus::Expired,
            self.polling.container_timeout,
            self.polling.interval,
        )
        .await;

        match outcome {
            Ok(_) => Ok(()),
            Err(PollError::Failed { status }) => Err(IngestError::ContainerFailed {
                container_id: container_id.to_string(),
                status: status.as_ref().to_string(),
            }),
            Err(PollError::TimedOut {
                last_status,
                waited,
            }) => Err(IngestError::ContainerTimedOut {
                container_id: container_id.to_string(),
                last_status: last_status.as_ref().to_string(),
                waited,
            }),
            Err(PollError::Fetch(source)) => Err(IngestError::Remote(source)),
        }
    }

    async fn wait_for_job(&self, container_id: &str, job_id: &str) -> Result<(), IngestError> {
        let client = Arc::clone(&self.client);
        let outcome = poller::await_completion(
            || {
                let client = Arc::clone(&client);
                let container = container_id.to_string();
                let job = job_id.to_string();
                async move { client.indexing_job_status(&container, &job).await }
            },
            |status| *status == IndexingJobStatus::Completed,
            |status| {
                matches!(
                    status,
                    IndexingJobStatus::Failed | IndexingJobStatus::Cancelled
                )
            },
            self.polling.job_timeout,
            self.polling.interval,
        )
        .await;

        match outcome {
            Ok(_) => Ok(()),
            Err(PollError::Failed { status }) => Err(IngestError::JobFailed {
                job_id: job_id.to_string(),
                status: status.as_ref().to_string(),
            }),
            Err(PollError::TimedOut {
                last_status,
                waited,
            }) => Err(IngestError::JobTimedOut {
                job_id: job_id.to_string(),
                last_status: last_status.as_ref().to_string(),
                waited,
            }),
            Err(PollError::Fetch(source)) => Err(IngestError::Remote(source)),
        }
    }
}

/// Strip path components; the declared name is otherwise forwarded untouched
/// because the remote side may key its parsing strategy off the extension.
fn sanitize_filename(raw: &str) -> String {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim();
    if name.is_empty() {
        FALLBACK_DOCUMENT_NAME.to_string()
    } else {
        name.to_string()
    }
}

fn container_name_for(filename: &str) -> String {
    let mut normalized: String = filename
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    if normalized.is_empty() {
        normalized = FALLBACK_DOCUMENT_NAME.to_string();
    }
    if normalized.chars().count() > CONTAINER_NAME_MAX_CHARS {
        normalized = normalized.chars().take(CONTAINER_NAME_MAX_CHARS).collect();
    }
    format!("upload-{normalized}")
}
