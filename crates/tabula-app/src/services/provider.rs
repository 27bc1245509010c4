//! Wires the orchestration services behind the HTTP provider seam.

use std::sync::Arc;

use async_trait::async_trait;

use crate::services::extract::{ExtractError, ExtractionRequestor};
use crate::services::ingest::{IngestError, IngestionOrchestrator, PollingOptions};
use crate::services::remote::DocumentIndexClient;
use tabula_server::pipeline::{
    DocumentUpload, ExtractionData, ExtractionPipeline, IndexedFile, IngestReceipt, PipelineFault,
};

/// The production pipeline: one remote client shared by ingestion and
/// extraction.
pub struct DocumentPipeline {
    ingestion: IngestionOrchestrator,
    extraction: ExtractionRequestor,
}

impl DocumentPipeline {
    pub fn new(
        client: Arc<dyn DocumentIndexClient>,
        expiration_days: u32,
        polling: PollingOptions,
    ) -> Self {
        Self {
            ingestion: IngestionOrchestrator::new(Arc::clone(&client), expiration_days, polling),
            extraction: ExtractionRequestor::new(client),
        }
    }
}

#[async_trait]
impl ExtractionPipeline for DocumentPipeline {
    async fn ingest_document(&self, upload: DocumentUpload) -> Result<IngestReceipt, PipelineFault> {
        let outcome = self
            .ingestion
            .ingest(upload.bytes, &upload.filename, &upload.content_type)
            .await
            .map_err(ingest_fault)?;

        Ok(IngestReceipt {
            file_id: outcome.file_id,
            vector_store_id: outcome.container_id,
            batch_id: outcome.job_id,
            indexed_files: outcome
                .indexed_files
                .into_iter()
                .map(|result| IndexedFile {
                    file_id: result.file_id,
                    status: result.status.as_ref().to_string(),
                    last_error: result.last_error,
                })
                .collect(),
        })
    }

    async fn extract(&self, file_id: &str) -> Result<ExtractionData, PipelineFault> {
        self.extraction.extract(file_id).await.map_err(extract_fault)
    }
}

fn ingest_fault(error: IngestError) -> PipelineFault {
    let message = error.to_string();
    match error {
        IngestError::Remote(_) => PipelineFault::remote_failed(message),
        IngestError::ContainerFailed {
            container_id,
            status,
        } => PipelineFault::remote_failed(message)
            .with_context("vectorStoreId", container_id)
            .with_context("status", status),
        IngestError::ContainerTimedOut {
            container_id,
            last_status,
            ..
        } => PipelineFault::remote_timed_out(message)
            .with_context("vectorStoreId", container_id)
            .with_context("lastStatus", last_status),
        IngestError::JobFailed { job_id, status } => PipelineFault::remote_failed(message)
            .with_context("batchId", job_id)
            .with_context("status", status),
        IngestError::JobTimedOut {
            job_id,
            last_status,
            ..
        } => PipelineFault::remote_timed_out(message)
            .with_context("batchId", job_id)
            .with_context("lastStatus", last_status),
        IngestError::FileFailed { file_id, detail } => PipelineFault::remote_failed(message)
            .with_context("fileId", file_id)
            .with_context("lastError", detail),
        IngestError::ResultMissing {
            file_id,
            container_id,
        } => PipelineFault::inconsistency(message)
            .with_context("fileId", file_id)
            .with_context("vectorStoreId", container_id),
    }
}

fn extract_fault(error: ExtractError) -> PipelineFault {
    let message = error.to_string();
    match error {
        ExtractError::Remote(_) => PipelineFault::remote_failed(message),
        ExtractError::ResponseParse { preview, .. } => {
            PipelineFault::response_parse(message).with_context("rawPreview", preview)
        }
    }
}
