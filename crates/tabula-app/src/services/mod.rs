//! Orchestration layer for the remote document-index collaborator.
//!
//! Modules here coordinate the external service: uploading, container and
//! job lifecycle, completion polling, and the extraction request. Pure
//! transforms stay in `crate::pipeline` so this layer holds only the
//! concurrency- and failure-sensitive control flow.

pub mod extract;
pub mod ingest;
pub mod openai;
pub mod poller;
pub mod provider;
pub mod remote;

pub use extract::{ExtractError, ExtractionRequestor, extraction_instruction};
pub use ingest::{IngestError, IngestionOrchestrator, IngestionOutcome, PollingOptions};
pub use openai::OpenAiDocumentStore;
pub use poller::{PollError, await_completion};
pub use provider::DocumentPipeline;
pub use remote::{
    ContainerStatus, DocumentIndexClient, FileIndexingResult, FileIndexingStatus,
    IndexingJobStatus, RemoteClientError,
};
