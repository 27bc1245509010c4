//! HTTP surface for the tabula document-extraction service.
//!
//! This crate owns everything a deployment of the API needs short of the
//! remote-service orchestration itself: the router and handlers, the provider
//! seam the application crate implements, the fault taxonomy mapped onto HTTP
//! responses, and the pure spreadsheet formatter.

pub mod config;
pub mod export;
pub mod pipeline;
mod server;

pub use config::ServerConfig;
pub use pipeline::{
    DocumentUpload, DynPipeline, ExtractionData, ExtractionMeta, ExtractionPipeline, FaultKind,
    IdAnalysis, IdentifierRef, IndexedFile, IngestReceipt, PipelineFault, Table,
};
pub use server::{ApiState, FILE_ID_PREFIX, ServerError, build_api_router, serve};
