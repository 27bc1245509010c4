//! Application-level error type shared across the binary.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::AppConfigError;
use crate::services::{ExtractError, IngestError, RemoteClientError};
use tabula_server::ServerError;
use tabula_server::export::ExportError;
use tabula_server::pipeline::PipelineFault;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] AppConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Remote(#[from] RemoteClientError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Pipeline(#[from] PipelineFault),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to read input file {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output file {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
