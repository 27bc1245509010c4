//! Provider seam and shared payload types for the extraction pipeline.
//!
//! The application crate implements [`ExtractionPipeline`]; the handlers in
//! `server` only ever talk to that trait, so the whole HTTP surface can be
//! exercised in tests with a fake provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;

/// A decoded upload: raw bytes plus the client-declared identity of the file.
///
/// The filename and content type are forwarded to the remote service as
/// declared (path components aside); the remote side may use either to pick a
/// parsing strategy.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Per-file indexing outcome as reported by the remote container listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedFile {
    pub file_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Successful ingestion result: every identifier a caller needs to continue
/// the pipeline, plus the full per-file status list for observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub file_id: String,
    pub vector_store_id: String,
    pub batch_id: String,
    pub indexed_files: Vec<IndexedFile>,
}

/// A single extracted table. Rows map column names to cell values; the map is
/// order-preserving so column derivation from row keys stays deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<JsonMap<String, Value>>,
}

/// Document-level key/value fields, ordered process steps, and free-form
/// notes extracted alongside the tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMeta {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub process_steps: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Cross-reference index of identifier-like strings found in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct IdAnalysis {
    #[serde(default)]
    pub identifiers: Vec<IdentifierRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IdentifierRef {
    pub value: String,
    #[serde(default)]
    pub kind: String,
    /// Where the identifier occurs (table names, field names, "text").
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Normalized extraction result served by `GET /ask/{file_id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionData {
    pub document_text: String,
    pub tables: Vec<Table>,
    pub id_analysis: IdAnalysis,
    pub meta: ExtractionMeta,
}

/// Failure categories every pipeline error collapses into. Each maps to one
/// HTTP status and one stable `error` code in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    InvalidInput,
    RemoteFailed,
    RemoteTimedOut,
    ResponseParse,
    Inconsistency,
}

impl FaultKind {
    pub const fn code(self) -> &'static str {
        match self {
            FaultKind::InvalidInput => "invalid_input",
            FaultKind::RemoteFailed => "remote_operation_failed",
            FaultKind::RemoteTimedOut => "remote_operation_timed_out",
            FaultKind::ResponseParse => "response_parse_error",
            FaultKind::Inconsistency => "internal_inconsistency",
        }
    }

    pub const fn is_client_error(self) -> bool {
        matches!(self, FaultKind::InvalidInput)
    }
}

/// A categorized pipeline failure with free-form context that is flattened
/// into the JSON error envelope (remote ids, last statuses, raw previews).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineFault {
    pub kind: FaultKind,
    pub message: String,
    pub context: JsonMap<String, Value>,
}

impl PipelineFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: JsonMap::new(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidInput, message)
    }

    pub fn remote_failed(message: impl Into<String>) -> Self {
        Self::new(FaultKind::RemoteFailed, message)
    }

    pub fn remote_timed_out(message: impl Into<String>) -> Self {
        Self::new(FaultKind::RemoteTimedOut, message)
    }

    pub fn response_parse(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ResponseParse, message)
    }

    pub fn inconsistency(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Inconsistency, message)
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Coerce a loosely-typed cell to its textual form. Strings pass through,
/// scalars render without quoting, missing and null become the empty string,
/// and nested structures fall back to compact JSON.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

/// Locate the table list inside any of the accepted export payload shapes:
/// a full ask response, its `data` object, or a bare `{tables: […]}`.
pub fn tables_from_payload(payload: &Value) -> Result<Vec<Table>, PipelineFault> {
    let raw = payload
        .get("tables")
        .or_else(|| payload.get("data").and_then(|data| data.get("tables")));

    let Some(raw) = raw else {
        return Err(PipelineFault::invalid_input(
            "no tables found in request body",
        ));
    };

    let tables: Vec<Table> = serde_json::from_value(raw.clone()).map_err(|err| {
        PipelineFault::invalid_input(format!("tables payload has an unexpected shape: {err}"))
    })?;

    if tables.is_empty() {
        return Err(PipelineFault::invalid_input(
            "no tables found in request body",
        ));
    }

    Ok(tables)
}

pub type DynPipeline = Arc<dyn ExtractionPipeline>;

/// The contract between the HTTP surface and the orchestration layer.
#[async_trait]
pub trait ExtractionPipeline: Send + Sync {
    /// Upload the document to the remote store, index it, and verify the
    /// per-file result. Terminal on first failure; no retries.
    async fn ingest_document(&self, upload: DocumentUpload) -> Result<IngestReceipt, PipelineFault>;

    /// Run a single structured-extraction completion against an already
    /// indexed file reference.
    async fn extract(&self, file_id: &str) -> Result<ExtractionData, PipelineFault>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tables_found_at_top_level() {
        let payload = json!({ "tables": [{ "name": "A", "columns": ["x"], "rows": [] }] });
        let tables = tables_from_payload(&payload).expect("tables parse");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name.as_deref(), Some("A"));
    }

    #[test]
    fn tables_found_under_data() {
        let payload = json!({
            "ok": true,
            "fileId": "file-abc",
            "data": { "tables": [{ "columns": ["x"], "rows": [{ "x": 1 }] }] }
        });
        let tables = tables_from_payload(&payload).expect("tables parse");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].columns, vec!["x"]);
    }

    #[test]
    fn missing_tables_is_invalid_input() {
        let fault = tables_from_payload(&json!({ "rows": [] })).expect_err("must fail");
        assert_eq!(fault.kind, FaultKind::InvalidInput);
    }

    #[test]
    fn empty_table_list_is_invalid_input() {
        let fault = tables_from_payload(&json!({ "tables": [] })).expect_err("must fail");
        assert_eq!(fault.kind, FaultKind::InvalidInput);
    }

    #[test]
    fn scalar_text_coercions() {
        assert_eq!(scalar_text(&json!("abc")), "abc");
        assert_eq!(scalar_text(&json!(5)), "5");
        assert_eq!(scalar_text(&json!(2.5)), "2.5");
        assert_eq!(scalar_text(&json!(true)), "true");
        assert_eq!(scalar_text(&Value::Null), "");
        assert_eq!(scalar_text(&json!(["a", 1])), r#"["a",1]"#);
    }

    #[test]
    fn fault_context_is_preserved() {
        let fault = PipelineFault::remote_failed("boom")
            .with_context("batchId", "vsfb_1")
            .with_context("status", "failed");
        assert_eq!(fault.kind.code(), "remote_operation_failed");
        assert_eq!(fault.context["batchId"], "vsfb_1");
    }
}
