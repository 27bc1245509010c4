//! Single-shot structured extraction against the completion service.
//!
//! Exactly one request per call, referencing the file by id. The reply must
//! be strict JSON in the report schema; anything else is a terminal error
//! carrying a bounded preview of the raw output. No repair, no retry.

use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::constants::RAW_PREVIEW_MAX_CHARS;
use crate::pipeline::report::ExtractionReport;
use crate::services::remote::{DocumentIndexClient, RemoteClientError};
use tabula_server::pipeline::ExtractionData;

const INSTRUCTION_PREAMBLE: &str = "You are analysing a single uploaded document. \
Respond with one JSON object only, no surrounding prose and no code fences. \
Transcribe the full document text. Capture every printed table, keeping cell \
values as text exactly as printed and using the table's printed label as its \
name when one exists. Collect document-level key/value fields, the ordered \
list of process steps, and free-form notes under `meta`. Under `idAnalysis`, \
index identifier-like strings (codes, serial numbers, references) together \
with the places they occur.";

static INSTRUCTION: OnceLock<String> = OnceLock::new();

/// The fixed extraction instruction: preamble plus generated report schema.
pub fn extraction_instruction() -> &'static str {
    INSTRUCTION.get_or_init(|| {
        let schema = ExtractionReport::schema();
        format!("{INSTRUCTION_PREAMBLE}\n\nThe response must conform to this JSON schema:\n{schema}")
    })
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Remote(#[from] RemoteClientError),
    #[error("completion output is not valid JSON: {source}")]
    ResponseParse {
        #[source]
        source: serde_json::Error,
        preview: String,
    },
}

pub struct ExtractionRequestor {
    client: Arc<dyn DocumentIndexClient>,
}

impl ExtractionRequestor {
    pub fn new(client: Arc<dyn DocumentIndexClient>) -> Self {
        Self { client }
    }

    pub async fn extract(&self, file_id: &str) -> Result<ExtractionData, ExtractError> {
        let output = self
            .client
            .create_completion(file_id, extraction_instruction())
            .await?;

        let report: ExtractionReport =
            serde_json::from_str(output.trim()).map_err(|source| ExtractError::ResponseParse {
                source,
                preview: preview_of(&output),
            })?;

        tracing::debug!(
            event = "extraction_parsed",
            file_id = %file_id,
            tables = report.tables.len(),
            identifiers = report.id_analysis.identifiers.len(),
        );

        Ok(report.into_data())
    }
}

fn preview_of(raw: &str) -> String {
    if raw.chars().count() <= RAW_PREVIEW_MAX_CHARS {
        return raw.to_string();
    }
    let mut preview: String = raw.chars().take(RAW_PREVIEW_MAX_CHARS).collect();
    preview.push('…');
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::services::remote::{ContainerStatus, FileIndexingResult, IndexingJobStatus};

    struct CannedCompletion {
        output: String,
    }

    #[async_trait]
    impl DocumentIndexClient for CannedCompletion {
        async fn create_file(
            &self,
            _bytes: Vec<u8>,
            _filename: &str,
            _content_type: &str,
        ) -> Result<String, RemoteClientError> {
            unreachable!("extraction never uploads")
        }

        async fn create_container(
            &self,
            _name: &str,
            _expiration_days: u32,
        ) -> Result<String, RemoteClientError> {
            unreachable!("extraction never creates containers")
        }

        async fn container_status(
            &self,
            _container_id: &str,
        ) -> Result<ContainerStatus, RemoteClientError> {
            unreachable!("extraction never polls containers")
        }

        async fn create_indexing_job(
            &self,
            _container_id: &str,
            _file_ids: &[String],
        ) -> Result<String, RemoteClientError> {
            unreachable!("extraction never submits jobs")
        }

        async fn indexing_job_status(
            &self,
            _container_id: &str,
            _job_id: &str,
        ) -> Result<IndexingJobStatus, RemoteClientError> {
            unreachable!("extraction never polls jobs")
        }

        async fn list_container_files(
            &self,
            _container_id: &str,
        ) -> Result<Vec<FileIndexingResult>, RemoteClientError> {
            unreachable!("extraction never lists containers")
        }

        async fn create_completion(
            &self,
            _file_id: &str,
            instruction: &str,
        ) -> Result<String, RemoteClientError> {
            assert!(instruction.contains("JSON schema"));
            Ok(self.output.clone())
        }
    }

    fn requestor(output: &str) -> ExtractionRequestor {
        ExtractionRequestor::new(Arc::new(CannedCompletion {
            output: output.to_string(),
        }))
    }

    #[tokio::test]
    async fn valid_report_normalizes_into_data() {
        let subject = requestor(
            r#"{
                "documentText": "hello",
                "tables": [{ "columns": ["id", "note"], "rows": [{ "id": 5 }] }],
                "meta": { "fields": { "invoice": "INV-9" } },
                "idAnalysis": { "identifiers": [{ "value": "INV-9", "kind": "invoice", "sources": ["meta"] }] }
            }"#,
        );

        let data = subject.extract("file-123").await.expect("extraction succeeds");
        assert_eq!(data.document_text, "hello");
        assert_eq!(data.tables[0].name.as_deref(), Some("Table 1"));
        assert_eq!(data.tables[0].rows[0]["id"], "5");
        assert_eq!(data.tables[0].rows[0]["note"], "");
        assert_eq!(data.meta.fields["invoice"], "INV-9");
        assert_eq!(data.id_analysis.identifiers[0].value, "INV-9");
    }

    #[tokio::test]
    async fn non_json_output_fails_with_bounded_preview() {
        let noise = "Sorry, I cannot do that. ".repeat(100);
        let subject = requestor(&noise);

        let error = subject
            .extract("file-123")
            .await
            .expect_err("prose output must fail");

        match error {
            ExtractError::ResponseParse { preview, .. } => {
                assert!(preview.starts_with("Sorry"));
                assert!(preview.chars().count() <= RAW_PREVIEW_MAX_CHARS + 1);
            }
            other => panic!("expected ResponseParse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fenced_json_is_rejected_not_repaired() {
        let subject = requestor("```json\n{\"documentText\":\"x\"}\n```");
        let error = subject
            .extract("file-123")
            .await
            .expect_err("fenced output is not strict JSON");
        assert!(matches!(error, ExtractError::ResponseParse { .. }));
    }

    #[test]
    fn instruction_is_stable_and_embeds_the_schema() {
        let first = extraction_instruction();
        let second = extraction_instruction();
        assert!(std::ptr::eq(first, second));
        assert!(first.contains("documentText"));
        assert!(first.contains("idAnalysis"));
    }
}
