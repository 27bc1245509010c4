//! OpenAI-backed implementation of [`DocumentIndexClient`].
//!
//! Maps the pipeline's collaborator contract onto the Files, Vector Stores,
//! and Responses APIs. Error bodies from the remote side are preserved
//! verbatim so failures surface with the detail the service reported.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

use crate::services::remote::{
    ContainerStatus, DocumentIndexClient, FileIndexingResult, FileIndexingStatus,
    IndexingJobStatus, RemoteClientError,
};

const API_KEY_ENV: &str = "OPENAI_API_KEY";
const FILE_PURPOSE: &str = "assistants";
const EXPIRATION_ANCHOR: &str = "last_active_at";
const FILE_LIST_PAGE_LIMIT: u32 = 100;
const OUTPUT_TEXT_KIND: &str = "output_text";

#[derive(Clone, bon::Builder)]
pub struct OpenAiDocumentStore {
    #[builder(into)]
    api_key: String,
    #[builder(into)]
    base_url: String,
    #[builder(into)]
    model: String,
    #[builder(default)]
    http: reqwest::Client,
}

impl OpenAiDocumentStore {
    /// Build a client with credentials taken from the environment.
    pub fn from_env(
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, RemoteClientError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| RemoteClientError::MissingApiKey)?;
        Ok(Self::builder()
            .api_key(api_key)
            .base_url(base_url)
            .model(model)
            .build())
    }

    fn endpoint(&self, path: &str) -> String {
        debug_assert!(!path.starts_with('/'));
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteClientError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerObject {
    status: ContainerStatus,
}

#[derive(Debug, Deserialize)]
struct JobObject {
    id: String,
    status: IndexingJobStatus,
}

#[derive(Debug, Deserialize)]
struct FileListPayload {
    #[serde(default)]
    data: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    status: FileIndexingStatus,
    #[serde(default)]
    last_error: Option<FileError>,
}

#[derive(Debug, Deserialize)]
struct FileError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl FileError {
    fn render(&self) -> String {
        match (self.code.as_deref(), self.message.as_deref()) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.to_string(),
            (None, Some(message)) => message.to_string(),
            (None, None) => "unspecified remote error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesPayload {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl DocumentIndexClient for OpenAiDocumentStore {
    async fn create_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, RemoteClientError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = Form::new().text("purpose", FILE_PURPOSE).part("file", part);

        let response = self
            .http
            .post(self.endpoint("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let payload: CreatedObject = Self::check(response).await?.json().await?;
        Ok(payload.id)
    }

    async fn create_container(
        &self,
        name: &str,
        expiration_days: u32,
    ) -> Result<String, RemoteClientError> {
        let body = json!({
            "name": name,
            "expires_after": { "anchor": EXPIRATION_ANCHOR, "days": expiration_days },
        });
        let response = self
            .http
            .post(self.endpoint("vector_stores"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let payload: CreatedObject = Self::check(response).await?.json().await?;
        Ok(payload.id)
    }

    async fn container_status(
        &self,
        container_id: &str,
    ) -> Result<ContainerStatus, RemoteClientError> {
        let response = self
            .http
            .get(self.endpoint(&format!("vector_stores/{container_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let payload: ContainerObject = Self::check(response).await?.json().await?;
        Ok(payload.status)
    }

    async fn create_indexing_job(
        &self,
        container_id: &str,
        file_ids: &[String],
    ) -> Result<String, RemoteClientError> {
        let body = json!({ "file_ids": file_ids });
        let response = self
            .http
            .post(self.endpoint(&format!("vector_stores/{container_id}/file_batches")))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let payload: JobObject = Self::check(response).await?.json().await?;
        Ok(payload.id)
    }

    async fn indexing_job_status(
        &self,
        container_id: &str,
        job_id: &str,
    ) -> Result<IndexingJobStatus, RemoteClientError> {
        let response = self
            .http
            .get(self.endpoint(&format!(
                "vector_stores/{container_id}/file_batches/{job_id}"
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let payload: JobObject = Self::check(response).await?.json().await?;
        debug_assert_eq!(payload.id, job_id);
        Ok(payload.status)
    }

    async fn list_container_files(
        &self,
        container_id: &str,
    ) -> Result<Vec<FileIndexingResult>, RemoteClientError> {
        let response = self
            .http
            .get(self.endpoint(&format!(
                "vector_stores/{container_id}/files?limit={FILE_LIST_PAGE_LIMIT}"
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let payload: FileListPayload = Self::check(response).await?.json().await?;
        Ok(payload
            .data
            .into_iter()
            .map(|entry| FileIndexingResult {
                file_id: entry.id,
                status: entry.status,
                last_error: entry.last_error.as_ref().map(FileError::render),
            })
            .collect())
    }

    async fn create_completion(
        &self,
        file_id: &str,
        instruction: &str,
    ) -> Result<String, RemoteClientError> {
        let body = json!({
            "model": self.model,
            "input": [{
                "role": "user",
                "content": [
                    { "type": "input_file", "file_id": file_id },
                    { "type": "input_text", "text": instruction },
                ],
            }],
        });
        let response = self
            .http
            .post(self.endpoint("responses"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let payload: ResponsesPayload = Self::check(response).await?.json().await?;

        let mut buffer = String::new();
        for item in &payload.output {
            for part in &item.content {
                if part.kind == OUTPUT_TEXT_KIND {
                    buffer.push_str(&part.text);
                }
            }
        }
        if buffer.trim().is_empty() {
            return Err(RemoteClientError::UnexpectedPayload(
                "completion response contained no output text".to_string(),
            ));
        }
        Ok(buffer)
    }
}
