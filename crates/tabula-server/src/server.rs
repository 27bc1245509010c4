//! Web server entrypoints live here.

use std::{future::Future, net::SocketAddr, time::Duration};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{Request, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::export;
use crate::pipeline::{
    DocumentUpload, DynPipeline, ExtractionData, FaultKind, IndexedFile, PipelineFault,
    tables_from_payload,
};

const HEALTHZ_PATH: &str = "/v1/healthz";
const UPLOAD_PATH: &str = "/upload";
const ASK_PATH: &str = "/ask/{file_id}";
const EXPORT_PATH: &str = "/export/excel";
const HEALTHZ_STATUS: &str = "ok";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const UPLOAD_FIELD: &str = "file";
const FALLBACK_FILENAME: &str = "upload.pdf";
const FALLBACK_CONTENT_TYPE: &str = "application/pdf";
/// Allowance for multipart boundaries and headers on top of the file cap.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// File references issued by the remote store carry this prefix; anything
/// else is rejected before a remote call is made.
pub const FILE_ID_PREFIX: &str = "file-";

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLSX_DISPOSITION: &str = "attachment; filename=\"extracted.xlsx\"";

const ERROR_NOT_FOUND: &str = "not_found";
const ERROR_METHOD_NOT_ALLOWED: &str = "method_not_allowed";
const ERROR_EXPORT_FAILED: &str = "export_failed";

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
struct HealthzResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    ok: bool,
    file_id: String,
    vector_store_id: String,
    batch_id: String,
    indexed_files: Vec<IndexedFile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AskResponse {
    ok: bool,
    file_id: String,
    data: ExtractionData,
}

#[derive(Clone)]
pub struct ApiState {
    pipeline: DynPipeline,
    max_upload_bytes: usize,
}

impl ApiState {
    pub fn new(pipeline: DynPipeline, max_upload_bytes: usize) -> Self {
        debug_assert!(max_upload_bytes > 0);
        Self {
            pipeline,
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: &'static str,
    message: String,
    #[serde(flatten)]
    context: JsonMap<String, Value>,
}

#[derive(Debug, Clone)]
struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                ok: false,
                error,
                message: message.into(),
                context: JsonMap::new(),
            },
        }
    }

    fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            FaultKind::InvalidInput.code(),
            message,
        )
    }

    fn not_found(path: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ERROR_NOT_FOUND,
            format!("resource `{path}` not found"),
        )
    }

    fn method_not_allowed(method: &str, path: &str) -> Self {
        debug_assert!(!method.is_empty());
        debug_assert!(path.starts_with('/'));
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            ERROR_METHOD_NOT_ALLOWED,
            format!("method `{method}` not allowed for `{path}`"),
        )
    }
}

impl From<PipelineFault> for ApiError {
    fn from(fault: PipelineFault) -> Self {
        let status = if fault.kind.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(
                kind = fault.kind.code(),
                message = %fault.message,
                "pipeline request failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            body: ApiErrorBody {
                ok: false,
                error: fault.kind.code(),
                message: fault.message,
                context: fault.context,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    ListenerFailed,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

pub fn build_api_router(state: ApiState) -> Router {
    debug_assert!(ASK_PATH.starts_with("/ask/"));
    let body_limit = state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route(
            HEALTHZ_PATH,
            get(healthz).fallback(method_not_allowed_handler),
        )
        .route(
            UPLOAD_PATH,
            post(upload).fallback(method_not_allowed_handler),
        )
        .route(ASK_PATH, get(ask).fallback(method_not_allowed_handler))
        .route(
            EXPORT_PATH,
            post(export_excel).fallback(method_not_allowed_handler),
        )
        .fallback(fallback)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

pub async fn serve(config: &ServerConfig, pipeline: DynPipeline) -> Result<(), ServerError> {
    debug_assert!(!config.listen_addr.contains('\n'));

    let listen_addr = parse_listen_addr(&config.listen_addr)?;
    let listener = bind_listener(listen_addr).await?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "tabula server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownEvent::Pending);
    let shutdown_future = broadcast_shutdown(shutdown_tx);

    let app = build_api_router(ApiState::new(pipeline, config.max_upload_bytes));

    let mut server_future = Box::pin(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_future)
            .await
    });

    let mut drain_timeout = Box::pin(drain_timeout_future(shutdown_rx.clone()));

    tokio::select! {
        result = server_future.as_mut() => {
            if let Err(source) = result {
                return Err(ServerError::Serve { source });
            }
        }
        _ = drain_timeout.as_mut() => {
            // Drain window elapsed; dropping the server future forces termination.
        }
    }

    let final_event = *shutdown_rx.borrow();
    if final_event == ShutdownEvent::Pending {
        tracing::info!("server stopped without external shutdown signal");
    } else {
        tracing::info!(?final_event, "server shutdown complete");
    }

    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
    })
}

async fn upload(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<DocumentUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        ApiError::invalid_input(format!("malformed multipart body: {err}"))
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(FALLBACK_FILENAME)
            .to_string();
        let content_type = field
            .content_type()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let bytes = field.bytes().await.map_err(|err| {
            ApiError::invalid_input(format!("failed to read multipart field `{UPLOAD_FIELD}`: {err}"))
        })?;
        upload = Some(DocumentUpload {
            bytes: bytes.to_vec(),
            filename,
            content_type,
        });
        break;
    }

    let Some(upload) = upload else {
        return Err(ApiError::invalid_input(format!(
            "multipart field `{UPLOAD_FIELD}` is required"
        )));
    };
    if upload.bytes.is_empty() {
        return Err(ApiError::invalid_input("uploaded file is empty"));
    }
    if upload.bytes.len() > state.max_upload_bytes {
        return Err(ApiError::invalid_input(format!(
            "uploaded file exceeds the {} byte limit",
            state.max_upload_bytes
        )));
    }

    tracing::info!(
        filename = %upload.filename,
        content_type = %upload.content_type,
        bytes = upload.bytes.len(),
        "upload received"
    );

    let receipt = state.pipeline.ingest_document(upload).await?;
    Ok(Json(UploadResponse {
        ok: true,
        file_id: receipt.file_id,
        vector_store_id: receipt.vector_store_id,
        batch_id: receipt.batch_id,
        indexed_files: receipt.indexed_files,
    }))
}

async fn ask(
    State(state): State<ApiState>,
    Path(file_id): Path<String>,
) -> Result<Json<AskResponse>, ApiError> {
    let file_id = file_id.trim();
    if !file_id.starts_with(FILE_ID_PREFIX) {
        return Err(ApiError::invalid_input(format!(
            "file id must start with `{FILE_ID_PREFIX}`"
        )));
    }

    let data = state.pipeline.extract(file_id).await?;
    Ok(Json(AskResponse {
        ok: true,
        file_id: file_id.to_string(),
        data,
    }))
}

async fn export_excel(body: Bytes) -> Result<Response, ApiError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| ApiError::invalid_input(format!("request body is not valid JSON: {err}")))?;
    let tables = tables_from_payload(&payload)?;
    let bytes = export::workbook_from_tables(&tables).map_err(|err| {
        tracing::error!(error = %err, "workbook assembly failed");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ERROR_EXPORT_FAILED,
            "failed to assemble workbook",
        )
    })?;

    let headers = [
        (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
        (header::CONTENT_DISPOSITION, XLSX_DISPOSITION),
    ];
    Ok((headers, bytes).into_response())
}

async fn fallback(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path())
}

async fn method_not_allowed_handler(request: Request<Body>) -> ApiError {
    debug_assert!(request.uri().path().starts_with('/'));
    ApiError::method_not_allowed(request.method().as_str(), request.uri().path())
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }

    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })
}

async fn wait_for_shutdown() -> ShutdownEvent {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}

fn broadcast_shutdown(
    sender: watch::Sender<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let event = wait_for_shutdown().await;
        debug_assert!(event != ShutdownEvent::Pending);
        if let Err(error) = sender.send(event) {
            tracing::warn!(?event, %error, "failed to broadcast shutdown event");
        }
    }
}

fn drain_timeout_future(
    mut receiver: watch::Receiver<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        if receiver.changed().await.is_ok() {
            let event = *receiver.borrow_and_update();
            tracing::info!(?event, "shutdown signal received; draining connections");
            tokio::time::sleep(DRAIN_TIMEOUT).await;
            tracing::warn!(
                ?event,
                seconds = DRAIN_TIMEOUT.as_secs(),
                "graceful shutdown timed out; continuing shutdown"
            );
        }
    }
}
