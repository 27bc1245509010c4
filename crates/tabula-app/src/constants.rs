//! Cross-cutting application constants.

/// Upper bound on the uploaded file size accepted by `POST /upload`.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Bound on raw completion output echoed back in parse-failure responses.
pub const RAW_PREVIEW_MAX_CHARS: usize = 500;

/// Days of remote-side inactivity before an indexing container expires.
pub const DEFAULT_CONTAINER_EXPIRATION_DAYS: u32 = 7;

/// Default deadline for an indexing job to reach a terminal state.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;

/// Default deadline for a freshly created container to become ready. Longer
/// than the job deadline: container provisioning is the slower operation.
pub const DEFAULT_CONTAINER_TIMEOUT_SECS: u64 = 300;

/// Fixed delay between status polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 800;

/// Completion model used for structured extraction unless configured.
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4.1-mini";

/// Default base URL of the remote document-index service.
pub const DEFAULT_REMOTE_BASE_URL: &str = "https://api.openai.com/v1";
