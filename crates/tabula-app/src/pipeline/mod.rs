//! Pure data shaping for extraction payloads. No I/O here; orchestration
//! lives in `crate::services`.

pub mod report;

pub use report::{ExtractionReport, ReportTable, normalize_tables};
