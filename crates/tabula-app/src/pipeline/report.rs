//! Strict schema for the structured-extraction response.
//!
//! The completion service is instructed to answer with exactly this shape;
//! the generated JSON schema is embedded in the instruction text. Parsing is
//! strict at the boundary, after which `into_data` normalizes the loosely
//! typed table cells into the fixed contract the API serves.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tabula_server::pipeline::{ExtractionData, ExtractionMeta, IdAnalysis, Table, scalar_text};

/// Raw completion payload: full document text, printed tables, document-level
/// metadata, and the identifier cross-reference index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    #[serde(default)]
    pub document_text: String,
    #[serde(default)]
    pub tables: Vec<ReportTable>,
    #[serde(default)]
    pub meta: ExtractionMeta,
    #[serde(default)]
    pub id_analysis: IdAnalysis,
}

/// A table as the model reports it: name and columns optional, cells loosely
/// typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReportTable {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<Value>,
    #[serde(default)]
    pub rows: Vec<BTreeMap<String, Value>>,
}

impl ExtractionReport {
    /// Generate the JSON schema embedded in the extraction instruction.
    pub fn schema() -> Value {
        let schema = schemars::schema_for!(ExtractionReport);
        serde_json::to_value(&schema).expect("schema is serializable")
    }

    /// Normalize into the fixed contract served by the API.
    pub fn into_data(self) -> ExtractionData {
        ExtractionData {
            document_text: self.document_text,
            tables: normalize_tables(self.tables),
            id_analysis: self.id_analysis,
            meta: self.meta,
        }
    }
}

/// Enforce the table contract: positional names for unnamed tables, columns
/// as strings, and every row carrying exactly the declared columns.
pub fn normalize_tables(raw: Vec<ReportTable>) -> Vec<Table> {
    raw.into_iter()
        .enumerate()
        .map(|(position, table)| normalize_table(table, position))
        .collect()
}

fn normalize_table(raw: ReportTable, position: usize) -> Table {
    let name = raw
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Table {}", position + 1));

    let columns: Vec<String> = raw.columns.iter().map(scalar_text).collect();

    let rows = raw
        .rows
        .iter()
        .map(|row| {
            let mut normalized = serde_json::Map::with_capacity(columns.len());
            for column in &columns {
                let text = row.get(column).map(scalar_text).unwrap_or_default();
                normalized.insert(column.clone(), Value::String(text));
            }
            normalized
        })
        .collect();

    Table {
        name: Some(name),
        columns,
        rows,
    }
}
