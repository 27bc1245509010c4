//! Pure spreadsheet assembly: a table set in, one xlsx workbook out.
//!
//! Everything here is deterministic data shaping. Cell values are written as
//! text with an explicit text number format so spreadsheet applications do
//! not reinterpret identifier-like strings as numbers.

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use thiserror::Error;

use crate::pipeline::{Table, scalar_text};

/// Hard limit the xlsx format places on worksheet names.
pub const SHEET_NAME_MAX_CHARS: usize = 31;

const SHEET_NAME_INVALID: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];
const WIDTH_SAMPLE_ROWS: usize = 50;
const MIN_COLUMN_WIDTH: f64 = 10.0;
const MAX_COLUMN_WIDTH: f64 = 60.0;
const HEADER_ROW_HEIGHT: f64 = 20.0;
const DATA_ROW_HEIGHT: f64 = 16.0;
const EMPTY_TABLE_NOTICE: &str = "No tabular data was detected for this table.";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
}

/// Build a workbook with one sheet per table, in input order.
pub fn workbook_from_tables(tables: &[Table]) -> Result<Vec<u8>, ExportError> {
    debug_assert!(!tables.is_empty(), "caller rejects empty table sets");

    let names = resolve_sheet_names(tables);
    let header_format = Format::new().set_bold().set_text_wrap().set_num_format("@");
    let cell_format = Format::new().set_text_wrap().set_num_format("@");

    let mut workbook = Workbook::new();
    for (table, name) in tables.iter().zip(&names) {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;
        write_table(worksheet, table, &header_format, &cell_format)?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// Derive the final, collision-free sheet name for every table.
pub fn resolve_sheet_names(tables: &[Table]) -> Vec<String> {
    let mut taken: Vec<String> = Vec::with_capacity(tables.len());
    let mut names = Vec::with_capacity(tables.len());

    for (position, table) in tables.iter().enumerate() {
        let base = table
            .name
            .as_deref()
            .map(sanitize_sheet_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Table {}", position + 1));
        let name = uniquify_sheet_name(&base, &taken);
        taken.push(name.to_lowercase());
        names.push(name);
    }

    names
}

/// Replace characters the format disallows with spaces, collapse whitespace,
/// drop edge apostrophes, and truncate to the 31-character limit.
fn sanitize_sheet_name(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        let ch = if SHEET_NAME_INVALID.contains(&ch) { ' ' } else { ch };
        if ch.is_whitespace() {
            pending_space = !cleaned.is_empty();
            continue;
        }
        if pending_space {
            cleaned.push(' ');
            pending_space = false;
        }
        cleaned.push(ch);
    }

    let trimmed = cleaned.trim_matches('\'');
    let mut name: String = trimmed.chars().take(SHEET_NAME_MAX_CHARS).collect();
    while name.ends_with(' ') {
        name.pop();
    }
    name
}

/// Sheet names that differ only by case collide in the xlsx format, so the
/// taken list holds lowercase entries.
fn uniquify_sheet_name(base: &str, taken: &[String]) -> String {
    if !taken.contains(&base.to_lowercase()) {
        return base.to_string();
    }

    let mut ordinal: u32 = 2;
    loop {
        let suffix = format!(" {ordinal}");
        let budget = SHEET_NAME_MAX_CHARS.saturating_sub(suffix.chars().count());
        let mut stem: String = base.chars().take(budget).collect();
        while stem.ends_with(' ') {
            stem.pop();
        }
        let candidate = format!("{stem}{suffix}");
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        ordinal += 1;
    }
}

/// Declared columns win; otherwise the union of row keys in first-seen order.
pub fn resolve_columns(table: &Table) -> Vec<String> {
    if !table.columns.is_empty() {
        return table.columns.clone();
    }

    let mut seen: Vec<String> = Vec::new();
    for row in &table.rows {
        for key in row.keys() {
            if !seen.iter().any(|existing| existing == key) {
                seen.push(key.clone());
            }
        }
    }
    seen
}

fn write_table(
    worksheet: &mut Worksheet,
    table: &Table,
    header_format: &Format,
    cell_format: &Format,
) -> Result<(), XlsxError> {
    let columns = resolve_columns(table);
    if columns.is_empty() {
        worksheet.write_string_with_format(0, 0, EMPTY_TABLE_NOTICE, cell_format)?;
        worksheet.set_row_height(0, DATA_ROW_HEIGHT)?;
        worksheet.set_column_width(0, MAX_COLUMN_WIDTH)?;
        return Ok(());
    }

    for (col, header) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, header_format)?;
    }
    worksheet.set_row_height(0, HEADER_ROW_HEIGHT)?;

    for (row_idx, row) in table.rows.iter().enumerate() {
        let row_num = (row_idx + 1) as u32;
        for (col, header) in columns.iter().enumerate() {
            let text = row
                .get(header)
                .map(scalar_text)
                .unwrap_or_default();
            worksheet.write_string_with_format(row_num, col as u16, &text, cell_format)?;
        }
        worksheet.set_row_height(row_num, DATA_ROW_HEIGHT)?;
    }

    for (col, header) in columns.iter().enumerate() {
        worksheet.set_column_width(col as u16, column_width(table, header))?;
    }

    worksheet.autofilter(0, 0, table.rows.len() as u32, (columns.len() - 1) as u16)?;
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Width heuristic: the longer of the header and the widest cell among the
/// first fifty rows, padded and clamped.
fn column_width(table: &Table, column: &str) -> f64 {
    let mut widest = column.chars().count();
    for row in table.rows.iter().take(WIDTH_SAMPLE_ROWS) {
        if let Some(value) = row.get(column) {
            widest = widest.max(scalar_text(value).chars().count());
        }
    }
    ((widest + 2) as f64).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    fn table(name: Option<&str>, columns: &[&str], rows: Vec<Value>) -> Table {
        Table {
            name: name.map(str::to_string),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|row| match row {
                    Value::Object(map) => map,
                    other => panic!("test rows must be objects, got {other}"),
                })
                .collect(),
        }
    }

    #[test]
    fn sheet_names_are_sanitized_suffixed_and_defaulted() {
        let tables = vec![
            table(Some("A:B"), &[], vec![]),
            table(Some("A:B"), &[], vec![]),
            table(Some(""), &[], vec![]),
        ];
        let names = resolve_sheet_names(&tables);
        assert_eq!(names, vec!["A B", "A B 2", "Table 3"]);
    }

    #[test]
    fn suffixed_names_still_fit_the_limit() {
        let long = "X".repeat(40);
        let tables = vec![
            table(Some(&long), &[], vec![]),
            table(Some(&long), &[], vec![]),
        ];
        let names = resolve_sheet_names(&tables);
        assert_eq!(names[0].chars().count(), SHEET_NAME_MAX_CHARS);
        assert!(names[1].ends_with(" 2"));
        assert!(names[1].chars().count() <= SHEET_NAME_MAX_CHARS);
    }

    #[test]
    fn collisions_are_case_insensitive() {
        let tables = vec![
            table(Some("Totals"), &[], vec![]),
            table(Some("TOTALS"), &[], vec![]),
        ];
        let names = resolve_sheet_names(&tables);
        assert_eq!(names[1], "TOTALS 2");
    }

    #[test]
    fn whitespace_collapses_before_truncation() {
        assert_eq!(sanitize_sheet_name("  a   b\tc  "), "a b c");
        assert_eq!(sanitize_sheet_name("a/b\\c"), "a b c");
        assert_eq!(sanitize_sheet_name("'quoted'"), "quoted");
    }

    #[test]
    fn declared_columns_take_precedence_over_row_keys() {
        let t = table(None, &["a"], vec![json!({ "b": 1 })]);
        assert_eq!(resolve_columns(&t), vec!["a"]);
    }

    #[test]
    fn derived_columns_keep_first_seen_order() {
        let t = table(
            None,
            &[],
            vec![json!({ "z": 1, "a": 2 }), json!({ "m": 3, "z": 4 })],
        );
        assert_eq!(resolve_columns(&t), vec!["z", "a", "m"]);
    }

    #[test]
    fn workbook_bytes_are_a_zip_archive() {
        let tables = vec![table(
            Some("Data"),
            &["id", "note"],
            vec![json!({ "id": 5 })],
        )];
        let bytes = workbook_from_tables(&tables).expect("workbook builds");
        assert!(bytes.starts_with(b"PK"), "xlsx output must be a zip archive");
    }

    #[test]
    fn column_less_table_builds_a_placeholder_sheet() {
        let tables = vec![table(Some("Empty"), &[], vec![])];
        let bytes = workbook_from_tables(&tables).expect("placeholder workbook builds");
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn width_heuristic_clamps_both_ends() {
        let mut wide_row = Map::new();
        wide_row.insert("c".to_string(), Value::String("y".repeat(200)));
        let wide = Table {
            name: None,
            columns: vec!["c".to_string()],
            rows: vec![wide_row],
        };
        assert_eq!(column_width(&wide, "c"), MAX_COLUMN_WIDTH);

        let narrow = table(None, &["c"], vec![json!({ "c": "x" })]);
        assert_eq!(column_width(&narrow, "c"), MIN_COLUMN_WIDTH);
    }
}
