//! File utility functions.

use crate::error::{BestiaryError, Result};
use crate::table::{Table, Value};
use std::path::Path;

/// Decode file bytes as UTF-8, falling back to Windows-1252 (Latin-1).
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.trim_start_matches('\u{feff}').to_string());
    }
    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if had_errors {
        return Err(BestiaryError::Parse(
            "Failed to decode sheet as UTF-8 or Latin1".to_string(),
        ));
    }
    Ok(text.into_owned())
}

/// Read a delimited export of the monster sheet.
///
/// Row ids are the zero-based data row positions. Blank cells become nulls.
pub fn read_sheet(path: &Path, delimiter: u8) -> Result<Table> {
    if !path.exists() {
        return Err(BestiaryError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Sheet not found: {}", path.display()),
        )));
    }
    let bytes = std::fs::read(path)?;
    let text = decode_text(&bytes)?;
    read_sheet_from_str(&text, delimiter)
}

pub fn read_sheet_from_str(text: &str, delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = Table::new("raw", headers);

    for (id, record) in reader.records().enumerate() {
        let record = record?;
        let values = record
            .iter()
            .map(|field| {
                if field.trim().is_empty() {
                    Value::Null
                } else {
                    Value::Text(field.to_string())
                }
            })
            .collect();
        table.push_row(id as i64, values);
    }

    tracing::debug!(
        "Read {} rows with {} columns",
        table.len(),
        table.columns().len()
    );
    Ok(table)
}
