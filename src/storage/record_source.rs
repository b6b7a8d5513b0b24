// src/storage/record_source.rs
//! Certificate record sources.
//!
//! Loads candidate records from a JSON file holding either an array of flat
//! objects or one object per line (JSON Lines), or from a CSV file whose
//! header row names the fields. Also collects a single record interactively
//! from a terminal.
//!
//! JSON scalars are carried in their text form (`101`, `true`), `null` is
//! treated as an absent field, and nested arrays or objects reject the file.
//! A CSV row with fewer values than the header leaves the trailing fields
//! absent; a row with more values rejects the file.

use crate::models::record::CertificateRecord;
use crate::models::schema::RecordSchema;
use log::debug;
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("row {row}: invalid JSON: {source}")]
    Json {
        row: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("row {row}: expected a JSON object")]
    NotAnObject { row: usize },
    #[error("row {row}: field `{field}` holds a nested value")]
    NestedValue { row: usize, field: String },
    #[error("invalid CSV header: {0}")]
    CsvHeader(#[source] csv::Error),
    #[error("row {row}: invalid CSV: {source}")]
    Csv {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}: {found} values for {expected} columns")]
    TooManyValues {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("prompt failed: {0}")]
    Prompt(#[source] io::Error),
}

/// Reads every record from `path`. Files ending in `.csv` are read as CSV,
/// anything else as JSON.
pub async fn load_records(path: &Path) -> Result<Vec<CertificateRecord>, SourceError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let records = if is_csv {
        parse_csv(&text)?
    } else {
        parse_records(&text)?
    };
    debug!("loaded {} record(s) from {}", records.len(), path.display());
    Ok(records)
}

/// Parses a JSON array of objects, or JSON Lines when the text does not
/// start with `[`. Blank lines are ignored. Rows are numbered from 1.
pub fn parse_records(text: &str) -> Result<Vec<CertificateRecord>, SourceError> {
    if text.trim_start().starts_with('[') {
        let rows: Vec<Value> =
            serde_json::from_str(text).map_err(|source| SourceError::Json { row: 1, source })?;
        return rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| record_from_value(i + 1, row))
            .collect();
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let row = i + 1;
            let value = serde_json::from_str(line).map_err(|source| SourceError::Json { row, source })?;
            record_from_value(row, value)
        })
        .collect()
}

/// Parses CSV text whose first row holds the field names. Data rows are
/// numbered from 1; blank lines are ignored.
pub fn parse_csv(text: &str) -> Result<Vec<CertificateRecord>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(SourceError::CsvHeader)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row_no = i + 1;
        let row = row.map_err(|source| SourceError::Csv { row: row_no, source })?;
        if row.len() > headers.len() {
            return Err(SourceError::TooManyValues {
                row: row_no,
                expected: headers.len(),
                found: row.len(),
            });
        }
        let record: CertificateRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(field, value)| (field.clone(), value.to_string()))
            .collect();
        records.push(record);
    }
    Ok(records)
}

fn record_from_value(row: usize, value: Value) -> Result<CertificateRecord, SourceError> {
    let Value::Object(map) = value else {
        return Err(SourceError::NotAnObject { row });
    };

    let mut record = CertificateRecord::new();
    for (field, value) in map {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(SourceError::NestedValue { row, field });
            }
        };
        record.insert(field, text);
    }
    Ok(record)
}

/// Asks for every schema field on `output` and reads answers from `input`.
///
/// Required fields come first, then optional ones. An empty answer leaves
/// the field unset, so a skipped required field surfaces later as a schema
/// violation rather than here.
pub fn prompt_record<R: BufRead, W: Write>(
    schema: &RecordSchema,
    mut input: R,
    mut output: W,
) -> Result<CertificateRecord, SourceError> {
    let mut record = CertificateRecord::new();
    let fields = schema
        .required
        .iter()
        .map(|f| (f, ""))
        .chain(schema.optional.iter().map(|f| (f, " (optional)")));

    for (field, suffix) in fields {
        write!(output, "{field}{suffix}: ").map_err(SourceError::Prompt)?;
        output.flush().map_err(SourceError::Prompt)?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(SourceError::Prompt)? == 0 {
            break;
        }
        let answer = line.trim();
        if !answer.is_empty() {
            record.insert(field.as_str(), answer);
        }
    }
    Ok(record)
}
