//! Raw batch normalization.
//!
//! Converts the unparsed upstream payload into canonical [`Record`]s: one
//! schema for delimited text rows, one for already-structured rows. The
//! returned iterator is lazy and restartable; re-iterating re-normalizes
//! from the same raw batch without mutating it.

use chrono::DateTime;
use serde_json::Value;
use tracing::{debug, warn};

use crate::record::coerce::coerce;
use crate::record::Record;
use crate::source::RawBatch;

/// How raw rows map onto record fields.
#[derive(Debug, Clone)]
pub enum RowSchema {
    /// Delimiter-separated text rows zipped against named columns.
    Delimited {
        delimiter: char,
        columns: Vec<String>,
        skip_header: bool,
    },
    /// Already-parsed JSON objects, with declared epoch-seconds fields
    /// enriched by a human-readable `<field>_ts` companion.
    Structured { epoch_fields: Vec<String> },
}

/// Normalizes raw batches against a fixed schema.
#[derive(Debug, Clone)]
pub struct Normalizer {
    schema: RowSchema,
}

impl Normalizer {
    pub fn new(schema: RowSchema) -> Self {
        Self { schema }
    }

    /// Lazily normalize a raw batch into records.
    ///
    /// Rows that cannot be normalized are logged and skipped; a row that
    /// reduces to zero fields is discarded as noise. `limit` caps emission
    /// during iteration so the batch is never over-consumed.
    pub fn normalize<'a>(
        &'a self,
        batch: &'a RawBatch,
        limit: Option<usize>,
    ) -> Box<dyn Iterator<Item = Record> + 'a> {
        let records: Box<dyn Iterator<Item = Record> + 'a> = match (&self.schema, batch) {
            (
                RowSchema::Delimited {
                    delimiter,
                    columns,
                    skip_header,
                },
                RawBatch::Text(text),
            ) => {
                let skip = usize::from(*skip_header);
                Box::new(
                    text.lines()
                        .skip(skip)
                        .filter_map(move |line| delimited_row(line, *delimiter, columns)),
                )
            }
            (RowSchema::Structured { epoch_fields }, RawBatch::Rows(rows)) => Box::new(
                rows.iter()
                    .filter_map(move |row| structured_row(row, epoch_fields)),
            ),
            (schema, batch) => {
                warn!(
                    "Schema {schema:?} does not match batch shape {}; emitting nothing",
                    batch.shape()
                );
                Box::new(std::iter::empty())
            }
        };
        Box::new(records.take(limit.unwrap_or(usize::MAX)))
    }
}

/// Split, strip carriage returns, coerce, and zip against the columns.
fn delimited_row(line: &str, delimiter: char, columns: &[String]) -> Option<Record> {
    let record: Record = columns
        .iter()
        .zip(line.split(delimiter))
        .map(|(column, token)| {
            let token = token.replace('\r', "");
            (column.clone(), coerce(&token))
        })
        .collect();

    if record.is_empty() {
        debug!("Dropping row with no usable fields: {line:?}");
        return None;
    }
    Some(record)
}

/// Drop empty fields and enrich declared epoch-seconds fields.
fn structured_row(row: &Value, epoch_fields: &[String]) -> Option<Record> {
    let object = match row.as_object() {
        Some(object) => object,
        None => {
            warn!("Skipping non-object row: {row}");
            return None;
        }
    };

    let mut record = Record::new();
    for (name, value) in object {
        match value {
            Value::String(s) => record.insert(name.clone(), Value::String(s.trim().to_string())),
            other => record.insert(name.clone(), other.clone()),
        }
    }

    // Timestamp companions are added alongside the raw numeric fields,
    // never replacing them.
    for field in epoch_fields {
        let seconds = match record.get(field).and_then(Value::as_i64) {
            Some(seconds) => seconds,
            None => continue,
        };
        if let Some(stamp) = DateTime::from_timestamp(seconds, 0) {
            record.insert(
                format!("{field}_ts"),
                Value::String(stamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            );
        }
    }

    if record.is_empty() {
        debug!("Dropping row with no usable fields");
        return None;
    }
    Some(record)
}
