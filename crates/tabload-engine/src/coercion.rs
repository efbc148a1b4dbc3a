//! Type coercion pipeline
//!
//! Turns a [`RawTable`] into a typed [`Dataset`] for one registry table:
//!
//! 1. the source must have exactly as many columns as the table; cells are
//!    mapped onto the table's columns by position, never by header text
//! 2. every cell is trimmed and null tokens become null
//! 3. the table's per-column rules are applied; a value that does not parse
//!    becomes null instead of failing the load
//! 4. rows that ended up null in every column are dropped

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::dataset::{CellValue, Dataset, RawTable, Row};
use crate::error::{EngineError, Result};
use crate::registry::{ColumnRule, TableSchema};

/// Literal cell contents that mean "no value"
pub const NULL_TOKENS: [&str; 8] = ["", "nan", "NaN", "None", "NULL", "null", "NaT", "<NA>"];

pub const DATE_FORMATS: [&str; 6] = [
    "%d/%m/%Y",
    "%d/%m/%y",
    "%Y-%m-%d",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

pub const TIME_FORMATS: [&str; 5] = ["%H:%M:%S", "%H:%M", "%H.%M.%S", "%H.%M", "%H%M%S"];

pub const TIMESTAMP_FORMATS: [&str; 7] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y",
    "%d/%m/%y",
    "%Y-%m-%d",
];

/// Trim a raw cell and map null tokens to `None`
pub fn normalize_cell(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if NULL_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed)
    }
}

/// NFKD-decompose and keep only ASCII, so "Estação" becomes "Estacao"
pub fn fold_ascii(value: &str) -> String {
    value.nfkd().filter(char::is_ascii).collect()
}

fn has_time_part(format: &str) -> bool {
    format.contains("%H")
}

fn has_date_part(format: &str) -> bool {
    format.contains("%d") || format.contains("%Y") || format.contains("%y")
}

// chrono's %Y happily reads "25" as year 25; a four-digit year is required
fn plausible(date: NaiveDate, format: &str) -> bool {
    !format.contains("%Y") || date.year() >= 1000
}

fn formats_or<'f>(custom: Option<&'f [String]>, defaults: &'f [&'f str]) -> Vec<&'f str> {
    match custom {
        Some(list) => list.iter().map(String::as_str).collect(),
        None => defaults.to_vec(),
    }
}

fn parse_with<T>(
    value: &str,
    formats: &[&str],
    mut parse: impl FnMut(&str, &str) -> Option<T>,
) -> Option<T> {
    formats.iter().find_map(|format| parse(value, format))
}

pub fn parse_integer(value: &str) -> Option<i64> {
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    // Nullable-int semantics: "12.0" is 12, "12.5" is not an integer
    let v = value.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

pub fn parse_decimal(value: &str) -> Option<f64> {
    let v = value.replace(',', ".").parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

pub fn parse_date(value: &str, formats: &[&str]) -> Option<NaiveDate> {
    parse_with(value, formats, |value, format| {
        let date = if has_time_part(format) {
            NaiveDateTime::parse_from_str(value, format).ok()?.date()
        } else {
            NaiveDate::parse_from_str(value, format).ok()?
        };
        plausible(date, format).then_some(date)
    })
}

pub fn parse_time(value: &str, formats: &[&str]) -> Option<NaiveTime> {
    parse_with(value, formats, |value, format| {
        if has_date_part(format) {
            NaiveDateTime::parse_from_str(value, format)
                .ok()
                .map(|ts| ts.time())
        } else {
            NaiveTime::parse_from_str(value, format).ok()
        }
    })
    .or_else(|| {
        // a full timestamp in a time column keeps its time of day
        parse_with(value, &TIMESTAMP_FORMATS[..4], |value, format| {
            NaiveDateTime::parse_from_str(value, format)
                .ok()
                .map(|ts| ts.time())
        })
    })
}

pub fn parse_timestamp(value: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    parse_with(value, formats, |value, format| {
        let ts = if has_time_part(format) {
            NaiveDateTime::parse_from_str(value, format).ok()?
        } else {
            NaiveDate::parse_from_str(value, format)
                .ok()?
                .and_time(NaiveTime::MIN)
        };
        plausible(ts.date(), format).then_some(ts)
    })
}

impl ColumnRule {
    /// Convert an already-normalized cell. Never fails: unparseable input is null.
    pub fn apply(self, value: Option<&str>, formats: Option<&[String]>) -> CellValue {
        let Some(value) = value else {
            return CellValue::Null;
        };

        let coerced = match self {
            ColumnRule::Text => Some(CellValue::text(value)),
            ColumnRule::AsciiText => Some(CellValue::text(fold_ascii(value))),
            ColumnRule::Integer => parse_integer(value).map(CellValue::Integer),
            ColumnRule::Decimal => parse_decimal(value).map(CellValue::Decimal),
            ColumnRule::Date => {
                parse_date(value, &formats_or(formats, &DATE_FORMATS)).map(CellValue::Date)
            }
            ColumnRule::Time => {
                parse_time(value, &formats_or(formats, &TIME_FORMATS)).map(CellValue::Time)
            }
            ColumnRule::Timestamp => {
                let formats = formats_or(formats, &TIMESTAMP_FORMATS);
                parse_timestamp(value, &formats).map(CellValue::Timestamp)
            }
        };
        coerced.unwrap_or(CellValue::Null)
    }
}

/// Coercion result with counters for the run log
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionReport {
    pub dataset: Dataset,
    /// Non-null cells that failed their rule and became null
    pub nulled_cells: usize,
    /// Rows dropped for being null in every column
    pub dropped_rows: usize,
}

/// Applies one table's rules to a raw source table
pub struct CoercionPipeline<'a> {
    table: &'a str,
    schema: &'a TableSchema,
}

impl<'a> CoercionPipeline<'a> {
    pub fn new(table: &'a str, schema: &'a TableSchema) -> Self {
        Self { table, schema }
    }

    pub fn run(&self, raw: &RawTable) -> Result<CoercionReport> {
        let schema = self.schema;
        if raw.width() != schema.width() {
            return Err(EngineError::SchemaMismatch {
                table: self.table.to_string(),
                source_columns: raw.width(),
                schema_columns: schema.width(),
            });
        }
        let unknown = schema.unknown_rule_columns();
        if !unknown.is_empty() {
            return Err(EngineError::Coercion {
                table: self.table.to_string(),
                reason: format!("rules name unknown columns: {}", unknown.join(", ")),
            });
        }

        let columns = schema.columns.clone();
        let plan: Vec<(ColumnRule, Option<&[String]>)> = columns
            .iter()
            .map(|column| (schema.rule_for(column), schema.formats_for(column)))
            .collect();

        let mut nulled_cells = 0;
        let mut dropped_rows = 0;
        let mut rows: Vec<Row> = Vec::with_capacity(raw.len());

        for raw_row in &raw.rows {
            let row: Row = raw_row
                .iter()
                .zip(plan.iter())
                .map(|(cell, (rule, formats))| {
                    let normalized = normalize_cell(cell);
                    let value = rule.apply(normalized, *formats);
                    if normalized.is_some() && value.is_null() {
                        nulled_cells += 1;
                    }
                    value
                })
                .collect();

            if row.iter().all(CellValue::is_null) {
                dropped_rows += 1;
                continue;
            }
            rows.push(row);
        }

        debug!(
            table = self.table,
            rows = rows.len(),
            nulled_cells,
            dropped_rows,
            "Coercion finished"
        );

        Ok(CoercionReport {
            dataset: Dataset::new(columns, rows),
            nulled_cells,
            dropped_rows,
        })
    }
}
