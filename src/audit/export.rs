//! RFC 4180 CSV rendering of audit entries, and the matching parser.
//!
//! Absent values are written as empty unquoted cells and empty strings as
//! `""`, so a parse reproduces the exact entry sequence.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::enums::{AuditAction, Justification};
use crate::models::AuditEntry;

pub const HEADER: [&str; 9] = [
    "id",
    "application_id",
    "actor_id",
    "field_id",
    "action",
    "old_value",
    "new_value",
    "justification",
    "created_at",
];

#[derive(Error, Debug, PartialEq)]
pub enum CsvError {
    #[error("unterminated quoted cell")]
    UnterminatedQuote,

    #[error("unexpected character after closing quote on record {record}")]
    TrailingAfterQuote { record: usize },

    #[error("stray quote inside unquoted cell on record {record}")]
    StrayQuote { record: usize },

    #[error("header row does not match the audit export layout")]
    BadHeader,

    #[error("record {record} has {found} columns, expected {expected}")]
    ColumnCount { record: usize, expected: usize, found: usize },

    #[error("record {record}: invalid {column} value '{value}'")]
    InvalidValue { record: usize, column: &'static str, value: String },

    #[error("record {record}: {column} is required")]
    MissingValue { record: usize, column: &'static str },
}

// ═══════════════════════════════════════════
// Writing
// ═══════════════════════════════════════════

fn needs_quotes(s: &str) -> bool {
    s.is_empty() || s.contains([',', '"', '\r', '\n'])
}

fn write_cell(out: &mut String, value: Option<&str>) {
    match value {
        None => {}
        Some(s) if needs_quotes(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\"\""));
            out.push('"');
        }
        Some(s) => out.push_str(s),
    }
}

fn write_record(out: &mut String, cells: &[Option<&str>]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_cell(out, *cell);
    }
    out.push_str("\r\n");
}

pub fn to_csv(entries: &[AuditEntry]) -> String {
    let mut out = String::new();
    let header: Vec<Option<&str>> = HEADER.iter().map(|h| Some(*h)).collect();
    write_record(&mut out, &header);

    for entry in entries {
        let id = entry.id.to_string();
        let app = entry.application_id.to_string();
        let actor = entry.actor_id.to_string();
        let field = entry.field_id.map(|f| f.to_string());
        let created = entry.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        write_record(
            &mut out,
            &[
                Some(&id),
                Some(&app),
                Some(&actor),
                field.as_deref(),
                Some(entry.action.as_str()),
                entry.old_value.as_deref(),
                entry.new_value.as_deref(),
                entry.justification.map(|j| j.as_str()),
                Some(&created),
            ],
        );
    }
    out
}

// ═══════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════

/// Split CSV text into records of cells; `None` marks an empty unquoted cell.
pub fn parse_records(input: &str) -> Result<Vec<Vec<Option<String>>>, CsvError> {
    let mut records = Vec::new();
    let mut record: Vec<Option<String>> = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    let finish_cell = |cell: &mut String, quoted: &mut bool, record: &mut Vec<Option<String>>| {
        let value = if *quoted || !cell.is_empty() {
            Some(std::mem::take(cell))
        } else {
            None
        };
        record.push(value);
        *quoted = false;
    };

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cell.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
            continue;
        }

        match c {
            '"' if cell.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            '"' => return Err(CsvError::StrayQuote { record: records.len() }),
            ',' => finish_cell(&mut cell, &mut quoted, &mut record),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                finish_cell(&mut cell, &mut quoted, &mut record);
                records.push(std::mem::take(&mut record));
            }
            _ if quoted => return Err(CsvError::TrailingAfterQuote { record: records.len() }),
            _ => cell.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError::UnterminatedQuote);
    }
    if quoted || !cell.is_empty() || !record.is_empty() {
        finish_cell(&mut cell, &mut quoted, &mut record);
        records.push(record);
    }
    Ok(records)
}

pub fn from_csv(input: &str) -> Result<Vec<AuditEntry>, CsvError> {
    let records = parse_records(input)?;
    let mut iter = records.into_iter();

    let header = iter.next().ok_or(CsvError::BadHeader)?;
    let header_ok = header.len() == HEADER.len()
        && header
            .iter()
            .zip(HEADER.iter())
            .all(|(cell, expected)| cell.as_deref() == Some(*expected));
    if !header_ok {
        return Err(CsvError::BadHeader);
    }

    iter.enumerate()
        .map(|(i, cells)| entry_from_cells(i + 1, cells))
        .collect()
}

fn entry_from_cells(record: usize, cells: Vec<Option<String>>) -> Result<AuditEntry, CsvError> {
    if cells.len() != HEADER.len() {
        return Err(CsvError::ColumnCount {
            record,
            expected: HEADER.len(),
            found: cells.len(),
        });
    }
    let mut cells = cells.into_iter();
    let mut next = || cells.next().flatten();

    let required = |value: Option<String>, column: &'static str| {
        value.ok_or(CsvError::MissingValue { record, column })
    };
    let uuid = |value: String, column: &'static str| {
        Uuid::parse_str(&value).map_err(|_| CsvError::InvalidValue { record, column, value })
    };

    let id = uuid(required(next(), "id")?, "id")?;
    let application_id = uuid(required(next(), "application_id")?, "application_id")?;
    let actor_id = uuid(required(next(), "actor_id")?, "actor_id")?;
    let field_id = next().map(|v| uuid(v, "field_id")).transpose()?;
    let action_raw = required(next(), "action")?;
    let action: AuditAction = action_raw.parse().map_err(|_| CsvError::InvalidValue {
        record,
        column: "action",
        value: action_raw.clone(),
    })?;
    let old_value = next();
    let new_value = next();
    let justification = next()
        .map(|v| {
            v.parse::<Justification>().map_err(|_| CsvError::InvalidValue {
                record,
                column: "justification",
                value: v.clone(),
            })
        })
        .transpose()?;
    let created_raw = required(next(), "created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| CsvError::InvalidValue {
            record,
            column: "created_at",
            value: created_raw.clone(),
        })?;

    Ok(AuditEntry {
        id,
        application_id,
        actor_id,
        field_id,
        action,
        old_value,
        new_value,
        justification,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(action: AuditAction, old: Option<&str>, new: Option<&str>, j: Option<Justification>) -> AuditEntry {
        AuditEntry::new(Uuid::new_v4(), Uuid::new_v4(), action)
            .with_field(Uuid::new_v4())
            .with_values(old.map(String::from), new.map(String::from))
            .with_justification(j)
    }

    #[test]
    fn round_trip_preserves_awkward_text() {
        let entries = vec![
            entry(AuditAction::FieldUpdate, None, Some("125000"), None),
            entry(
                AuditAction::FieldOverride,
                Some("Smith, John"),
                Some("John \"Jack\" Smith"),
                Some(Justification::OcrCorrection),
            ),
            entry(AuditAction::FieldOverride, Some("line one\nline two"), Some(""), Some(Justification::Other)),
            entry(AuditAction::StatusChange, Some("draft"), Some("awaiting_documents"), None),
            entry(AuditAction::FieldOverride, Some("crlf\r\ninside"), Some(",,,"), None),
        ];
        let csv = to_csv(&entries);
        let parsed = from_csv(&csv).unwrap();
        assert_eq!(parsed, entries);

        let tuples = |es: &[AuditEntry]| {
            es.iter()
                .map(|e| (e.action, e.old_value.clone(), e.new_value.clone(), e.justification))
                .collect::<Vec<_>>()
        };
        assert_eq!(tuples(&parsed), tuples(&entries));
    }

    #[test]
    fn absent_and_empty_are_distinguished() {
        let e = entry(AuditAction::FieldUpdate, None, Some(""), None);
        let csv = to_csv(&[e]);
        let line = csv.lines().nth(1).unwrap();
        assert!(line.contains(",,\"\","), "{line}");
        let parsed = from_csv(&csv).unwrap();
        assert_eq!(parsed[0].old_value, None);
        assert_eq!(parsed[0].new_value.as_deref(), Some(""));
    }

    #[test]
    fn empty_trail_is_header_only() {
        let csv = to_csv(&[]);
        assert_eq!(csv, format!("{}\r\n", HEADER.join(",")));
        assert!(from_csv(&csv).unwrap().is_empty());
    }

    #[test]
    fn malformed_input_rejected() {
        assert_eq!(parse_records("\"open"), Err(CsvError::UnterminatedQuote));
        assert!(matches!(parse_records("a\"b"), Err(CsvError::StrayQuote { .. })));
        assert!(matches!(parse_records("\"a\"b"), Err(CsvError::TrailingAfterQuote { .. })));
        assert_eq!(from_csv("x,y\r\n"), Err(CsvError::BadHeader));
    }

    #[test]
    fn unknown_action_rejected() {
        let mut csv = to_csv(&[entry(AuditAction::FieldUpdate, None, None, None)]);
        csv = csv.replace("field_update", "field_destroy");
        assert!(matches!(
            from_csv(&csv),
            Err(CsvError::InvalidValue { column: "action", .. })
        ));
    }
}
