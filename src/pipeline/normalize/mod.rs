//! Extraction normalization: raw OCR output to a schema-shaped field map.
//!
//! Pre-structured engine output only gets its keys normalized. Otherwise the
//! per-type pattern extractor scans the free text and the table heuristics
//! fill in financial totals and list-valued fields. Schema mismatches never
//! abort; they are collected as `ValidationIssue`s next to the best-effort map.

pub mod keys;
pub mod patterns;
pub mod tables;
pub mod types;

pub use types::{ExtractionMethod, NormalizedExtraction, RawOcrOutput, RawTable, ValidationIssue};

use serde_json::{Map, Value};

use crate::models::enums::DocumentType;
use crate::models::value_is_populated;
use crate::registry::{schema_for, DocumentSchema, FieldKind};
use tables::Bucket;

pub fn normalize(doc_type: DocumentType, raw: &RawOcrOutput) -> NormalizedExtraction {
    let schema = schema_for(doc_type);
    let tables: Vec<Vec<Map<String, Value>>> = raw.tables.iter().map(tables::table_to_records).collect();
    let mut issues = Vec::new();

    let (method, fields) = match &raw.structured {
        Some(structured) => {
            let fields = match keys::normalize_keys(structured.clone()) {
                Value::Object(map) => map,
                other => {
                    issues.push(ValidationIssue::MalformedStructuredData {
                        detail: format!("expected an object, got {}", json_type_name(&other)),
                    });
                    Map::new()
                }
            };
            (ExtractionMethod::Structured, fields)
        }
        None => {
            let mut fields = patterns::extractor_for(doc_type)(&raw.text);
            apply_table_heuristics(schema, &raw.tables, &tables, &mut fields);
            (ExtractionMethod::PatternScan, fields)
        }
    };

    issues.extend(validate(schema, &fields));

    if !issues.is_empty() {
        tracing::debug!(
            doc_type = %doc_type,
            issue_count = issues.len(),
            "Extraction does not fully match schema"
        );
    }

    NormalizedExtraction {
        doc_type,
        method,
        fields,
        tables,
        validation_errors: issues,
        engine_confidence: raw.confidence,
    }
}

/// Validate a field map against its schema.
pub fn validate(schema: &DocumentSchema, fields: &Map<String, Value>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for spec in schema.fields {
        match fields.get(spec.name) {
            Some(value) if value_is_populated(value) => {
                if !spec.kind.accepts(value) {
                    issues.push(ValidationIssue::WrongKind {
                        field: spec.name.to_string(),
                        expected: spec.kind,
                    });
                }
            }
            _ if spec.required => issues.push(ValidationIssue::MissingRequired {
                field: spec.name.to_string(),
            }),
            _ => {}
        }
    }
    for key in fields.keys() {
        if schema.field(key).is_none() {
            issues.push(ValidationIssue::UnexpectedField { field: key.clone() });
        }
    }
    issues
}

fn apply_table_heuristics(
    schema: &DocumentSchema,
    raw_tables: &[RawTable],
    records: &[Vec<Map<String, Value>>],
    fields: &mut Map<String, Value>,
) {
    if schema.field("financial_summary").is_some() {
        let summary = tables::summarize_financial_tables(raw_tables);
        if !summary.is_empty() {
            let backfill = [
                ("gross_income", Bucket::Income),
                ("total_expenses", Bucket::Expense),
                ("total_assets", Bucket::Asset),
                ("total_liabilities", Bucket::Liability),
            ];
            for (field, bucket) in backfill {
                if schema.field(field).is_some() && !fields.contains_key(field) {
                    if let Some(total) = summary.total(bucket) {
                        fields.insert(field.into(), patterns::number_value(total));
                    }
                }
            }
            fields.insert("financial_summary".into(), summary.to_value());
        }
        derive_difference(schema, fields, "net_worth", "total_assets", "total_liabilities");
        derive_difference(schema, fields, "net_profit_loss", "gross_income", "total_expenses");
    }

    // List-valued schema fields take the first non-empty table verbatim.
    let first_table = records.iter().find(|t| !t.is_empty());
    for spec in schema.fields.iter().filter(|f| f.kind == FieldKind::Table) {
        if fields.contains_key(spec.name) {
            continue;
        }
        if let Some(rows) = first_table {
            fields.insert(
                spec.name.into(),
                Value::Array(rows.iter().cloned().map(Value::Object).collect()),
            );
        }
    }

    if schema.field("total_value").is_some() && !fields.contains_key("total_value") {
        if let Some(total) = sum_item_values(fields.get("equipment_items")) {
            fields.insert("total_value".into(), patterns::number_value(total));
        }
    }
}

fn derive_difference(schema: &DocumentSchema, fields: &mut Map<String, Value>, target: &str, minuend: &str, subtrahend: &str) {
    if schema.field(target).is_none() || fields.contains_key(target) {
        return;
    }
    let a = fields.get(minuend).and_then(Value::as_f64);
    let b = fields.get(subtrahend).and_then(Value::as_f64);
    if let (Some(a), Some(b)) = (a, b) {
        fields.insert(target.into(), patterns::number_value(a - b));
    }
}

fn sum_item_values(items: Option<&Value>) -> Option<f64> {
    let items = items?.as_array()?;
    let values: Vec<f64> = items
        .iter()
        .filter_map(|item| {
            ["value", "current_value", "market_value", "amount"]
                .iter()
                .find_map(|k| item.get(*k).and_then(Value::as_f64))
        })
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn structured_path_only_normalizes_keys() {
        let raw = RawOcrOutput {
            structured: Some(json!({
                "Tax Year": 2023,
                "Gross Income": 173000,
                "Total Expenses": 48000,
                "Net Profit": 125000
            })),
            text: "Gross income: 1".into(),
            ..Default::default()
        };
        let result = normalize(DocumentType::ScheduleF, &raw);
        assert_eq!(result.method, ExtractionMethod::Structured);
        assert_eq!(result.fields["net_profit_loss"], json!(125000));
        assert_eq!(result.fields["gross_income"], json!(173000));
        assert!(result.is_valid(), "{:?}", result.validation_errors);
    }

    #[test]
    fn every_type_valid_or_reports_issues() {
        for doc_type in DocumentType::all() {
            let result = normalize(*doc_type, &RawOcrOutput::default());
            assert!(!result.is_valid(), "{doc_type} validated an empty document");
            assert!(result
                .validation_errors
                .iter()
                .any(|i| matches!(i, ValidationIssue::MissingRequired { .. })));
        }
    }

    #[test]
    fn wrong_kind_reported_but_value_kept() {
        let raw = RawOcrOutput {
            structured: Some(json!({"total_assets": "lots", "as_of_date": "2024-01-01"})),
            ..Default::default()
        };
        let result = normalize(DocumentType::BalanceSheet, &raw);
        assert_eq!(result.fields["total_assets"], "lots");
        assert!(result.validation_errors.contains(&ValidationIssue::WrongKind {
            field: "total_assets".into(),
            expected: FieldKind::Currency,
        }));
    }

    #[test]
    fn unexpected_fields_listed() {
        let raw = RawOcrOutput {
            structured: Some(json!({"favorite_color": "green"})),
            ..Default::default()
        };
        let result = normalize(DocumentType::LandDeed, &raw);
        assert!(result.validation_errors.contains(&ValidationIssue::UnexpectedField {
            field: "favorite_color".into()
        }));
    }

    #[test]
    fn non_object_structured_payload_reported() {
        let raw = RawOcrOutput {
            structured: Some(json!([1, 2, 3])),
            ..Default::default()
        };
        let result = normalize(DocumentType::Form1040, &raw);
        assert!(result.fields.is_empty());
        assert!(matches!(
            result.validation_errors[0],
            ValidationIssue::MalformedStructuredData { .. }
        ));
    }

    #[test]
    fn balance_sheet_totals_backfilled_from_tables() {
        let raw = RawOcrOutput {
            text: "As of: 12/31/2023".into(),
            tables: vec![table(
                &["Account", "Balance"],
                &[
                    &["Cash", "$20,000"],
                    &["Machinery", "$180,000"],
                    &["Operating loan", "$50,000"],
                    &["Mortgage", "$70,000"],
                ],
            )],
            ..Default::default()
        };
        let result = normalize(DocumentType::BalanceSheet, &raw);
        assert_eq!(result.fields["as_of_date"], "2023-12-31");
        assert_eq!(result.fields["total_assets"], json!(200000));
        assert_eq!(result.fields["total_liabilities"], json!(120000));
        assert_eq!(result.fields["net_worth"], json!(80000));
        assert!(result.fields["financial_summary"].is_object());
        assert!(result.is_valid(), "{:?}", result.validation_errors);
        assert_eq!(result.tables.len(), 1);
    }

    #[test]
    fn equipment_items_from_first_table() {
        let raw = RawOcrOutput {
            text: "Owner: Jane Farmer".into(),
            tables: vec![table(
                &["Item", "Year", "Value"],
                &[&["Combine", "2019", "$350,000"], &["Planter", "2021", "$90,000"]],
            )],
            ..Default::default()
        };
        let result = normalize(DocumentType::EquipmentInventory, &raw);
        assert_eq!(result.fields["equipment_items"].as_array().unwrap().len(), 2);
        assert_eq!(result.fields["total_value"], json!(440000));
        assert!(result.is_valid(), "{:?}", result.validation_errors);
    }
}
