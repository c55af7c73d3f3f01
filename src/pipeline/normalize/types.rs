use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::enums::DocumentType;
use crate::registry::FieldKind;

/// Table as returned by the layout engine: one header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

/// Result payload of a completed OCR job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOcrOutput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tables: Vec<RawTable>,
    /// Key/value data the engine already structured, if any.
    #[serde(default)]
    pub structured: Option<Value>,
    /// Engine-reported document confidence in [0, 1].
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    MissingRequired { field: String },
    WrongKind { field: String, expected: FieldKind },
    UnexpectedField { field: String },
    MalformedStructuredData { detail: String },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::MissingRequired { field } => write!(f, "missing required field '{field}'"),
            ValidationIssue::WrongKind { field, expected } => {
                write!(f, "field '{field}' is not a valid {expected:?}")
            }
            ValidationIssue::UnexpectedField { field } => write!(f, "unexpected field '{field}'"),
            ValidationIssue::MalformedStructuredData { detail } => {
                write!(f, "structured data unusable: {detail}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Engine supplied key/value data; only keys were normalized.
    Structured,
    /// Labeled-value scan of the free text plus table heuristics.
    PatternScan,
}

/// Schema-shaped view of one document's OCR output.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedExtraction {
    pub doc_type: DocumentType,
    pub method: ExtractionMethod,
    pub fields: Map<String, Value>,
    /// Every input table as row-keyed records.
    pub tables: Vec<Vec<Map<String, Value>>>,
    pub validation_errors: Vec<ValidationIssue>,
    pub engine_confidence: Option<f64>,
}

impl NormalizedExtraction {
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    /// Field map serialized for storage on the document row.
    pub fn payload(&self) -> Value {
        serde_json::json!({
            "fields": self.fields,
            "tables": self.tables,
            "validation_errors": self.validation_errors,
            "method": self.method,
        })
    }
}
