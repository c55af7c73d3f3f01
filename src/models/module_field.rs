use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{FieldSource, ModuleId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleField {
    pub id: Uuid,
    pub application_id: Uuid,
    pub module: ModuleId,
    pub field_name: String,
    pub value: serde_json::Value,
    pub source: FieldSource,
    pub confidence: Option<f64>,
    pub document_id: Option<Uuid>,
    pub required: bool,
    pub updated_at: DateTime<Utc>,
}

impl ModuleField {
    /// Non-null and, for strings, non-blank.
    pub fn is_populated(&self) -> bool {
        value_is_populated(&self.value)
    }
}

/// Shared emptiness rule for field values: null, blank strings and empty
/// containers count as unpopulated.
pub fn value_is_populated(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// Values written into a module field by an upsert.
#[derive(Debug, Clone)]
pub struct FieldWrite {
    pub application_id: Uuid,
    pub module: ModuleId,
    pub field_name: String,
    pub value: serde_json::Value,
    pub source: FieldSource,
    pub confidence: Option<f64>,
    pub document_id: Option<Uuid>,
    pub required: bool,
}

/// Persisted completion statistics for one module of one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCompletion {
    pub application_id: Uuid,
    pub module: ModuleId,
    pub filled: u32,
    pub total: u32,
    pub required_filled: u32,
    pub required_total: u32,
    pub percentage: f64,
}
