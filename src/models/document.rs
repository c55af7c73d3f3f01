use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentStatus, DocumentType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub application_id: Uuid,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub storage_ref: Option<String>,
    pub extracted_fields: Option<serde_json::Value>,
    pub overall_confidence: Option<f64>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(application_id: Uuid, doc_type: DocumentType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            application_id,
            doc_type,
            status: DocumentStatus::Pending,
            storage_ref: None,
            extracted_fields: None,
            overall_confidence: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
