use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AuditAction, Justification};

/// One immutable row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub application_id: Uuid,
    pub actor_id: Uuid,
    pub field_id: Option<Uuid>,
    pub action: AuditAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub justification: Option<Justification>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(application_id: Uuid, actor_id: Uuid, action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            actor_id,
            field_id: None,
            action,
            old_value: None,
            new_value: None,
            justification: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, field_id: Uuid) -> Self {
        self.field_id = Some(field_id);
        self
    }

    pub fn with_values(mut self, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn with_justification(mut self, justification: Option<Justification>) -> Self {
        self.justification = justification;
        self
    }
}

/// Read filter for the audit trail. Results are newest-first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub application_id: Option<Uuid>,
    pub field_id: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
