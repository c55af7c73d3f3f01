//! Append-only audit trail: write helper used by every mutation, reads, and
//! flat-file export.

pub mod export;

use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

use crate::db::repository;
use crate::error::AppError;
use crate::models::enums::{AuditAction, DocumentStatus};
use crate::models::{AuditEntry, AuditFilter, Document};

/// Persist one entry. Failure is an `AuditWrite` error so the caller's
/// transaction is dropped (and rolled back) together with its mutation.
pub fn record(conn: &Connection, entry: &AuditEntry) -> Result<(), AppError> {
    repository::insert_audit_entry(conn, entry).map_err(|e| {
        tracing::error!(
            app_id = %entry.application_id,
            action = %entry.action,
            error = %e,
            "Audit entry write failed"
        );
        AppError::AuditWrite(e.to_string())
    })
}

/// Render a field value for the old/new columns: strings verbatim, everything
/// else as compact JSON. Null becomes absent.
pub fn value_to_audit_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Entry for a document moving `from` -> `to`. Uploads and audits get their
/// own action tags; every other edge is a plain status change.
pub fn document_transition_entry(
    document: &Document,
    actor_id: uuid::Uuid,
    from: DocumentStatus,
    to: DocumentStatus,
) -> AuditEntry {
    let action = match to {
        DocumentStatus::Uploaded => AuditAction::DocumentUploaded,
        DocumentStatus::Audited => AuditAction::DocumentAudited,
        _ => AuditAction::DocumentStatusChange,
    };
    let detail = serde_json::json!({
        "document_id": document.id,
        "doc_type": document.doc_type,
        "status": to,
    });
    AuditEntry::new(document.application_id, actor_id, action)
        .with_values(Some(from.as_str().to_string()), Some(detail.to_string()))
}

pub fn list_entries(conn: &Connection, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AppError> {
    Ok(repository::query_audit_entries(conn, filter)?)
}

/// Full trail of one application as CSV, oldest entry first.
pub fn export_application_csv(conn: &Connection, application_id: &Uuid) -> Result<String, AppError> {
    let entries = repository::list_audit_entries_chronological(conn, application_id)?;
    Ok(export::to_csv(&entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_application;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::DocumentType;
    use crate::models::Application;
    use serde_json::json;

    #[test]
    fn audit_strings() {
        assert_eq!(value_to_audit_string(&json!("Ames")).as_deref(), Some("Ames"));
        assert_eq!(value_to_audit_string(&json!(125000)).as_deref(), Some("125000"));
        assert_eq!(value_to_audit_string(&json!({"a": 1})).as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(value_to_audit_string(&Value::Null), None);
    }

    #[test]
    fn record_for_missing_application_is_audit_write_error() {
        let conn = open_memory_database().unwrap();
        let entry = AuditEntry::new(Uuid::new_v4(), Uuid::nil(), AuditAction::StatusChange);
        assert!(matches!(record(&conn, &entry), Err(AppError::AuditWrite(_))));
    }

    #[test]
    fn document_transition_actions() {
        let doc = Document::new(Uuid::new_v4(), DocumentType::LandDeed);
        let upload = document_transition_entry(&doc, Uuid::nil(), DocumentStatus::Pending, DocumentStatus::Uploaded);
        assert_eq!(upload.action, AuditAction::DocumentUploaded);
        assert_eq!(upload.old_value.as_deref(), Some("pending"));
        let detail: Value = serde_json::from_str(upload.new_value.as_deref().unwrap()).unwrap();
        assert_eq!(detail["status"], "uploaded");
        assert_eq!(detail["doc_type"], "land_deed");

        let audited = document_transition_entry(&doc, Uuid::nil(), DocumentStatus::Completed, DocumentStatus::Audited);
        assert_eq!(audited.action, AuditAction::DocumentAudited);
        let failed = document_transition_entry(&doc, Uuid::nil(), DocumentStatus::Processing, DocumentStatus::Failed);
        assert_eq!(failed.action, AuditAction::DocumentStatusChange);
    }

    #[test]
    fn export_contains_every_entry() {
        let conn = open_memory_database().unwrap();
        let app = Application::new(Uuid::new_v4());
        insert_application(&conn, &app).unwrap();
        for _ in 0..3 {
            record(&conn, &AuditEntry::new(app.id, Uuid::nil(), AuditAction::FieldUpdate)).unwrap();
        }
        let csv = export_application_csv(&conn, &app.id).unwrap();
        assert_eq!(export::from_csv(&csv).unwrap().len(), 3);
    }
}
