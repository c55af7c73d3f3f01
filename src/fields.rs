//! Human field operations: manual entry/correction, auditor verification and
//! review requests.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::applications::{ensure_auditor, load_for};
use crate::audit;
use crate::db::repository;
use crate::error::AppError;
use crate::models::enums::{AuditAction, FieldSource, Justification, ModuleId};
use crate::models::{Actor, AuditEntry, FieldWrite, ModuleCompletion, ModuleField};
use crate::pipeline::mapping::recompute_completion;
use crate::registry::MappingConfig;

#[derive(Debug, Clone, Serialize)]
pub struct FieldChange {
    pub field: ModuleField,
    pub previous_value: Option<Value>,
    pub completion: ModuleCompletion,
}

fn valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Enter or correct a value by hand. New rows become `proxy_entered`,
/// existing ones `proxy_edited`; both carry confidence 1.0.
#[allow(clippy::too_many_arguments)]
pub fn set_field_value(
    conn: &Connection,
    config: &MappingConfig,
    actor: &Actor,
    application_id: &Uuid,
    module: ModuleId,
    field_name: &str,
    value: Value,
    justification: Option<Justification>,
) -> Result<FieldChange, AppError> {
    let app = load_for(conn, actor, application_id)?;
    if !valid_field_name(field_name) {
        return Err(AppError::Validation(format!("invalid field name '{field_name}'")));
    }
    if !app.accepts_field_edits() {
        return Err(AppError::StateConflict(format!(
            "application {} is {} and no longer accepts field changes",
            app.id, app.status
        )));
    }

    let tx = conn.unchecked_transaction()?;
    let existing = repository::get_field(&tx, application_id, module, field_name)?;
    let source = if existing.is_some() {
        FieldSource::ProxyEdited
    } else {
        FieldSource::ProxyEntered
    };
    let field = repository::upsert_field(
        &tx,
        &FieldWrite {
            application_id: *application_id,
            module,
            field_name: field_name.to_string(),
            value: value.clone(),
            source,
            confidence: Some(1.0),
            document_id: None,
            required: existing.as_ref().is_some_and(|f| f.required),
        },
    )?;
    let entry = AuditEntry::new(*application_id, actor.id, AuditAction::FieldOverride)
        .with_field(field.id)
        .with_values(
            existing.as_ref().and_then(|f| audit::value_to_audit_string(&f.value)),
            audit::value_to_audit_string(&value),
        )
        .with_justification(justification);
    audit::record(&tx, &entry)?;
    let completion = recompute_completion(&tx, config, application_id, module)?;
    tx.commit()?;

    tracing::info!(app_id = %application_id, module = %module, field = %field_name, source = %source, "Field set manually");
    Ok(FieldChange {
        field,
        previous_value: existing.map(|f| f.value),
        completion,
    })
}

/// Auditor confirms a field's current value.
pub fn verify_field(
    conn: &Connection,
    actor: &Actor,
    field_id: &Uuid,
    justification: Option<Justification>,
) -> Result<ModuleField, AppError> {
    ensure_auditor(actor)?;
    let field = repository::get_field_by_id(conn, field_id)?
        .ok_or_else(|| AppError::NotFound(format!("ModuleField {field_id}")))?;
    let app = load_for(conn, actor, &field.application_id)?;
    if !app.accepts_field_edits() {
        return Err(AppError::StateConflict(format!(
            "application {} is {} and no longer accepts field changes",
            app.id, app.status
        )));
    }

    let tx = conn.unchecked_transaction()?;
    let verified = repository::upsert_field(
        &tx,
        &FieldWrite {
            application_id: field.application_id,
            module: field.module,
            field_name: field.field_name.clone(),
            value: field.value.clone(),
            source: FieldSource::AuditorVerified,
            confidence: field.confidence,
            document_id: field.document_id,
            required: field.required,
        },
    )?;
    let rendered = audit::value_to_audit_string(&field.value);
    let entry = AuditEntry::new(field.application_id, actor.id, AuditAction::FieldVerified)
        .with_field(field.id)
        .with_values(rendered.clone(), rendered)
        .with_justification(justification);
    audit::record(&tx, &entry)?;
    tx.commit()?;

    tracing::info!(field_id = %field.id, auditor = %actor.id, "Field verified");
    Ok(verified)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditRequest {
    pub reason: String,
    #[serde(default)]
    pub field_ids: Vec<Uuid>,
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
}

/// Flag fields and/or documents for human review. Writes one entry; it does
/// not count as a review itself.
pub fn request_audit(
    conn: &Connection,
    actor: &Actor,
    application_id: &Uuid,
    request: &AuditRequest,
) -> Result<AuditEntry, AppError> {
    load_for(conn, actor, application_id)?;
    if request.reason.trim().is_empty() {
        return Err(AppError::Validation("a reason is required".into()));
    }
    if request.field_ids.is_empty() && request.document_ids.is_empty() {
        return Err(AppError::Validation("nothing to flag".into()));
    }
    for id in &request.field_ids {
        match repository::get_field_by_id(conn, id)? {
            Some(f) if f.application_id == *application_id => {}
            _ => return Err(AppError::NotFound(format!("ModuleField {id}"))),
        }
    }
    for id in &request.document_ids {
        match repository::get_document(conn, id)? {
            Some(d) if d.application_id == *application_id => {}
            _ => return Err(AppError::NotFound(format!("Document {id}"))),
        }
    }

    let detail = serde_json::json!({
        "reason": request.reason.trim(),
        "field_ids": request.field_ids,
        "document_ids": request.document_ids,
    });
    let mut entry = AuditEntry::new(*application_id, actor.id, AuditAction::AuditRequested)
        .with_values(None, Some(detail.to_string()));
    if let [single] = request.field_ids.as_slice() {
        entry = entry.with_field(*single);
    }
    audit::record(conn, &entry)?;

    tracing::info!(
        app_id = %application_id,
        fields = request.field_ids.len(),
        documents = request.document_ids.len(),
        "Audit requested"
    );
    Ok(entry)
}

pub fn list_fields(conn: &Connection, actor: &Actor, application_id: &Uuid) -> Result<Vec<ModuleField>, AppError> {
    load_for(conn, actor, application_id)?;
    Ok(repository::list_fields(conn, application_id)?)
}
