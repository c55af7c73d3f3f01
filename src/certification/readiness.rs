//! Certification readiness: documents audited, required fields populated,
//! low-confidence fields reviewed. Every failing item becomes one blocker.

use std::collections::BTreeSet;

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository;
use crate::error::AppError;
use crate::models::enums::{DocumentStatus, ModuleId};
use crate::models::ModuleField;
use crate::pipeline::mapping::declared_required_for_application;
use crate::registry::MappingConfig;

/// Fields scored below this need a human review entry before certification.
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerType {
    Document,
    Field,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Blocker {
    pub blocker_type: BlockerType,
    /// Document or field id; absent when the row does not exist yet.
    pub id: Option<Uuid>,
    /// `M3.net_worth` for fields, the document type for documents.
    pub target: Option<String>,
    pub issue: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadinessCounts {
    pub documents_total: u32,
    pub documents_audited: u32,
    pub required_fields_total: u32,
    pub required_fields_populated: u32,
    pub low_confidence_fields: u32,
    pub low_confidence_reviewed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessReport {
    pub application_id: Uuid,
    pub is_valid: bool,
    pub counts: ReadinessCounts,
    pub blockers: Vec<Blocker>,
}

/// Whether a field must carry a review entry. Automated values without a
/// score are treated as unreviewed low-confidence values.
pub fn needs_review(field: &ModuleField) -> bool {
    match field.confidence {
        Some(c) => c < REVIEW_CONFIDENCE_THRESHOLD,
        None => !field.source.is_human(),
    }
}

fn target_name(module: ModuleId, field: &str) -> String {
    format!("{}.{field}", module.as_str().to_ascii_uppercase())
}

pub fn check_readiness(
    conn: &Connection,
    config: &MappingConfig,
    application_id: &Uuid,
) -> Result<ReadinessReport, AppError> {
    repository::require_application(conn, application_id)?;

    let documents = repository::list_documents_for_application(conn, application_id)?;
    let fields = repository::list_fields(conn, application_id)?;
    let reviewed = repository::reviewed_field_ids(conn, application_id)?;
    let declared = declared_required_for_application(conn, config, application_id)?;

    let mut counts = ReadinessCounts::default();
    let mut blockers = Vec::new();

    // (a) documents
    counts.documents_total = documents.len() as u32;
    if documents.is_empty() {
        blockers.push(Blocker {
            blocker_type: BlockerType::Document,
            id: None,
            target: None,
            issue: "no documents have been submitted".into(),
        });
    }
    for doc in &documents {
        if doc.status == DocumentStatus::Audited {
            counts.documents_audited += 1;
        } else {
            blockers.push(Blocker {
                blocker_type: BlockerType::Document,
                id: Some(doc.id),
                target: Some(doc.doc_type.to_string()),
                issue: format!("document is {}, not audited", doc.status),
            });
        }
    }

    // (b) required fields: flagged rows plus declared targets with no row
    let mut required_names: BTreeSet<(ModuleId, &str)> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| (f.module, f.field_name.as_str()))
        .collect();
    required_names.extend(declared.iter().map(|t| (t.module, t.field.as_str())));
    counts.required_fields_total = required_names.len() as u32;

    for (module, name) in &required_names {
        let row = fields
            .iter()
            .find(|f| f.module == *module && f.field_name == *name);
        match row {
            Some(f) if f.is_populated() => counts.required_fields_populated += 1,
            Some(f) => blockers.push(Blocker {
                blocker_type: BlockerType::Field,
                id: Some(f.id),
                target: Some(target_name(*module, name)),
                issue: "required field is empty".into(),
            }),
            None => blockers.push(Blocker {
                blocker_type: BlockerType::Field,
                id: None,
                target: Some(target_name(*module, name)),
                issue: "required field has no value".into(),
            }),
        }
    }

    // (c) low-confidence fields need a review entry
    for field in fields.iter().filter(|f| needs_review(f)) {
        counts.low_confidence_fields += 1;
        if reviewed.contains(&field.id) {
            counts.low_confidence_reviewed += 1;
            continue;
        }
        let issue = match field.confidence {
            Some(c) => format!("low-confidence value ({c:.2}) has not been reviewed"),
            None => "unscored automated value has not been reviewed".into(),
        };
        blockers.push(Blocker {
            blocker_type: BlockerType::Field,
            id: Some(field.id),
            target: Some(target_name(field.module, &field.field_name)),
            issue,
        });
    }

    tracing::debug!(
        app_id = %application_id,
        blockers = blockers.len(),
        "Readiness evaluated"
    );

    Ok(ReadinessReport {
        application_id: *application_id,
        is_valid: blockers.is_empty(),
        counts,
        blockers,
    })
}
