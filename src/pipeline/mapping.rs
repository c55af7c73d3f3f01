//! Field mapping and conflict resolution.
//!
//! Writes extracted values into module fields according to the mapping
//! configuration. Each field upsert and its audit entry commit together;
//! a failure on one field leaves earlier fields committed.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::transform;
use crate::audit;
use crate::db::repository;
use crate::error::AppError;
use crate::models::enums::{AuditAction, DocumentType, ModuleId};
use crate::models::{Actor, AuditEntry, FieldWrite, ModuleCompletion, ModuleField};
use crate::registry::{ConflictStrategy, FieldTarget, MappingConfig, Registry};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SkipReason {
    HumanSourced,
    LowerConfidence,
    ManualReview,
    Unchanged,
    SourceMissing,
    TransformFailed { detail: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::HumanSourced => f.write_str("existing value has higher trust"),
            SkipReason::LowerConfidence => f.write_str("existing value has equal or higher confidence"),
            SkipReason::ManualReview => f.write_str("conflict requires manual review"),
            SkipReason::Unchanged => f.write_str("value unchanged"),
            SkipReason::SourceMissing => f.write_str("no extracted value"),
            SkipReason::TransformFailed { detail } => write!(f, "transform failed: {detail}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Write,
    Skip,
}

/// Decide whether an automated value may replace `existing`.
///
/// Human-sourced values are never replaced, whatever the strategy.
pub fn resolve_conflict(
    existing: Option<&ModuleField>,
    new_value: &Value,
    new_confidence: Option<f64>,
    strategy: ConflictStrategy,
) -> Result<Resolution, SkipReason> {
    let Some(existing) = existing else {
        return Ok(Resolution::Write);
    };
    if existing.source.is_human() {
        return Err(SkipReason::HumanSourced);
    }
    let higher = match (new_confidence, existing.confidence) {
        (Some(new), Some(old)) => new > old,
        (_, None) => true,
        (None, Some(_)) => false,
    };
    if existing.value == *new_value && !higher {
        return Err(SkipReason::Unchanged);
    }
    match strategy {
        ConflictStrategy::HighestConfidence if higher => Ok(Resolution::Write),
        ConflictStrategy::HighestConfidence => Err(SkipReason::LowerConfidence),
        ConflictStrategy::MostRecent => Ok(Resolution::Write),
        ConflictStrategy::ManualReview => Err(SkipReason::ManualReview),
    }
}

/// Outcome for one module-field target.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDecision {
    pub module: ModuleId,
    pub field_name: String,
    pub source_path: String,
    pub applied: bool,
    pub skip_reason: Option<SkipReason>,
    pub field_id: Option<Uuid>,
    pub previous_value: Option<Value>,
    pub previous_confidence: Option<f64>,
    pub new_value: Option<Value>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MappingOutcome {
    pub decisions: Vec<FieldDecision>,
    pub completions: Vec<ModuleCompletion>,
}

impl MappingOutcome {
    pub fn applied(&self) -> impl Iterator<Item = &FieldDecision> {
        self.decisions.iter().filter(|d| d.applied)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &FieldDecision> {
        self.decisions.iter().filter(|d| !d.applied)
    }
}

/// One document's worth of values to map.
pub struct MappingRequest<'a> {
    pub application_id: Uuid,
    pub document_id: Option<Uuid>,
    pub doc_type: DocumentType,
    pub fields: &'a Map<String, Value>,
    /// Scores keyed by dotted path; a missing path falls back to its root field.
    pub scores: &'a BTreeMap<String, f64>,
    /// Restrict mapping to these top-level fields (the auto-accepted set).
    pub only_fields: Option<&'a HashSet<String>>,
}

pub struct FieldMapper {
    registry: Arc<Registry>,
}

impl FieldMapper {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.registry.mapping
    }

    pub fn map_document(
        &self,
        conn: &Connection,
        actor: &Actor,
        request: &MappingRequest<'_>,
    ) -> Result<MappingOutcome, AppError> {
        let app = repository::require_application(conn, &request.application_id)?;
        if !app.accepts_field_edits() {
            return Err(AppError::StateConflict(format!(
                "application {} is {} and no longer accepts field changes",
                app.id, app.status
            )));
        }

        let Some(mapping) = self.config().for_document(request.doc_type) else {
            tracing::warn!(doc_type = %request.doc_type, "No field mapping configured");
            return Ok(MappingOutcome::default());
        };

        let span = tracing::info_span!(
            "map_document",
            app_id = %request.application_id,
            doc_type = %request.doc_type
        );
        let _enter = span.enter();

        let mut outcome = MappingOutcome::default();
        let mut touched: BTreeSet<ModuleId> = BTreeSet::new();

        for field in &mapping.fields {
            if let Some(only) = request.only_fields {
                if !only.contains(field.root_field()) {
                    continue;
                }
            }

            let raw = lookup_path(request.fields, &field.source_path).filter(|v| !v.is_null());
            let confidence = score_for(request.scores, &field.source_path);

            let converted = match (raw, field.transform) {
                (None, _) => Err(SkipReason::SourceMissing),
                (Some(v), Some(kind)) => transform::apply(kind, v).map_err(|e| {
                    tracing::warn!(source = %field.source_path, error = %e, "Transform failed, skipping field");
                    SkipReason::TransformFailed { detail: e.to_string() }
                }),
                (Some(v), None) => Ok(v.clone()),
            };

            for target in &field.targets {
                let decision = match &converted {
                    Ok(value) => {
                        touched.insert(target.module);
                        self.write_target(
                            conn,
                            actor,
                            request,
                            target,
                            &field.source_path,
                            value,
                            confidence,
                            field.required,
                            mapping.conflict_strategy,
                        )?
                    }
                    Err(reason) => FieldDecision {
                        module: target.module,
                        field_name: target.field.clone(),
                        source_path: field.source_path.clone(),
                        applied: false,
                        skip_reason: Some(reason.clone()),
                        field_id: None,
                        previous_value: None,
                        previous_confidence: None,
                        new_value: None,
                        confidence,
                    },
                };
                outcome.decisions.push(decision);
            }
        }

        for module in touched {
            outcome
                .completions
                .push(recompute_completion(conn, self.config(), &request.application_id, module)?);
        }

        tracing::info!(
            applied = outcome.applied().count(),
            skipped = outcome.skipped().count(),
            "Field mapping complete"
        );
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_target(
        &self,
        conn: &Connection,
        actor: &Actor,
        request: &MappingRequest<'_>,
        target: &FieldTarget,
        source_path: &str,
        value: &Value,
        confidence: Option<f64>,
        required: bool,
        strategy: ConflictStrategy,
    ) -> Result<FieldDecision, AppError> {
        let tx = conn.unchecked_transaction()?;
        let existing = repository::get_field(&tx, &request.application_id, target.module, &target.field)?;

        let mut decision = FieldDecision {
            module: target.module,
            field_name: target.field.clone(),
            source_path: source_path.to_string(),
            applied: false,
            skip_reason: None,
            field_id: existing.as_ref().map(|f| f.id),
            previous_value: existing.as_ref().map(|f| f.value.clone()),
            previous_confidence: existing.as_ref().and_then(|f| f.confidence),
            new_value: Some(value.clone()),
            confidence,
        };

        if let Err(reason) = resolve_conflict(existing.as_ref(), value, confidence, strategy) {
            tracing::debug!(module = %target.module, field = %target.field, %reason, "Field write skipped");
            decision.skip_reason = Some(reason);
            return Ok(decision);
        }

        let written = repository::upsert_field(
            &tx,
            &FieldWrite {
                application_id: request.application_id,
                module: target.module,
                field_name: target.field.clone(),
                value: value.clone(),
                source: crate::models::enums::FieldSource::AiExtracted,
                confidence,
                document_id: request.document_id,
                required,
            },
        )?;

        let entry = AuditEntry::new(request.application_id, actor.id, AuditAction::FieldUpdate)
            .with_field(written.id)
            .with_values(
                existing.as_ref().and_then(|f| audit::value_to_audit_string(&f.value)),
                audit::value_to_audit_string(value),
            );
        audit::record(&tx, &entry)?;
        tx.commit()?;

        decision.applied = true;
        decision.field_id = Some(written.id);
        Ok(decision)
    }
}

/// Resolve a dotted path (`address.city`, `items.0.value`) inside a field map.
pub fn lookup_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn score_for(scores: &BTreeMap<String, f64>, path: &str) -> Option<f64> {
    scores
        .get(path)
        .or_else(|| path.split('.').next().and_then(|root| scores.get(root)))
        .copied()
}

/// Module fields declared required by the mappings of the document types
/// present on the application.
pub fn declared_required_for_application(
    conn: &Connection,
    config: &MappingConfig,
    application_id: &Uuid,
) -> Result<HashSet<FieldTarget>, AppError> {
    let doc_types: BTreeSet<DocumentType> = repository::list_documents_for_application(conn, application_id)?
        .into_iter()
        .map(|d| d.doc_type)
        .collect();
    Ok(config.declared_required(doc_types).into_iter().cloned().collect())
}

/// Recount a module's completion and persist it.
///
/// The percentage is required-filled / required-total. A module with no
/// required fields is complete once anything is filled.
pub fn recompute_completion(
    conn: &Connection,
    config: &MappingConfig,
    application_id: &Uuid,
    module: ModuleId,
) -> Result<ModuleCompletion, AppError> {
    let rows = repository::list_module_fields(conn, application_id, module)?;
    let declared: BTreeSet<String> = declared_required_for_application(conn, config, application_id)?
        .into_iter()
        .filter(|t| t.module == module)
        .map(|t| t.field)
        .collect();

    let populated: BTreeSet<&str> = rows
        .iter()
        .filter(|f| f.is_populated())
        .map(|f| f.field_name.as_str())
        .collect();
    let mut required: BTreeSet<&str> = rows
        .iter()
        .filter(|f| f.required)
        .map(|f| f.field_name.as_str())
        .collect();
    required.extend(declared.iter().map(String::as_str));
    let mut all: BTreeSet<&str> = rows.iter().map(|f| f.field_name.as_str()).collect();
    all.extend(declared.iter().map(String::as_str));

    let filled = populated.len() as u32;
    let required_total = required.len() as u32;
    let required_filled = required.iter().filter(|n| populated.contains(*n)).count() as u32;
    let percentage = if required_total > 0 {
        f64::from(required_filled) / f64::from(required_total) * 100.0
    } else if filled > 0 {
        100.0
    } else {
        0.0
    };

    let completion = ModuleCompletion {
        application_id: *application_id,
        module,
        filled,
        total: all.len() as u32,
        required_filled,
        required_total,
        percentage,
    };
    repository::save_module_completion(conn, &completion)?;
    Ok(completion)
}
