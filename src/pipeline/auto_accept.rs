//! Auto-accept decisioning: promote high-confidence extracted values without
//! human review, flag the rest.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::mapping::{FieldMapper, MappingOutcome, MappingRequest};
use crate::audit;
use crate::error::AppError;
use crate::models::enums::{AuditAction, DocumentType};
use crate::models::{Actor, AuditEntry};
use crate::registry::AutoAcceptSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Accepted,
    Flagged,
}

/// Record of one field's classification.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptDecision {
    pub field_name: String,
    pub value: Value,
    pub confidence: Option<f64>,
    pub threshold: f64,
    pub outcome: DecisionOutcome,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

/// Classify every top-level field. Pure; nothing is written.
pub fn classify(
    settings: &AutoAcceptSettings,
    fields: &Map<String, Value>,
    confidences: &BTreeMap<String, f64>,
) -> Vec<AcceptDecision> {
    let now = Utc::now();
    fields
        .iter()
        .map(|(name, value)| {
            let threshold = settings.threshold_for(name);
            let confidence = confidences.get(name).copied();
            let (outcome, reason) = if !settings.enabled {
                (DecisionOutcome::Flagged, "auto-accept disabled".to_string())
            } else {
                match confidence {
                    None => (DecisionOutcome::Flagged, "no confidence score".to_string()),
                    Some(c) if c >= threshold => (
                        DecisionOutcome::Accepted,
                        format!("confidence {c:.2} meets threshold {threshold:.2}"),
                    ),
                    Some(c) => (
                        DecisionOutcome::Flagged,
                        format!("confidence {c:.2} below threshold {threshold:.2}"),
                    ),
                }
            };
            AcceptDecision {
                field_name: name.clone(),
                value: value.clone(),
                confidence,
                threshold,
                outcome,
                reason,
                decided_at: now,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoAcceptResult {
    pub decisions: Vec<AcceptDecision>,
    pub mapping: MappingOutcome,
}

impl AutoAcceptResult {
    pub fn accepted(&self) -> impl Iterator<Item = &AcceptDecision> {
        self.decisions.iter().filter(|d| d.outcome == DecisionOutcome::Accepted)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &AcceptDecision> {
        self.decisions.iter().filter(|d| d.outcome == DecisionOutcome::Flagged)
    }
}

pub struct AutoAcceptInput<'a> {
    pub application_id: Uuid,
    pub document_id: Uuid,
    pub doc_type: DocumentType,
    pub fields: &'a Map<String, Value>,
    /// Top-level field confidences used for classification.
    pub confidences: &'a BTreeMap<String, f64>,
    /// Path-level scores handed to the mapper; usually a superset of `confidences`.
    pub scores: &'a BTreeMap<String, f64>,
}

/// Classify, write accepted fields through the mapper, and persist the
/// decision batch as a single audit entry.
pub fn run_auto_accept(
    conn: &Connection,
    mapper: &FieldMapper,
    actor: &Actor,
    input: &AutoAcceptInput<'_>,
) -> Result<AutoAcceptResult, AppError> {
    let settings = &mapper.config().auto_accept;
    let decisions = classify(settings, input.fields, input.confidences);

    let accepted: HashSet<String> = decisions
        .iter()
        .filter(|d| d.outcome == DecisionOutcome::Accepted)
        .map(|d| d.field_name.clone())
        .collect();

    let mapping = if accepted.is_empty() {
        MappingOutcome::default()
    } else {
        mapper.map_document(
            conn,
            actor,
            &MappingRequest {
                application_id: input.application_id,
                document_id: Some(input.document_id),
                doc_type: input.doc_type,
                fields: input.fields,
                scores: input.scores,
                only_fields: Some(&accepted),
            },
        )?
    };

    let batch = serde_json::json!({
        "document_id": input.document_id,
        "doc_type": input.doc_type,
        "decisions": decisions,
    });
    let entry = AuditEntry::new(input.application_id, actor.id, AuditAction::AutoAcceptBatch)
        .with_values(None, Some(batch.to_string()));
    audit::record(conn, &entry)?;

    tracing::info!(
        doc_id = %input.document_id,
        accepted = accepted.len(),
        flagged = decisions.len() - accepted.len(),
        "Auto-accept decisions recorded"
    );

    Ok(AutoAcceptResult { decisions, mapping })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::repository::{self, insert_application, insert_document};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::ModuleId;
    use crate::models::{Application, AuditFilter, Document};
    use crate::registry::Registry;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        serde_json::from_value(v).unwrap()
    }

    fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn threshold_is_inclusive() {
        let decisions = classify(
            &AutoAcceptSettings::default(),
            &fields(json!({"a": 1, "b": 2})),
            &scores(&[("a", 0.90), ("b", 0.8999)]),
        );
        assert_eq!(decisions[0].outcome, DecisionOutcome::Accepted);
        assert_eq!(decisions[1].outcome, DecisionOutcome::Flagged);
    }

    #[test]
    fn disabled_flags_everything() {
        let settings = AutoAcceptSettings {
            enabled: false,
            ..Default::default()
        };
        let decisions = classify(&settings, &fields(json!({"a": 1})), &scores(&[("a", 1.0)]));
        assert_eq!(decisions[0].outcome, DecisionOutcome::Flagged);
        assert_eq!(decisions[0].reason, "auto-accept disabled");
    }

    #[test]
    fn missing_score_is_flagged() {
        let decisions = classify(&AutoAcceptSettings::default(), &fields(json!({"a": 1})), &BTreeMap::new());
        assert_eq!(decisions[0].outcome, DecisionOutcome::Flagged);
        assert_eq!(decisions[0].confidence, None);
    }

    #[test]
    fn per_field_override_applies() {
        let mut settings = AutoAcceptSettings::default();
        settings.field_thresholds.insert("a".into(), 0.5);
        let decisions = classify(&settings, &fields(json!({"a": 1})), &scores(&[("a", 0.6)]));
        assert_eq!(decisions[0].outcome, DecisionOutcome::Accepted);
        assert_eq!(decisions[0].threshold, 0.5);
    }

    #[test]
    fn schedule_f_accepts_high_and_flags_low() {
        let conn = open_memory_database().unwrap();
        let app = Application::new(Uuid::new_v4());
        insert_application(&conn, &app).unwrap();
        let doc = Document::new(app.id, DocumentType::ScheduleF);
        insert_document(&conn, &doc).unwrap();
        let mapper = FieldMapper::new(Arc::new(Registry::builtin()));

        let extracted = fields(json!({"net_profit_loss": 125000, "total_expenses": 48000}));
        let confidences = scores(&[("net_profit_loss", 0.95), ("total_expenses", 0.72)]);
        let result = run_auto_accept(
            &conn,
            &mapper,
            &Actor::system(),
            &AutoAcceptInput {
                application_id: app.id,
                document_id: doc.id,
                doc_type: DocumentType::ScheduleF,
                fields: &extracted,
                confidences: &confidences,
                scores: &confidences,
            },
        )
        .unwrap();

        assert_eq!(result.decisions.len(), 2);
        assert_eq!(result.accepted().count(), 1);
        assert_eq!(result.flagged().next().unwrap().field_name, "total_expenses");

        let written = repository::get_field(&conn, &app.id, ModuleId::M3, "net_profit_loss")
            .unwrap()
            .unwrap();
        assert_eq!(written.value, json!(125000));
        assert_eq!(written.confidence, Some(0.95));
        assert!(repository::get_field(&conn, &app.id, ModuleId::M3, "total_expenses")
            .unwrap()
            .is_none());

        let entries = repository::query_audit_entries(
            &conn,
            &AuditFilter {
                application_id: Some(app.id),
                ..Default::default()
            },
        )
        .unwrap();
        let batches: Vec<_> = entries
            .iter()
            .filter(|e| e.action == AuditAction::AutoAcceptBatch)
            .collect();
        assert_eq!(batches.len(), 1);
        let logged: Value = serde_json::from_str(batches[0].new_value.as_deref().unwrap()).unwrap();
        assert_eq!(logged["decisions"].as_array().unwrap().len(), 2);
        assert_eq!(
            entries.iter().filter(|e| e.action == AuditAction::FieldUpdate).count(),
            1
        );
    }
}
