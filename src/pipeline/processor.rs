//! Document processing orchestrator.
//!
//! `start` validates and claims the document synchronously (status
//! `processing`), then hands the heavy work to a blocking background task:
//! fetch binary → OCR → normalize → score → auto-accept/mapping. The task's
//! completion step writes the terminal status and payload onto the document
//! row and feeds the failure counter that gates the manual-entry bypass.
//!
//! A run always ends in `completed` or `failed`. If the completion write
//! itself fails, the row is forced from `processing` to `failed`; if even
//! that fails, the next `start` finds no live run for the document and
//! reclaims it.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::auto_accept::{run_auto_accept, AutoAcceptInput};
use super::confidence::{score_fields, ConfidenceReport};
use super::failures::FailureTracker;
use super::mapping::FieldMapper;
use super::normalize;
use crate::audit;
use crate::db::{self, repository};
use crate::error::AppError;
use crate::models::enums::DocumentStatus;
use crate::models::{Actor, Document};
use crate::ocr::OcrClient;
use crate::storage::ObjectStore;

/// Synchronous reply to a process request; the result lands on the
/// document row later.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingAck {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    pub accepted_at: DateTime<Utc>,
}

/// What a successful run produced, before it is written back.
#[derive(Debug, Clone)]
pub struct ProcessingSummary {
    pub payload: Value,
    pub overall_confidence: f64,
    pub accepted: usize,
    pub flagged: usize,
}

pub struct ProcessingHandle {
    pub ack: ProcessingAck,
    /// Resolves to the document's terminal status.
    pub task: tokio::task::JoinHandle<DocumentStatus>,
}

pub struct DocumentProcessor {
    db_path: PathBuf,
    ocr: OcrClient,
    store: Arc<dyn ObjectStore>,
    mapper: FieldMapper,
    failures: Arc<dyn FailureTracker>,
    running: Arc<Mutex<HashSet<Uuid>>>,
}

/// A document's place in the live-run set, released on drop.
struct RunSlot {
    running: Arc<Mutex<HashSet<Uuid>>>,
    document_id: Uuid,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.document_id);
    }
}

impl DocumentProcessor {
    pub fn new(
        db_path: PathBuf,
        ocr: OcrClient,
        store: Arc<dyn ObjectStore>,
        mapper: FieldMapper,
        failures: Arc<dyn FailureTracker>,
    ) -> Self {
        Self {
            db_path,
            ocr,
            store,
            mapper,
            failures,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }

    pub fn failures(&self) -> &dyn FailureTracker {
        self.failures.as_ref()
    }

    /// Claim the document and spawn the background run.
    ///
    /// A document with a live run is a conflict, as is any status without a
    /// `processing` edge (pending, manual_entry, audited). A `processing`
    /// row with no live run is left over from a run that died and is
    /// reclaimed.
    pub fn start(
        self: &Arc<Self>,
        conn: &Connection,
        actor: &Actor,
        document_id: &Uuid,
    ) -> Result<ProcessingHandle, AppError> {
        let slot = self.reserve(document_id)?;
        let run_conn = db::open_database(&self.db_path)?;
        let document = self.claim(conn, actor, document_id)?;

        let processor = Arc::clone(self);
        let doc_id = document.id;
        let task = tokio::task::spawn_blocking(move || {
            let status = processor.run_to_completion(&run_conn, document);
            drop(slot);
            status
        });

        tracing::info!(doc_id = %doc_id, "Document processing started");
        Ok(ProcessingHandle {
            ack: ProcessingAck {
                document_id: doc_id,
                status: DocumentStatus::Processing,
                accepted_at: Utc::now(),
            },
            task,
        })
    }

    fn reserve(&self, document_id: &Uuid) -> Result<RunSlot, AppError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(*document_id) {
            return Err(AppError::StateConflict(format!(
                "document {document_id} is already processing"
            )));
        }
        Ok(RunSlot {
            running: Arc::clone(&self.running),
            document_id: *document_id,
        })
    }

    fn claim(&self, conn: &Connection, actor: &Actor, document_id: &Uuid) -> Result<Document, AppError> {
        let document = repository::require_document(conn, document_id)?;
        let tx = db::write_transaction(conn)?;
        if document.status == DocumentStatus::Processing {
            tracing::warn!(doc_id = %document_id, "Reclaiming document left in processing by a dead run");
        } else {
            if !document.status.can_transition_to(DocumentStatus::Processing) {
                return Err(AppError::StateConflict(format!(
                    "document {document_id} cannot be processed while {}",
                    document.status
                )));
            }
            audit::record(
                &tx,
                &audit::document_transition_entry(&document, actor.id, document.status, DocumentStatus::Processing),
            )?;
        }

        let claimed = repository::transition_document_status(
            &tx,
            document_id,
            document.status,
            DocumentStatus::Processing,
        )?;
        if !claimed {
            return Err(AppError::StateConflict(format!(
                "document {document_id} changed status concurrently"
            )));
        }
        tx.commit()?;

        Ok(Document {
            status: DocumentStatus::Processing,
            ..document
        })
    }

    /// Background body: run the pipeline, then write the outcome back.
    /// Never panics on pipeline errors.
    fn run_to_completion(&self, conn: &Connection, document: Document) -> DocumentStatus {
        let span = tracing::info_span!("process_document", doc_id = %document.id, doc_type = %document.doc_type);
        let _enter = span.enter();

        let result = self.execute(conn, &document);
        match self.complete(conn, &document, result) {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "Failed to record processing result");
                self.abandon(conn, &document, &e)
            }
        }
    }

    /// Force `processing → failed` after the completion write could not
    /// commit, so the document can be resubmitted or bypassed.
    fn abandon(&self, conn: &Connection, document: &Document, cause: &AppError) -> DocumentStatus {
        let message = format!("processing result could not be recorded: {cause}");
        match repository::fail_processing(conn, &document.id, &message) {
            Ok(true) => {
                let entry = audit::document_transition_entry(
                    document,
                    Actor::system().id,
                    DocumentStatus::Processing,
                    DocumentStatus::Failed,
                );
                if let Err(e) = audit::record(conn, &entry) {
                    tracing::error!(error = %e, "Forced failure could not be audited");
                }
                let attempts = self.failures.record_failure(&document.id);
                tracing::warn!(attempts, "Document marked failed after completion error");
                DocumentStatus::Failed
            }
            Ok(false) => repository::require_document(conn, &document.id)
                .map(|d| d.status)
                .unwrap_or(DocumentStatus::Processing),
            Err(e) => {
                tracing::error!(error = %e, "Document left in processing; the next start reclaims it");
                DocumentStatus::Processing
            }
        }
    }

    /// The pipeline proper: binary → OCR → normalize → score → auto-accept.
    pub fn execute(&self, conn: &Connection, document: &Document) -> Result<ProcessingSummary, AppError> {
        let storage_ref = document.storage_ref.as_deref().ok_or_else(|| {
            AppError::Validation(format!("document {} has no stored binary", document.id))
        })?;
        let bytes = self.store.get(storage_ref)?;

        let raw = self.ocr.extract(document.doc_type, &bytes)?;
        let normalized = normalize::normalize(document.doc_type, &raw);
        let report = score_fields(document.doc_type, &normalized.fields, normalized.engine_confidence);
        let scores = path_scores(&report);

        let result = run_auto_accept(
            conn,
            &self.mapper,
            &Actor::system(),
            &AutoAcceptInput {
                application_id: document.application_id,
                document_id: document.id,
                doc_type: document.doc_type,
                fields: &normalized.fields,
                confidences: &report.fields,
                scores: &scores,
            },
        )?;

        let accepted = result.accepted().count();
        let flagged = result.flagged().count();

        let mut payload = normalized.payload();
        if let Value::Object(map) = &mut payload {
            map.insert("confidence".into(), serde_json::to_value(&report).unwrap_or(Value::Null));
            map.insert(
                "auto_accept".into(),
                serde_json::json!({
                    "accepted": accepted,
                    "flagged": result.flagged().map(|d| d.field_name.clone()).collect::<Vec<_>>(),
                    "applied_fields": result.mapping.applied().count(),
                }),
            );
        }

        Ok(ProcessingSummary {
            payload,
            overall_confidence: report.overall,
            accepted,
            flagged,
        })
    }

    /// Completion callback: terminal status, payload and audit in one unit.
    pub fn complete(
        &self,
        conn: &Connection,
        document: &Document,
        result: Result<ProcessingSummary, AppError>,
    ) -> Result<DocumentStatus, AppError> {
        let tx = conn.unchecked_transaction()?;
        let current = repository::require_document(&tx, &document.id)?;
        if current.status != DocumentStatus::Processing {
            tracing::warn!(status = %current.status, "Document left processing before completion; result dropped");
            return Ok(current.status);
        }

        let status = match &result {
            Ok(summary) => {
                repository::save_processing_result(
                    &tx,
                    &document.id,
                    DocumentStatus::Completed,
                    Some(&summary.payload),
                    Some(summary.overall_confidence),
                    None,
                )?;
                DocumentStatus::Completed
            }
            Err(e) => {
                let message = e.to_string();
                repository::save_processing_result(
                    &tx,
                    &document.id,
                    DocumentStatus::Failed,
                    None,
                    None,
                    Some(&message),
                )?;
                DocumentStatus::Failed
            }
        };
        audit::record(
            &tx,
            &audit::document_transition_entry(document, Actor::system().id, DocumentStatus::Processing, status),
        )?;
        tx.commit()?;

        match result {
            Ok(summary) => {
                self.failures.reset(&document.id);
                tracing::info!(
                    accepted = summary.accepted,
                    flagged = summary.flagged,
                    confidence = summary.overall_confidence,
                    "Document processing completed"
                );
            }
            Err(e) => {
                let attempts = self.failures.record_failure(&document.id);
                tracing::warn!(
                    attempts,
                    bypass_unlocked = self.failures.bypass_unlocked(&document.id),
                    error = %e,
                    "Document processing failed"
                );
            }
        }
        Ok(status)
    }
}

/// Top-level field scores plus dotted leaf paths, for the mapper.
fn path_scores(report: &ConfidenceReport) -> BTreeMap<String, f64> {
    let mut scores = report.leaves.clone();
    scores.extend(report.fields.iter().map(|(k, v)| (k.clone(), *v)));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex;

    use crate::db::repository::{insert_application, insert_document, set_storage_ref};
    use crate::models::enums::{AuditAction, DocumentType, ModuleId};
    use crate::models::{Application, AuditFilter};
    use crate::ocr::client::mock::ScriptedOcr;
    use crate::ocr::{JobState, JobStatus, OcrError, OcrService, PollSettings, RetryPolicy};
    use crate::pipeline::failures::{InMemoryFailureTracker, BYPASS_THRESHOLD};
    use crate::pipeline::normalize::RawOcrOutput;
    use crate::registry::Registry;
    use crate::storage::LocalObjectStore;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        db_path: PathBuf,
        store: Arc<LocalObjectStore>,
        failures: Arc<InMemoryFailureTracker>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db_path = dir.path().join("agcert.db");
            let store = Arc::new(LocalObjectStore::new(dir.path().join("objects"), b"k", "http://x").unwrap());
            Self {
                _dir: dir,
                db_path,
                store,
                failures: Arc::new(InMemoryFailureTracker::new()),
            }
        }

        fn conn(&self) -> Connection {
            db::open_database(&self.db_path).unwrap()
        }

        fn processor(&self, service: Arc<dyn OcrService>) -> Arc<DocumentProcessor> {
            let ocr = OcrClient::new(service, RetryPolicy::default(), PollSettings::default()).with_sleeper(|_| {});
            Arc::new(DocumentProcessor::new(
                self.db_path.clone(),
                ocr,
                self.store.clone(),
                FieldMapper::new(Arc::new(Registry::builtin())),
                self.failures.clone(),
            ))
        }

        fn uploaded_document(&self, conn: &Connection, doc_type: DocumentType) -> Document {
            let app = Application::new(Uuid::new_v4());
            insert_application(conn, &app).unwrap();
            let mut doc = Document::new(app.id, doc_type);
            doc.status = DocumentStatus::Uploaded;
            insert_document(conn, &doc).unwrap();
            let key = format!("docs/{}.pdf", doc.id);
            self.store.put(&key, b"%PDF").unwrap();
            set_storage_ref(conn, &doc.id, &key).unwrap();
            repository::require_document(conn, &doc.id).unwrap()
        }
    }

    fn schedule_f_output() -> RawOcrOutput {
        RawOcrOutput {
            structured: Some(json!({
                "Tax Year": 2024,
                "Net Profit": 125000,
                "Gross Income": 310000,
                "Total Expenses": 185000
            })),
            confidence: Some(0.97),
            ..Default::default()
        }
    }

    fn always_failing() -> Arc<dyn OcrService> {
        Arc::new(ScriptedOcr::new())
    }

    /// Engine that blocks in `submit_job` until released.
    struct GatedOcr {
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl OcrService for GatedOcr {
        fn submit_job(&self, _doc_type: DocumentType, _content: &[u8]) -> Result<String, OcrError> {
            let _ = self.release.lock().unwrap().recv();
            Ok("gated".into())
        }

        fn job_status(&self, _job_id: &str) -> Result<JobStatus, OcrError> {
            Ok(JobStatus {
                status: JobState::Failed,
                result: None,
                error: Some("released".into()),
            })
        }
    }

    #[tokio::test]
    async fn successful_run_completes_and_maps_fields() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let doc = fx.uploaded_document(&conn, DocumentType::ScheduleF);
        let service = Arc::new(
            ScriptedOcr::new()
                .submit(Ok("job".into()))
                .status(Ok(ScriptedOcr::completed(schedule_f_output()))),
        );

        let handle = fx.processor(service).start(&conn, &Actor::system(), &doc.id).unwrap();
        assert_eq!(handle.ack.status, DocumentStatus::Processing);
        assert_eq!(handle.task.await.unwrap(), DocumentStatus::Completed);

        let stored = repository::require_document(&conn, &doc.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert!(stored.overall_confidence.unwrap() > 0.0);
        let payload = stored.extracted_fields.unwrap();
        assert_eq!(payload["fields"]["net_profit_loss"], json!(125000));
        assert!(payload["confidence"]["overall"].is_number());
        assert!(repository::get_field(&conn, &doc.application_id, ModuleId::M3, "net_profit_loss")
            .unwrap()
            .is_some());
        assert_eq!(fx.failures.failure_count(&doc.id), 0);
    }

    #[tokio::test]
    async fn resubmission_while_processing_is_conflict() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let doc = fx.uploaded_document(&conn, DocumentType::LandDeed);
        let (tx, rx) = mpsc::channel();
        let processor = fx.processor(Arc::new(GatedOcr { release: Mutex::new(rx) }));

        let first = processor.start(&conn, &Actor::system(), &doc.id).unwrap();
        let second = processor.start(&conn, &Actor::system(), &doc.id);
        assert!(matches!(second, Err(AppError::StateConflict(ref m)) if m.contains("already processing")));

        tx.send(()).unwrap();
        assert_eq!(first.task.await.unwrap(), DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn exhausted_ocr_marks_failed_and_counts() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let doc = fx.uploaded_document(&conn, DocumentType::DriversLicense);
        let processor = fx.processor(always_failing());

        let handle = processor.start(&conn, &Actor::system(), &doc.id).unwrap();
        assert_eq!(handle.task.await.unwrap(), DocumentStatus::Failed);

        let stored = repository::require_document(&conn, &doc.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.last_error.unwrap().contains("unreachable"));
        assert_eq!(fx.failures.failure_count(&doc.id), 1);
    }

    #[tokio::test]
    async fn bypass_unlocks_after_three_failed_runs() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let doc = fx.uploaded_document(&conn, DocumentType::BankStatement);
        let processor = fx.processor(always_failing());

        for run in 1..=BYPASS_THRESHOLD {
            assert!(!processor.failures().bypass_unlocked(&doc.id), "unlocked early at run {run}");
            let handle = processor.start(&conn, &Actor::system(), &doc.id).unwrap();
            assert_eq!(handle.task.await.unwrap(), DocumentStatus::Failed);
        }
        assert!(processor.failures().bypass_unlocked(&doc.id));
    }

    #[tokio::test]
    async fn status_changes_are_audited() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let doc = fx.uploaded_document(&conn, DocumentType::LeaseAgreement);
        let handle = fx.processor(always_failing()).start(&conn, &Actor::system(), &doc.id).unwrap();
        handle.task.await.unwrap();

        let entries = repository::query_audit_entries(
            &conn,
            &AuditFilter {
                application_id: Some(doc.application_id),
                ..Default::default()
            },
        )
        .unwrap();
        let changes: Vec<_> = entries
            .iter()
            .filter(|e| e.action == AuditAction::DocumentStatusChange)
            .collect();
        assert_eq!(changes.len(), 2);
        // newest first: processing -> failed, then uploaded -> processing
        assert_eq!(changes[0].old_value.as_deref(), Some("processing"));
        assert_eq!(changes[1].old_value.as_deref(), Some("uploaded"));
    }

    #[tokio::test]
    async fn unrecordable_result_still_ends_failed() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let doc = fx.uploaded_document(&conn, DocumentType::ScheduleF);
        conn.execute_batch(
            "CREATE TRIGGER reject_completion BEFORE INSERT ON audit_trail
             WHEN NEW.old_value = 'processing' AND NEW.new_value = 'completed'
             BEGIN SELECT RAISE(ABORT, 'audit store unavailable'); END;",
        )
        .unwrap();
        let service = Arc::new(
            ScriptedOcr::new()
                .submit(Ok("job".into()))
                .status(Ok(ScriptedOcr::completed(schedule_f_output()))),
        );
        let processor = fx.processor(service);

        let handle = processor.start(&conn, &Actor::system(), &doc.id).unwrap();
        assert_eq!(handle.task.await.unwrap(), DocumentStatus::Failed);

        let stored = repository::require_document(&conn, &doc.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.last_error.unwrap().contains("audit store unavailable"));
        assert_eq!(fx.failures.failure_count(&doc.id), 1);

        // failed documents can be resubmitted
        let again = processor.start(&conn, &Actor::system(), &doc.id).unwrap();
        assert_eq!(again.task.await.unwrap(), DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn processing_row_without_live_run_is_reclaimed() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let doc = fx.uploaded_document(&conn, DocumentType::LandDeed);
        repository::update_document_status(&conn, &doc.id, DocumentStatus::Processing).unwrap();

        let handle = fx.processor(always_failing()).start(&conn, &Actor::system(), &doc.id).unwrap();
        assert_eq!(handle.task.await.unwrap(), DocumentStatus::Failed);
        assert_eq!(
            repository::require_document(&conn, &doc.id).unwrap().status,
            DocumentStatus::Failed
        );
    }

    #[tokio::test]
    async fn unopenable_database_leaves_document_untouched() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let doc = fx.uploaded_document(&conn, DocumentType::BalanceSheet);
        let ocr = OcrClient::new(always_failing(), RetryPolicy::default(), PollSettings::default()).with_sleeper(|_| {});
        let broken = Arc::new(DocumentProcessor::new(
            fx._dir.path().to_path_buf(),
            ocr,
            fx.store.clone(),
            FieldMapper::new(Arc::new(Registry::builtin())),
            fx.failures.clone(),
        ));

        for _ in 0..2 {
            assert!(matches!(
                broken.start(&conn, &Actor::system(), &doc.id),
                Err(AppError::Database(_))
            ));
        }
        assert_eq!(
            repository::require_document(&conn, &doc.id).unwrap().status,
            DocumentStatus::Uploaded
        );

        let handle = fx.processor(always_failing()).start(&conn, &Actor::system(), &doc.id).unwrap();
        assert_eq!(handle.task.await.unwrap(), DocumentStatus::Failed);
    }

    #[test]
    fn pending_document_cannot_be_processed() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let app = Application::new(Uuid::new_v4());
        insert_application(&conn, &app).unwrap();
        let doc = Document::new(app.id, DocumentType::CropInsurance);
        insert_document(&conn, &doc).unwrap();

        let processor = fx.processor(always_failing());
        assert!(matches!(
            processor.claim(&conn, &Actor::system(), &doc.id),
            Err(AppError::StateConflict(_))
        ));
    }

    #[test]
    fn missing_binary_fails_execution() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let app = Application::new(Uuid::new_v4());
        insert_application(&conn, &app).unwrap();
        let doc = Document::new(app.id, DocumentType::ScheduleF);
        insert_document(&conn, &doc).unwrap();

        let processor = fx.processor(always_failing());
        assert!(matches!(processor.execute(&conn, &doc), Err(AppError::Validation(_))));
    }
}
