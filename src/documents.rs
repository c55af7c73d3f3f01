//! Document registration, upload, auditing and the manual-entry bypass.

use chrono::Duration;
use rusqlite::Connection;
use uuid::Uuid;

use crate::applications::{ensure_auditor, load_for};
use crate::audit;
use crate::certification::state::status_change_entry;
use crate::db::{self, repository};
use crate::error::AppError;
use crate::models::enums::{ApplicationStatus, DocumentStatus, DocumentType};
use crate::models::{Actor, Document};
use crate::pipeline::failures::{FailureTracker, BYPASS_THRESHOLD};
use crate::storage::{document_object_key, ObjectStore, SignedUrl};

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Load a document and apply the tenant check of its application.
pub fn load_document_for(conn: &Connection, actor: &Actor, document_id: &Uuid) -> Result<Document, AppError> {
    let doc = repository::require_document(conn, document_id)?;
    load_for(conn, actor, &doc.application_id)?;
    Ok(doc)
}

/// Move a document along one edge with its audit entry, compare-and-set on
/// the current status.
fn transition(
    conn: &Connection,
    actor: &Actor,
    doc: &Document,
    to: DocumentStatus,
) -> Result<(), AppError> {
    transition_with(conn, actor, doc, to, |_| Ok(()))
}

/// `transition`, plus extra writes that only the caller winning the
/// compare-and-set gets to make.
fn transition_with<F>(
    conn: &Connection,
    actor: &Actor,
    doc: &Document,
    to: DocumentStatus,
    also: F,
) -> Result<(), AppError>
where
    F: FnOnce(&Connection) -> Result<(), AppError>,
{
    if !doc.status.can_transition_to(to) {
        return Err(AppError::StateConflict(format!(
            "document {} cannot move from {} to {}",
            doc.id, doc.status, to
        )));
    }
    let tx = db::write_transaction(conn)?;
    if !repository::transition_document_status(&tx, &doc.id, doc.status, to)? {
        return Err(AppError::StateConflict(format!(
            "document {} changed status concurrently",
            doc.id
        )));
    }
    also(&tx)?;
    audit::record(&tx, &audit::document_transition_entry(doc, actor.id, doc.status, to))?;
    tx.commit()?;
    tracing::info!(doc_id = %doc.id, from = %doc.status, to = %to, "Document status changed");
    Ok(())
}

/// Create a pending document. The first document moves a draft application
/// to `awaiting_documents`.
pub fn register_document(
    conn: &Connection,
    actor: &Actor,
    application_id: &Uuid,
    doc_type: DocumentType,
) -> Result<Document, AppError> {
    let app = load_for(conn, actor, application_id)?;
    if !app.accepts_field_edits() {
        return Err(AppError::StateConflict(format!(
            "application {} is {} and accepts no new documents",
            app.id, app.status
        )));
    }

    let doc = Document::new(app.id, doc_type);
    let tx = conn.unchecked_transaction()?;
    repository::insert_document(&tx, &doc)?;
    let advanced = app.status == ApplicationStatus::Draft
        && repository::transition_application_status(
            &tx,
            &app.id,
            ApplicationStatus::Draft,
            ApplicationStatus::AwaitingDocuments,
        )?;
    if advanced {
        audit::record(&tx, &status_change_entry(&app, actor, ApplicationStatus::AwaitingDocuments))?;
    } else {
        repository::touch_application(&tx, &app.id)?;
    }
    tx.commit()?;

    tracing::info!(doc_id = %doc.id, app_id = %app.id, doc_type = %doc_type, "Document registered");
    Ok(doc)
}

/// Store the binary write-once and mark the document uploaded.
pub fn upload_document(
    conn: &Connection,
    store: &dyn ObjectStore,
    actor: &Actor,
    document_id: &Uuid,
    filename: &str,
    bytes: &[u8],
) -> Result<Document, AppError> {
    let doc = load_document_for(conn, actor, document_id)?;
    if bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".into()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(format!(
            "uploaded file is {} bytes; limit is {MAX_UPLOAD_BYTES}",
            bytes.len()
        )));
    }
    if doc.status != DocumentStatus::Pending {
        return Err(AppError::StateConflict(format!(
            "document {} already has a binary ({})",
            doc.id, doc.status
        )));
    }

    let key = document_object_key(&doc.application_id, &doc.id, filename);
    let stored = store.put(&key, bytes)?;
    transition_with(conn, actor, &doc, DocumentStatus::Uploaded, |tx| {
        Ok(repository::set_storage_ref(tx, &doc.id, &stored.key)?)
    })?;

    Ok(repository::require_document(conn, &doc.id)?)
}

/// Register and upload in one call.
pub fn submit_document(
    conn: &Connection,
    store: &dyn ObjectStore,
    actor: &Actor,
    application_id: &Uuid,
    doc_type: DocumentType,
    filename: &str,
    bytes: &[u8],
) -> Result<Document, AppError> {
    let doc = register_document(conn, actor, application_id, doc_type)?;
    upload_document(conn, store, actor, &doc.id, filename, bytes)
}

/// Auditor sign-off on a completed (or manually entered) document.
pub fn mark_document_audited(conn: &Connection, actor: &Actor, document_id: &Uuid) -> Result<Document, AppError> {
    ensure_auditor(actor)?;
    let doc = load_document_for(conn, actor, document_id)?;
    if doc.status == DocumentStatus::Audited {
        return Err(AppError::StateConflict(format!("document {} is already audited", doc.id)));
    }
    transition(conn, actor, &doc, DocumentStatus::Audited)?;
    Ok(repository::require_document(conn, &doc.id)?)
}

/// Switch a repeatedly failing document to manual entry. Only available
/// once the failure counter has reached the bypass threshold.
pub fn enter_manual_entry(
    conn: &Connection,
    failures: &dyn FailureTracker,
    actor: &Actor,
    document_id: &Uuid,
) -> Result<Document, AppError> {
    let doc = load_document_for(conn, actor, document_id)?;
    if doc.status != DocumentStatus::Failed {
        return Err(AppError::StateConflict(format!(
            "manual entry requires a failed document; {} is {}",
            doc.id, doc.status
        )));
    }
    let attempts = failures.failure_count(&doc.id);
    if !failures.bypass_unlocked(&doc.id) {
        return Err(AppError::StateConflict(format!(
            "manual entry unlocks after {BYPASS_THRESHOLD} failed processing attempts; {attempts} so far"
        )));
    }
    transition(conn, actor, &doc, DocumentStatus::ManualEntry)?;
    Ok(repository::require_document(conn, &doc.id)?)
}

pub fn list_documents(conn: &Connection, actor: &Actor, application_id: &Uuid) -> Result<Vec<Document>, AppError> {
    load_for(conn, actor, application_id)?;
    Ok(repository::list_documents_for_application(conn, application_id)?)
}

/// Time-limited read URL for the document's binary.
pub fn document_url(
    conn: &Connection,
    store: &dyn ObjectStore,
    actor: &Actor,
    document_id: &Uuid,
    ttl: Duration,
) -> Result<SignedUrl, AppError> {
    let doc = load_document_for(conn, actor, document_id)?;
    let key = doc
        .storage_ref
        .ok_or_else(|| AppError::NotFound(format!("binary for document {document_id}")))?;
    Ok(store.signed_url(&key, ttl)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::AuditAction;
    use crate::models::{Application, AuditFilter};
    use crate::pipeline::failures::InMemoryFailureTracker;
    use crate::storage::LocalObjectStore;

    struct Setup {
        conn: Connection,
        _dir: tempfile::TempDir,
        store: LocalObjectStore,
        analyst: Actor,
        app: Application,
    }

    fn setup() -> Setup {
        let conn = open_memory_database().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), b"k", "http://files").unwrap();
        let analyst = Actor::analyst(Uuid::new_v4());
        let app = crate::applications::create_application(&conn, &analyst).unwrap();
        Setup {
            conn,
            _dir: dir,
            store,
            analyst,
            app,
        }
    }

    fn actions(conn: &Connection, app: &Uuid) -> Vec<AuditAction> {
        repository::query_audit_entries(
            conn,
            &AuditFilter {
                application_id: Some(*app),
                ..Default::default()
            },
        )
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect()
    }

    #[test]
    fn first_document_advances_draft() {
        let s = setup();
        register_document(&s.conn, &s.analyst, &s.app.id, DocumentType::DriversLicense).unwrap();
        let app = repository::require_application(&s.conn, &s.app.id).unwrap();
        assert_eq!(app.status, ApplicationStatus::AwaitingDocuments);

        register_document(&s.conn, &s.analyst, &s.app.id, DocumentType::ScheduleF).unwrap();
        let status_changes = actions(&s.conn, &s.app.id)
            .into_iter()
            .filter(|a| *a == AuditAction::StatusChange)
            .count();
        assert_eq!(status_changes, 1);
    }

    #[test]
    fn submit_stores_binary_and_audits_upload() {
        let s = setup();
        let doc = submit_document(
            &s.conn,
            &s.store,
            &s.analyst,
            &s.app.id,
            DocumentType::ScheduleF,
            "schedule_f.pdf",
            b"%PDF-1.7",
        )
        .unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        let key = doc.storage_ref.clone().unwrap();
        assert_eq!(s.store.get(&key).unwrap(), b"%PDF-1.7");
        assert!(actions(&s.conn, &s.app.id).contains(&AuditAction::DocumentUploaded));

        let again = upload_document(&s.conn, &s.store, &s.analyst, &doc.id, "x.pdf", b"other");
        assert!(matches!(again, Err(AppError::StateConflict(_))));
    }

    #[test]
    fn concurrent_uploads_keep_the_winners_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agcert.db");
        let conn = crate::db::open_database(&path).unwrap();
        let store = LocalObjectStore::new(dir.path().join("objects"), b"k", "http://files").unwrap();
        let analyst = Actor::analyst(Uuid::new_v4());
        let app = crate::applications::create_application(&conn, &analyst).unwrap();
        let doc = register_document(&conn, &analyst, &app.id, DocumentType::ScheduleF).unwrap();

        let results: Vec<(usize, Result<Document, AppError>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let (path, store, analyst) = (&path, &store, &analyst);
                    scope.spawn(move || {
                        let conn = crate::db::open_database(path).unwrap();
                        let body = format!("%PDF upload {i}");
                        let result = upload_document(&conn, store, analyst, &doc.id, &format!("f{i}.pdf"), body.as_bytes());
                        (i, result)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<(usize, &Document)> = results
            .iter()
            .filter_map(|(i, r)| r.as_ref().ok().map(|d| (*i, d)))
            .collect();
        assert_eq!(winners.len(), 1);
        let (winner, uploaded) = winners[0];
        let stored = repository::require_document(&conn, &doc.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Uploaded);
        assert_eq!(stored.storage_ref, uploaded.storage_ref);
        let bytes = store.get(&stored.storage_ref.unwrap()).unwrap();
        assert_eq!(bytes, format!("%PDF upload {winner}").as_bytes());
    }

    #[test]
    fn empty_upload_rejected() {
        let s = setup();
        let doc = register_document(&s.conn, &s.analyst, &s.app.id, DocumentType::LandDeed).unwrap();
        assert!(matches!(
            upload_document(&s.conn, &s.store, &s.analyst, &doc.id, "deed.pdf", b""),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn other_analyst_cannot_touch_documents() {
        let s = setup();
        let doc = register_document(&s.conn, &s.analyst, &s.app.id, DocumentType::LandDeed).unwrap();
        let intruder = Actor::analyst(Uuid::new_v4());
        assert!(matches!(
            upload_document(&s.conn, &s.store, &intruder, &doc.id, "deed.pdf", b"x"),
            Err(AppError::AccessDenied(_))
        ));
        assert!(matches!(
            register_document(&s.conn, &intruder, &s.app.id, DocumentType::LandDeed),
            Err(AppError::AccessDenied(_))
        ));
    }

    #[test]
    fn audit_requires_auditor_and_completed_document() {
        let s = setup();
        let doc = submit_document(&s.conn, &s.store, &s.analyst, &s.app.id, DocumentType::LandDeed, "d.pdf", b"x")
            .unwrap();
        let auditor = Actor::auditor(Uuid::new_v4());

        assert!(matches!(
            mark_document_audited(&s.conn, &s.analyst, &doc.id),
            Err(AppError::AccessDenied(_))
        ));
        // uploaded -> audited is not an edge
        assert!(matches!(
            mark_document_audited(&s.conn, &auditor, &doc.id),
            Err(AppError::StateConflict(_))
        ));

        repository::update_document_status(&s.conn, &doc.id, DocumentStatus::Completed).unwrap();
        let audited = mark_document_audited(&s.conn, &auditor, &doc.id).unwrap();
        assert_eq!(audited.status, DocumentStatus::Audited);
        assert!(actions(&s.conn, &s.app.id).contains(&AuditAction::DocumentAudited));

        let twice = mark_document_audited(&s.conn, &auditor, &doc.id);
        assert!(matches!(twice, Err(AppError::StateConflict(ref m)) if m.contains("already audited")));
    }

    #[test]
    fn manual_entry_gated_by_failure_count() {
        let s = setup();
        let doc = submit_document(&s.conn, &s.store, &s.analyst, &s.app.id, DocumentType::BankStatement, "b.pdf", b"x")
            .unwrap();
        repository::update_document_status(&s.conn, &doc.id, DocumentStatus::Failed).unwrap();
        let failures = InMemoryFailureTracker::new();

        for _ in 0..BYPASS_THRESHOLD - 1 {
            failures.record_failure(&doc.id);
        }
        assert!(matches!(
            enter_manual_entry(&s.conn, &failures, &s.analyst, &doc.id),
            Err(AppError::StateConflict(_))
        ));

        failures.record_failure(&doc.id);
        let manual = enter_manual_entry(&s.conn, &failures, &s.analyst, &doc.id).unwrap();
        assert_eq!(manual.status, DocumentStatus::ManualEntry);

        let auditor = Actor::auditor(Uuid::new_v4());
        assert_eq!(
            mark_document_audited(&s.conn, &auditor, &doc.id).unwrap().status,
            DocumentStatus::Audited
        );
    }

    #[test]
    fn manual_entry_requires_failed_status() {
        let s = setup();
        let doc = submit_document(&s.conn, &s.store, &s.analyst, &s.app.id, DocumentType::BankStatement, "b.pdf", b"x")
            .unwrap();
        let failures = InMemoryFailureTracker::new();
        for _ in 0..BYPASS_THRESHOLD {
            failures.record_failure(&doc.id);
        }
        assert!(matches!(
            enter_manual_entry(&s.conn, &failures, &s.analyst, &doc.id),
            Err(AppError::StateConflict(_))
        ));
    }

    #[test]
    fn frozen_application_takes_no_documents() {
        let s = setup();
        repository::update_application_status(&s.conn, &s.app.id, ApplicationStatus::Certified).unwrap();
        assert!(matches!(
            register_document(&s.conn, &s.analyst, &s.app.id, DocumentType::LandDeed),
            Err(AppError::StateConflict(_))
        ));
    }

    #[test]
    fn signed_url_for_uploaded_binary() {
        let s = setup();
        let doc = submit_document(&s.conn, &s.store, &s.analyst, &s.app.id, DocumentType::Form1040, "f.pdf", b"x")
            .unwrap();
        let url = document_url(&s.conn, &s.store, &s.analyst, &doc.id, Duration::minutes(10)).unwrap();
        assert!(url.url.contains("signature="));

        let pending = register_document(&s.conn, &s.analyst, &s.app.id, DocumentType::Form1040).unwrap();
        assert!(matches!(
            document_url(&s.conn, &s.store, &s.analyst, &pending.id, Duration::minutes(10)),
            Err(AppError::NotFound(_))
        ));
    }
}
