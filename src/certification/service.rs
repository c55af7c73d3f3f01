use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::readiness::{check_readiness, ReadinessReport};
use super::render::render_certificate;
use super::state::{status_change_entry, validate_transition};
use crate::applications::ensure_can_certify;
use crate::audit;
use crate::db::{self, repository};
use crate::error::AppError;
use crate::models::enums::{ApplicationStatus, AuditAction};
use crate::models::{Actor, Application, AuditEntry};
use crate::registry::MappingConfig;
use crate::storage::{certificate_object_key, ObjectStore, StoredObject};

#[derive(Debug, Clone, Serialize)]
pub struct CertificationOutcome {
    pub application: Application,
    pub readiness: ReadinessReport,
    pub certificate: Option<StoredObject>,
    /// Set when rendering or storing the certificate failed.
    pub certificate_error: Option<String>,
}

/// Certify an application.
///
/// Order of checks: access, transition edge, readiness, confirmation. The
/// checks and the writes share one immediate transaction, so of several
/// concurrent calls exactly one certifies and the rest see the new status.
/// The certificate is rendered afterwards and its failure does not undo
/// anything.
pub fn certify(
    conn: &Connection,
    config: &MappingConfig,
    store: Option<&dyn ObjectStore>,
    actor: &Actor,
    application_id: &Uuid,
    confirmed: bool,
) -> Result<CertificationOutcome, AppError> {
    let span = tracing::info_span!("certify", app_id = %application_id);
    let _enter = span.enter();

    let tx = db::write_transaction(conn)?;
    let app = repository::require_application(&tx, application_id)?;
    ensure_can_certify(actor, &app)?;
    validate_transition(app.status, ApplicationStatus::Certified)?;

    let readiness = check_readiness(&tx, config, application_id)?;
    if !readiness.is_valid {
        tracing::info!(blockers = readiness.blockers.len(), "Certification blocked");
        return Err(AppError::CertificationBlocked(Box::new(readiness)));
    }
    if !confirmed {
        return Err(AppError::Validation(
            "certification must be explicitly confirmed".into(),
        ));
    }

    let certified_at = Utc::now();
    if !repository::mark_application_certified(&tx, &app.id, &actor.id, certified_at)? {
        return Err(AppError::StateConflict(format!(
            "application {} changed status concurrently",
            app.id
        )));
    }
    audit::record(&tx, &status_change_entry(&app, actor, ApplicationStatus::Certified))?;
    let event = serde_json::json!({
        "certified_by": actor.id,
        "certified_at": certified_at,
        "counts": readiness.counts,
    });
    audit::record(
        &tx,
        &AuditEntry::new(app.id, actor.id, AuditAction::CertificationApproved)
            .with_values(None, Some(event.to_string())),
    )?;
    tx.commit()?;
    tracing::info!(certified_by = %actor.id, "Application certified");

    let application = repository::require_application(conn, application_id)?;
    let (certificate, certificate_error) = match store {
        Some(store) => match store_certificate(conn, store, &application) {
            Ok(obj) => (Some(obj), None),
            Err(e) => {
                tracing::warn!(error = %e, "Certificate rendering failed; certification stands");
                (None, Some(e))
            }
        },
        None => (None, None),
    };

    Ok(CertificationOutcome {
        application,
        readiness,
        certificate,
        certificate_error,
    })
}

fn store_certificate(
    conn: &Connection,
    store: &dyn ObjectStore,
    app: &Application,
) -> Result<StoredObject, String> {
    let fields = repository::list_fields(conn, &app.id).map_err(|e| e.to_string())?;
    let bytes = render_certificate(app, &fields).map_err(|e| e.to_string())?;
    store
        .put(&certificate_object_key(&app.id), &bytes)
        .map_err(|e| e.to_string())
}
