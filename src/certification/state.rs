//! Application lifecycle graph.
//!
//! `draft → awaiting_documents → awaiting_audit → certified → locked`, one
//! edge at a time, never backwards. `locked` is terminal.

use rusqlite::Connection;
use uuid::Uuid;

use crate::audit;
use crate::db::{self, repository};
use crate::error::AppError;
use crate::models::enums::{ApplicationStatus, AuditAction};
use crate::models::{Actor, Application, AuditEntry};

/// The single successor of `status`, if any.
pub fn next_status(status: ApplicationStatus) -> Option<ApplicationStatus> {
    use ApplicationStatus::*;
    match status {
        Draft => Some(AwaitingDocuments),
        AwaitingDocuments => Some(AwaitingAudit),
        AwaitingAudit => Some(Certified),
        Certified => Some(Locked),
        Locked => None,
    }
}

pub fn can_transition(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    next_status(from) == Some(to)
}

pub fn validate_transition(from: ApplicationStatus, to: ApplicationStatus) -> Result<(), AppError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(AppError::transition(from, to))
    }
}

pub(crate) fn status_change_entry(app: &Application, actor: &Actor, to: ApplicationStatus) -> AuditEntry {
    AuditEntry::new(app.id, actor.id, AuditAction::StatusChange)
        .with_values(Some(app.status.as_str().to_string()), Some(to.as_str().to_string()))
}

/// Move an application along one edge and record it. Certification goes
/// through `certify`, which adds the readiness gate; it is refused here.
pub fn advance_application(
    conn: &Connection,
    actor: &Actor,
    application_id: &Uuid,
    to: ApplicationStatus,
) -> Result<Application, AppError> {
    let tx = db::write_transaction(conn)?;
    let app = repository::require_application(&tx, application_id)?;
    validate_transition(app.status, to)?;
    if to == ApplicationStatus::Certified {
        return Err(AppError::StateConflict(
            "certification must go through the readiness gate".into(),
        ));
    }

    if !repository::transition_application_status(&tx, &app.id, app.status, to)? {
        return Err(AppError::StateConflict(format!(
            "application {} changed status concurrently",
            app.id
        )));
    }
    audit::record(&tx, &status_change_entry(&app, actor, to))?;
    tx.commit()?;

    tracing::info!(app_id = %app.id, from = %app.status, to = %to, "Application status changed");
    Ok(repository::require_application(conn, application_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_application;
    use crate::db::sqlite::open_memory_database;
    use crate::models::AuditFilter;

    #[test]
    fn only_forward_single_steps_are_allowed() {
        for from in ApplicationStatus::all() {
            for to in ApplicationStatus::all() {
                let expected = next_status(*from) == Some(*to);
                assert_eq!(can_transition(*from, *to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn draft_to_certified_rejected_naming_both_states() {
        let err = validate_transition(ApplicationStatus::Draft, ApplicationStatus::Certified).unwrap_err();
        match err {
            AppError::InvalidTransition { from, to } => {
                assert_eq!(from, "draft");
                assert_eq!(to, "certified");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn locked_is_terminal() {
        for to in ApplicationStatus::all() {
            assert!(validate_transition(ApplicationStatus::Locked, *to).is_err());
        }
    }

    #[test]
    fn no_backward_edges() {
        assert!(!can_transition(ApplicationStatus::AwaitingAudit, ApplicationStatus::AwaitingDocuments));
        assert!(!can_transition(ApplicationStatus::Certified, ApplicationStatus::AwaitingAudit));
        assert!(!can_transition(ApplicationStatus::Draft, ApplicationStatus::Draft));
    }

    #[test]
    fn advance_writes_status_and_one_audit_entry() {
        let conn = open_memory_database().unwrap();
        let app = Application::new(Uuid::new_v4());
        insert_application(&conn, &app).unwrap();
        let actor = Actor::analyst(app.owner_id);

        let updated = advance_application(&conn, &actor, &app.id, ApplicationStatus::AwaitingDocuments).unwrap();
        assert_eq!(updated.status, ApplicationStatus::AwaitingDocuments);

        let entries = repository::query_audit_entries(
            &conn,
            &AuditFilter {
                application_id: Some(app.id),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::StatusChange);
        assert_eq!(entries[0].old_value.as_deref(), Some("draft"));
        assert_eq!(entries[0].new_value.as_deref(), Some("awaiting_documents"));
    }

    #[test]
    fn concurrent_advances_record_one_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agcert.db");
        let conn = db::open_database(&path).unwrap();
        let app = Application::new(Uuid::new_v4());
        insert_application(&conn, &app).unwrap();
        let actor = Actor::analyst(app.owner_id);

        let oks = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|_| {
                    let path = &path;
                    let actor = &actor;
                    scope.spawn(move || {
                        let conn = db::open_database(path).unwrap();
                        advance_application(&conn, actor, &app.id, ApplicationStatus::AwaitingDocuments)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|r| r.is_ok())
                .count()
        });

        assert_eq!(oks, 1);
        assert_eq!(repository::count_audit_entries(&conn, &app.id).unwrap(), 1);
        assert_eq!(
            repository::require_application(&conn, &app.id).unwrap().status,
            ApplicationStatus::AwaitingDocuments
        );
    }

    #[test]
    fn advance_refuses_certification_and_skips() {
        let conn = open_memory_database().unwrap();
        let mut app = Application::new(Uuid::new_v4());
        app.status = ApplicationStatus::AwaitingAudit;
        insert_application(&conn, &app).unwrap();
        let actor = Actor::analyst(app.owner_id);

        assert!(matches!(
            advance_application(&conn, &actor, &app.id, ApplicationStatus::Certified),
            Err(AppError::StateConflict(_))
        ));
        assert!(matches!(
            advance_application(&conn, &actor, &app.id, ApplicationStatus::Locked),
            Err(AppError::InvalidTransition { .. })
        ));
        assert_eq!(repository::count_audit_entries(&conn, &app.id).unwrap(), 0);
    }
}
