//! Application management and the tenant rules every operation goes through.
//!
//! Analysts see and edit only their own applications. Auditors see all of
//! them and are the only role that may verify fields or audit documents.
//! The pipeline's system actor is trusted.

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::certification::{check_readiness, ReadinessReport};
use crate::db::repository;
use crate::error::AppError;
use crate::models::enums::{ActorRole, ModuleId};
use crate::models::{Actor, Application, Document, ModuleCompletion, ModuleField};
use crate::registry::MappingConfig;

// ═══════════════════════════════════════════
// Access rules
// ═══════════════════════════════════════════

pub fn ensure_can_access(actor: &Actor, app: &Application) -> Result<(), AppError> {
    match actor.role {
        ActorRole::Auditor | ActorRole::System => Ok(()),
        ActorRole::Analyst if actor.id == app.owner_id => Ok(()),
        ActorRole::Analyst => Err(AppError::AccessDenied(format!(
            "application {} belongs to another analyst",
            app.id
        ))),
    }
}

pub fn ensure_auditor(actor: &Actor) -> Result<(), AppError> {
    match actor.role {
        ActorRole::Auditor => Ok(()),
        _ => Err(AppError::AccessDenied("auditor role required".into())),
    }
}

/// The owning analyst or any auditor.
pub fn ensure_can_certify(actor: &Actor, app: &Application) -> Result<(), AppError> {
    match actor.role {
        ActorRole::Auditor => Ok(()),
        ActorRole::Analyst if actor.id == app.owner_id => Ok(()),
        _ => Err(AppError::AccessDenied(format!(
            "actor {} may not certify application {}",
            actor.id, app.id
        ))),
    }
}

/// Load an application and apply the tenant check.
pub fn load_for(conn: &Connection, actor: &Actor, application_id: &Uuid) -> Result<Application, AppError> {
    let app = repository::require_application(conn, application_id)?;
    ensure_can_access(actor, &app)?;
    Ok(app)
}

// ═══════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════

pub fn create_application(conn: &Connection, actor: &Actor) -> Result<Application, AppError> {
    if actor.role != ActorRole::Analyst {
        return Err(AppError::AccessDenied("only analysts open applications".into()));
    }
    let app = Application::new(actor.id);
    repository::insert_application(conn, &app)?;
    tracing::info!(app_id = %app.id, owner = %actor.id, "Application created");
    Ok(app)
}

pub fn list_applications(conn: &Connection, actor: &Actor) -> Result<Vec<Application>, AppError> {
    let apps = match actor.role {
        ActorRole::Analyst => repository::list_applications_by_owner(conn, &actor.id)?,
        ActorRole::Auditor | ActorRole::System => repository::list_all_applications(conn)?,
    };
    Ok(apps)
}

/// Everything a reviewer needs on one screen.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationOverview {
    pub application: Application,
    pub documents: Vec<Document>,
    pub fields: Vec<ModuleField>,
    pub completion: Vec<ModuleCompletion>,
    pub readiness: ReadinessReport,
}

pub fn application_overview(
    conn: &Connection,
    config: &MappingConfig,
    actor: &Actor,
    application_id: &Uuid,
) -> Result<ApplicationOverview, AppError> {
    let application = load_for(conn, actor, application_id)?;
    let documents = repository::list_documents_for_application(conn, application_id)?;
    let fields = repository::list_fields(conn, application_id)?;
    let completion = ModuleId::all()
        .iter()
        .filter_map(|m| repository::get_module_completion(conn, application_id, *m).transpose())
        .collect::<Result<Vec<_>, _>>()?;
    let readiness = check_readiness(conn, config, application_id)?;

    Ok(ApplicationOverview {
        application,
        documents,
        fields,
        completion,
        readiness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::ApplicationStatus;

    #[test]
    fn analyst_creates_draft_they_own() {
        let conn = open_memory_database().unwrap();
        let analyst = Actor::analyst(Uuid::new_v4());
        let app = create_application(&conn, &analyst).unwrap();
        assert_eq!(app.status, ApplicationStatus::Draft);
        assert_eq!(app.owner_id, analyst.id);
    }

    #[test]
    fn auditors_do_not_open_applications() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            create_application(&conn, &Actor::auditor(Uuid::new_v4())),
            Err(AppError::AccessDenied(_))
        ));
    }

    #[test]
    fn tenant_isolation() {
        let conn = open_memory_database().unwrap();
        let owner = Actor::analyst(Uuid::new_v4());
        let other = Actor::analyst(Uuid::new_v4());
        let app = create_application(&conn, &owner).unwrap();
        create_application(&conn, &other).unwrap();

        assert!(load_for(&conn, &owner, &app.id).is_ok());
        assert!(matches!(load_for(&conn, &other, &app.id), Err(AppError::AccessDenied(_))));
        assert!(load_for(&conn, &Actor::auditor(Uuid::new_v4()), &app.id).is_ok());

        assert_eq!(list_applications(&conn, &owner).unwrap().len(), 1);
        assert_eq!(list_applications(&conn, &Actor::auditor(Uuid::new_v4())).unwrap().len(), 2);
    }

    #[test]
    fn unknown_application_is_not_found() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            load_for(&conn, &Actor::system(), &Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn certify_permission() {
        let app = Application::new(Uuid::new_v4());
        assert!(ensure_can_certify(&Actor::analyst(app.owner_id), &app).is_ok());
        assert!(ensure_can_certify(&Actor::auditor(Uuid::new_v4()), &app).is_ok());
        assert!(ensure_can_certify(&Actor::analyst(Uuid::new_v4()), &app).is_err());
        assert!(ensure_can_certify(&Actor::system(), &app).is_err());
    }

    #[test]
    fn overview_for_fresh_application() {
        let conn = open_memory_database().unwrap();
        let analyst = Actor::analyst(Uuid::new_v4());
        let app = create_application(&conn, &analyst).unwrap();
        let overview = application_overview(&conn, &MappingConfig::builtin(), &analyst, &app.id).unwrap();
        assert!(overview.documents.is_empty());
        assert!(overview.completion.is_empty());
        assert!(!overview.readiness.is_valid);
    }
}
