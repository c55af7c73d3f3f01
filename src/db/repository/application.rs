use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_enum, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::ApplicationStatus;
use crate::models::Application;

struct ApplicationRow {
    id: String,
    owner_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    certified_by: Option<String>,
    certified_at: Option<DateTime<Utc>>,
}

const SELECT_COLUMNS: &str =
    "SELECT id, owner_id, status, created_at, updated_at, certified_by, certified_at FROM applications";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApplicationRow> {
    Ok(ApplicationRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        status: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        certified_by: row.get(5)?,
        certified_at: row.get(6)?,
    })
}

fn application_from_row(row: ApplicationRow) -> Result<Application, DatabaseError> {
    Ok(Application {
        id: parse_uuid("applications.id", &row.id)?,
        owner_id: parse_uuid("applications.owner_id", &row.owner_id)?,
        status: parse_enum(&row.status)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
        certified_by: parse_opt_uuid("applications.certified_by", row.certified_by)?,
        certified_at: row.certified_at,
    })
}

pub fn insert_application(conn: &Connection, app: &Application) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO applications (id, owner_id, status, created_at, updated_at, certified_by, certified_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            app.id.to_string(),
            app.owner_id.to_string(),
            app.status.as_str(),
            app.created_at,
            app.updated_at,
            app.certified_by.map(|id| id.to_string()),
            app.certified_at,
        ],
    )?;
    Ok(())
}

pub fn get_application(conn: &Connection, id: &Uuid) -> Result<Option<Application>, DatabaseError> {
    let result = conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id.to_string()],
        map_row,
    );

    match result {
        Ok(row) => Ok(Some(application_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Like `get_application`, but a missing row is an error.
pub fn require_application(conn: &Connection, id: &Uuid) -> Result<Application, DatabaseError> {
    get_application(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Application".into(),
        id: id.to_string(),
    })
}

pub fn list_applications_by_owner(
    conn: &Connection,
    owner_id: &Uuid,
) -> Result<Vec<Application>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE owner_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![owner_id.to_string()], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(application_from_row).collect()
}

pub fn list_all_applications(conn: &Connection) -> Result<Vec<Application>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC"))?;
    let rows = stmt
        .query_map([], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(application_from_row).collect()
}

/// Overwrite the status unconditionally. Lifecycle code goes through
/// `transition_application_status`.
pub fn update_application_status(
    conn: &Connection,
    id: &Uuid,
    status: ApplicationStatus,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE applications SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), Utc::now()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Application".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Compare-and-set on status. Returns false when the row was not in
/// `expected`.
pub fn transition_application_status(
    conn: &Connection,
    id: &Uuid,
    expected: ApplicationStatus,
    next: ApplicationStatus,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE applications SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        params![id.to_string(), expected.as_str(), next.as_str(), Utc::now()],
    )?;
    Ok(rows == 1)
}

/// Stamp the certifier and move the application from `awaiting_audit` to
/// `certified`. Returns false when the application was not awaiting audit.
pub fn mark_application_certified(
    conn: &Connection,
    id: &Uuid,
    certified_by: &Uuid,
    certified_at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE applications
         SET status = ?2, certified_by = ?3, certified_at = ?4, updated_at = ?4
         WHERE id = ?1 AND status = ?5",
        params![
            id.to_string(),
            ApplicationStatus::Certified.as_str(),
            certified_by.to_string(),
            certified_at,
            ApplicationStatus::AwaitingAudit.as_str(),
        ],
    )?;
    Ok(rows == 1)
}

pub fn touch_application(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE applications SET updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), Utc::now()],
    )?;
    Ok(())
}
