use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_enum, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::AuditAction;
use crate::models::{AuditEntry, AuditFilter};

const DEFAULT_PAGE_SIZE: u32 = 200;

struct AuditRow {
    id: String,
    application_id: String,
    actor_id: String,
    field_id: Option<String>,
    action: String,
    old_value: Option<String>,
    new_value: Option<String>,
    justification: Option<String>,
    created_at: DateTime<Utc>,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        id: row.get(0)?,
        application_id: row.get(1)?,
        actor_id: row.get(2)?,
        field_id: row.get(3)?,
        action: row.get(4)?,
        old_value: row.get(5)?,
        new_value: row.get(6)?,
        justification: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn entry_from_row(row: AuditRow) -> Result<AuditEntry, DatabaseError> {
    Ok(AuditEntry {
        id: parse_uuid("audit_trail.id", &row.id)?,
        application_id: parse_uuid("audit_trail.application_id", &row.application_id)?,
        actor_id: parse_uuid("audit_trail.actor_id", &row.actor_id)?,
        field_id: parse_opt_uuid("audit_trail.field_id", row.field_id)?,
        action: parse_enum(&row.action)?,
        old_value: row.old_value,
        new_value: row.new_value,
        justification: row.justification.as_deref().map(parse_enum).transpose()?,
        created_at: row.created_at,
    })
}

/// Append one entry. There is no update or delete counterpart.
pub fn insert_audit_entry(conn: &Connection, entry: &AuditEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO audit_trail (id, application_id, actor_id, field_id, action,
         old_value, new_value, justification, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.id.to_string(),
            entry.application_id.to_string(),
            entry.actor_id.to_string(),
            entry.field_id.map(|id| id.to_string()),
            entry.action.as_str(),
            entry.old_value,
            entry.new_value,
            entry.justification.map(|j| j.as_str()),
            entry.created_at,
        ],
    )?;
    Ok(())
}

/// Newest-first read with optional application/field filters.
pub fn query_audit_entries(conn: &Connection, filter: &AuditFilter) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut sql = String::from(
        "SELECT id, application_id, actor_id, field_id, action, old_value, new_value,
         justification, created_at FROM audit_trail WHERE 1=1",
    );
    let mut values: Vec<String> = Vec::new();

    if let Some(app_id) = &filter.application_id {
        values.push(app_id.to_string());
        sql.push_str(&format!(" AND application_id = ?{}", values.len()));
    }
    if let Some(field_id) = &filter.field_id {
        values.push(field_id.to_string());
        sql.push_str(&format!(" AND field_id = ?{}", values.len()));
    }

    let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = filter.offset.unwrap_or(0);
    sql.push_str(&format!(" ORDER BY seq DESC LIMIT {limit} OFFSET {offset}"));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(entry_from_row).collect()
}

/// Every entry for an application in insertion order, for export.
pub fn list_audit_entries_chronological(
    conn: &Connection,
    application_id: &Uuid,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, actor_id, field_id, action, old_value, new_value,
         justification, created_at FROM audit_trail WHERE application_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map(params![application_id.to_string()], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(entry_from_row).collect()
}

/// Field ids that carry at least one human review entry (override or verify).
pub fn reviewed_field_ids(conn: &Connection, application_id: &Uuid) -> Result<HashSet<Uuid>, DatabaseError> {
    let reviewed: Vec<&str> = AuditAction::all()
        .iter()
        .filter(|a| a.is_field_review())
        .map(|a| a.as_str())
        .collect();
    let placeholders = (0..reviewed.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");

    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT field_id FROM audit_trail
         WHERE application_id = ?1 AND field_id IS NOT NULL AND action IN ({placeholders})"
    ))?;
    let mut bind: Vec<String> = vec![application_id.to_string()];
    bind.extend(reviewed.iter().map(|s| s.to_string()));

    let ids = stmt
        .query_map(rusqlite::params_from_iter(bind.iter()), |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|s| parse_uuid("audit_trail.field_id", s)).collect()
}

pub fn count_audit_entries(conn: &Connection, application_id: &Uuid) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM audit_trail WHERE application_id = ?1",
        params![application_id.to_string()],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_application;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::Justification;
    use crate::models::Application;

    fn setup() -> (Connection, Application) {
        let conn = open_memory_database().unwrap();
        let app = Application::new(Uuid::new_v4());
        insert_application(&conn, &app).unwrap();
        (conn, app)
    }

    #[test]
    fn insert_and_query_newest_first() {
        let (conn, app) = setup();
        let actor = Uuid::new_v4();
        let first = AuditEntry::new(app.id, actor, AuditAction::FieldUpdate);
        let second = AuditEntry::new(app.id, actor, AuditAction::StatusChange);
        insert_audit_entry(&conn, &first).unwrap();
        insert_audit_entry(&conn, &second).unwrap();

        let filter = AuditFilter {
            application_id: Some(app.id),
            ..Default::default()
        };
        let entries = query_audit_entries(&conn, &filter).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, second.id);
        assert_eq!(entries[1].id, first.id);
    }

    #[test]
    fn justification_round_trips() {
        let (conn, app) = setup();
        let entry = AuditEntry::new(app.id, Uuid::new_v4(), AuditAction::FieldOverride)
            .with_field(Uuid::new_v4())
            .with_values(Some("100".into()), Some("120".into()))
            .with_justification(Some(Justification::OcrCorrection));
        insert_audit_entry(&conn, &entry).unwrap();

        let loaded = list_audit_entries_chronological(&conn, &app.id).unwrap();
        assert_eq!(loaded[0], entry);
    }

    #[test]
    fn limit_and_offset_page() {
        let (conn, app) = setup();
        for _ in 0..5 {
            insert_audit_entry(&conn, &AuditEntry::new(app.id, Uuid::new_v4(), AuditAction::FieldUpdate)).unwrap();
        }
        let filter = AuditFilter {
            application_id: Some(app.id),
            limit: Some(2),
            offset: Some(4),
            ..Default::default()
        };
        assert_eq!(query_audit_entries(&conn, &filter).unwrap().len(), 1);
    }

    #[test]
    fn update_is_rejected() {
        let (conn, app) = setup();
        insert_audit_entry(&conn, &AuditEntry::new(app.id, Uuid::new_v4(), AuditAction::FieldUpdate)).unwrap();
        let result = conn.execute("UPDATE audit_trail SET new_value = 'tampered'", []);
        assert!(result.is_err());
    }

    #[test]
    fn direct_delete_is_rejected() {
        let (conn, app) = setup();
        insert_audit_entry(&conn, &AuditEntry::new(app.id, Uuid::new_v4(), AuditAction::FieldUpdate)).unwrap();
        assert!(conn.execute("DELETE FROM audit_trail", []).is_err());
        assert_eq!(count_audit_entries(&conn, &app.id).unwrap(), 1);
    }

    #[test]
    fn application_delete_cascades_trail() {
        let (conn, app) = setup();
        insert_audit_entry(&conn, &AuditEntry::new(app.id, Uuid::new_v4(), AuditAction::FieldUpdate)).unwrap();
        conn.execute("DELETE FROM applications WHERE id = ?1", params![app.id.to_string()])
            .unwrap();
        assert_eq!(count_audit_entries(&conn, &app.id).unwrap(), 0);
    }

    #[test]
    fn reviewed_ids_ignore_plain_updates() {
        let (conn, app) = setup();
        let updated = Uuid::new_v4();
        let overridden = Uuid::new_v4();
        let verified = Uuid::new_v4();
        insert_audit_entry(&conn, &AuditEntry::new(app.id, Uuid::nil(), AuditAction::FieldUpdate).with_field(updated)).unwrap();
        insert_audit_entry(&conn, &AuditEntry::new(app.id, Uuid::new_v4(), AuditAction::FieldOverride).with_field(overridden)).unwrap();
        insert_audit_entry(&conn, &AuditEntry::new(app.id, Uuid::new_v4(), AuditAction::FieldVerified).with_field(verified)).unwrap();

        let ids = reviewed_field_ids(&conn, &app.id).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&overridden));
        assert!(ids.contains(&verified));
        assert!(!ids.contains(&updated));
    }
}
