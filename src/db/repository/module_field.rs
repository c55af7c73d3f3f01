use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_enum, parse_json, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::ModuleId;
use crate::models::{FieldWrite, ModuleCompletion, ModuleField};

struct ModuleFieldRow {
    id: String,
    application_id: String,
    module: String,
    field_name: String,
    value: String,
    source: String,
    confidence: Option<f64>,
    document_id: Option<String>,
    required: bool,
    updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "SELECT id, application_id, module, field_name, value, source,
    confidence, document_id, required, updated_at FROM module_fields";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModuleFieldRow> {
    Ok(ModuleFieldRow {
        id: row.get(0)?,
        application_id: row.get(1)?,
        module: row.get(2)?,
        field_name: row.get(3)?,
        value: row.get(4)?,
        source: row.get(5)?,
        confidence: row.get(6)?,
        document_id: row.get(7)?,
        required: row.get::<_, i32>(8)? != 0,
        updated_at: row.get(9)?,
    })
}

fn field_from_row(row: ModuleFieldRow) -> Result<ModuleField, DatabaseError> {
    Ok(ModuleField {
        id: parse_uuid("module_fields.id", &row.id)?,
        application_id: parse_uuid("module_fields.application_id", &row.application_id)?,
        module: parse_enum(&row.module)?,
        field_name: row.field_name,
        value: parse_json("module_fields.value", &row.value)?,
        source: parse_enum(&row.source)?,
        confidence: row.confidence,
        document_id: parse_opt_uuid("module_fields.document_id", row.document_id)?,
        required: row.required,
        updated_at: row.updated_at,
    })
}

pub fn get_field(
    conn: &Connection,
    application_id: &Uuid,
    module: ModuleId,
    field_name: &str,
) -> Result<Option<ModuleField>, DatabaseError> {
    let result = conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE application_id = ?1 AND module = ?2 AND field_name = ?3"),
        params![application_id.to_string(), module.as_str(), field_name],
        map_row,
    );

    match result {
        Ok(row) => Ok(Some(field_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_field_by_id(conn: &Connection, id: &Uuid) -> Result<Option<ModuleField>, DatabaseError> {
    let result = conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id.to_string()],
        map_row,
    );

    match result {
        Ok(row) => Ok(Some(field_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Insert or update the field identified by (application, module, name).
///
/// The row id is stable across updates. `required` only ever escalates:
/// once a field is marked required, a later write cannot clear it.
pub fn upsert_field(conn: &Connection, write: &FieldWrite) -> Result<ModuleField, DatabaseError> {
    let value = serde_json::to_string(&write.value)?;
    conn.execute(
        "INSERT INTO module_fields (id, application_id, module, field_name, value, source,
         confidence, document_id, required, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(application_id, module, field_name) DO UPDATE SET
             value = excluded.value,
             source = excluded.source,
             confidence = excluded.confidence,
             document_id = excluded.document_id,
             required = MAX(module_fields.required, excluded.required),
             updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            write.application_id.to_string(),
            write.module.as_str(),
            write.field_name,
            value,
            write.source.as_str(),
            write.confidence,
            write.document_id.map(|id| id.to_string()),
            write.required as i32,
            Utc::now(),
        ],
    )?;

    get_field(conn, &write.application_id, write.module, &write.field_name)?.ok_or_else(|| {
        DatabaseError::NotFound {
            entity_type: "ModuleField".into(),
            id: format!("{}/{}/{}", write.application_id, write.module, write.field_name),
        }
    })
}

pub fn list_fields(conn: &Connection, application_id: &Uuid) -> Result<Vec<ModuleField>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE application_id = ?1 ORDER BY module, field_name"
    ))?;
    let rows = stmt
        .query_map(params![application_id.to_string()], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(field_from_row).collect()
}

pub fn list_module_fields(
    conn: &Connection,
    application_id: &Uuid,
    module: ModuleId,
) -> Result<Vec<ModuleField>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE application_id = ?1 AND module = ?2 ORDER BY field_name"
    ))?;
    let rows = stmt
        .query_map(params![application_id.to_string(), module.as_str()], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(field_from_row).collect()
}

pub fn save_module_completion(conn: &Connection, completion: &ModuleCompletion) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO module_completion (application_id, module, filled, total,
         required_filled, required_total, percentage, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(application_id, module) DO UPDATE SET
             filled = excluded.filled,
             total = excluded.total,
             required_filled = excluded.required_filled,
             required_total = excluded.required_total,
             percentage = excluded.percentage,
             updated_at = excluded.updated_at",
        params![
            completion.application_id.to_string(),
            completion.module.as_str(),
            completion.filled,
            completion.total,
            completion.required_filled,
            completion.required_total,
            completion.percentage,
            Utc::now(),
        ],
    )?;
    Ok(())
}

pub fn get_module_completion(
    conn: &Connection,
    application_id: &Uuid,
    module: ModuleId,
) -> Result<Option<ModuleCompletion>, DatabaseError> {
    let result = conn.query_row(
        "SELECT filled, total, required_filled, required_total, percentage
         FROM module_completion WHERE application_id = ?1 AND module = ?2",
        params![application_id.to_string(), module.as_str()],
        |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, f64>(4)?,
            ))
        },
    );

    match result {
        Ok((filled, total, required_filled, required_total, percentage)) => Ok(Some(ModuleCompletion {
            application_id: *application_id,
            module,
            filled,
            total,
            required_filled,
            required_total,
            percentage,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
