use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_enum, parse_json, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::DocumentStatus;
use crate::models::Document;

struct DocumentRow {
    id: String,
    application_id: String,
    doc_type: String,
    status: String,
    storage_ref: Option<String>,
    extracted_fields: Option<String>,
    overall_confidence: Option<f64>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "SELECT id, application_id, doc_type, status, storage_ref,
    extracted_fields, overall_confidence, last_error, created_at, updated_at FROM documents";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        application_id: row.get(1)?,
        doc_type: row.get(2)?,
        status: row.get(3)?,
        storage_ref: row.get(4)?,
        extracted_fields: row.get(5)?,
        overall_confidence: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: parse_uuid("documents.id", &row.id)?,
        application_id: parse_uuid("documents.application_id", &row.application_id)?,
        doc_type: parse_enum(&row.doc_type)?,
        status: parse_enum(&row.status)?,
        storage_ref: row.storage_ref,
        extracted_fields: row
            .extracted_fields
            .as_deref()
            .map(|s| parse_json("documents.extracted_fields", s))
            .transpose()?,
        overall_confidence: row.overall_confidence,
        last_error: row.last_error,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    let extracted = doc
        .extracted_fields
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO documents (id, application_id, doc_type, status, storage_ref,
         extracted_fields, overall_confidence, last_error, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            doc.id.to_string(),
            doc.application_id.to_string(),
            doc.doc_type.as_str(),
            doc.status.as_str(),
            doc.storage_ref,
            extracted,
            doc.overall_confidence,
            doc.last_error,
            doc.created_at,
            doc.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let result = conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id.to_string()],
        map_row,
    );

    match result {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn require_document(conn: &Connection, id: &Uuid) -> Result<Document, DatabaseError> {
    get_document(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Document".into(),
        id: id.to_string(),
    })
}

pub fn list_documents_for_application(
    conn: &Connection,
    application_id: &Uuid,
) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE application_id = ?1 ORDER BY created_at ASC"
    ))?;
    let rows = stmt
        .query_map(params![application_id.to_string()], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(document_from_row).collect()
}

/// Update only the status of a document.
pub fn update_document_status(
    conn: &Connection,
    document_id: &Uuid,
    status: DocumentStatus,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![document_id.to_string(), status.as_str(), Utc::now()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: document_id.to_string(),
        });
    }
    Ok(())
}

/// Compare-and-set on status. Returns false when the row was not in
/// `expected` (someone else moved it first).
pub fn transition_document_status(
    conn: &Connection,
    document_id: &Uuid,
    expected: DocumentStatus,
    next: DocumentStatus,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        params![
            document_id.to_string(),
            expected.as_str(),
            next.as_str(),
            Utc::now()
        ],
    )?;
    Ok(rows == 1)
}

/// Write the terminal result of a processing run.
pub fn save_processing_result(
    conn: &Connection,
    document_id: &Uuid,
    status: DocumentStatus,
    extracted_fields: Option<&serde_json::Value>,
    overall_confidence: Option<f64>,
    last_error: Option<&str>,
) -> Result<(), DatabaseError> {
    let extracted = extracted_fields.map(serde_json::to_string).transpose()?;
    let rows = conn.execute(
        "UPDATE documents
         SET status = ?2,
             extracted_fields = COALESCE(?3, extracted_fields),
             overall_confidence = COALESCE(?4, overall_confidence),
             last_error = ?5,
             updated_at = ?6
         WHERE id = ?1",
        params![
            document_id.to_string(),
            status.as_str(),
            extracted,
            overall_confidence,
            last_error,
            Utc::now(),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: document_id.to_string(),
        });
    }
    Ok(())
}

/// Move a document from `processing` to `failed` with an error message.
/// Returns false when it was no longer processing.
pub fn fail_processing(
    conn: &Connection,
    document_id: &Uuid,
    last_error: &str,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET status = ?2, last_error = ?3, updated_at = ?4
         WHERE id = ?1 AND status = ?5",
        params![
            document_id.to_string(),
            DocumentStatus::Failed.as_str(),
            last_error,
            Utc::now(),
            DocumentStatus::Processing.as_str(),
        ],
    )?;
    Ok(rows == 1)
}

pub fn set_storage_ref(
    conn: &Connection,
    document_id: &Uuid,
    storage_ref: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE documents SET storage_ref = ?2, updated_at = ?3 WHERE id = ?1",
        params![document_id.to_string(), storage_ref, Utc::now()],
    )?;
    Ok(())
}
