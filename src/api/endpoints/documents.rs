//! Document endpoints: upload, processing, audit sign-off, manual-entry
//! bypass and signed read URLs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ok, ok_with, ApiContext, ApiResponse};
use crate::documents;
use crate::models::enums::DocumentType;
use crate::models::{Actor, Document};
use crate::pipeline::ProcessingAck;
use crate::storage::SignedUrl;

#[derive(Deserialize)]
pub struct UploadRequest {
    pub document_type: DocumentType,
    pub filename: String,
    /// Raw base64 or a `data:...;base64,` URL.
    pub content_base64: String,
}

fn decode_content(raw: &str) -> Result<Vec<u8>, ApiError> {
    let encoded = match raw.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => raw,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ApiError::BadRequest(format!("content is not valid base64: {e}")))
}

/// `GET /api/applications/:id/documents`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Document>>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ok(documents::list_documents(&conn, &actor, &application_id)?))
}

/// `POST /api/applications/:id/documents`
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(application_id): Path<Uuid>,
    Json(body): Json<UploadRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Document>>), ApiError> {
    let bytes = decode_content(&body.content_base64)?;
    let conn = ctx.core.open_db()?;
    let doc = documents::submit_document(
        &conn,
        ctx.core.store(),
        &actor,
        &application_id,
        body.document_type,
        &body.filename,
        &bytes,
    )?;
    Ok((StatusCode::CREATED, ok(doc)))
}

/// `POST /api/documents/:id/process`
///
/// Answers 202 right away; the outcome is written onto the document row.
pub async fn process(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<ProcessingAck>>), ApiError> {
    let conn = ctx.core.open_db()?;
    documents::load_document_for(&conn, &actor, &id)?;
    let handle = ctx.core.processor().start(&conn, &actor, &id)?;
    Ok((
        StatusCode::ACCEPTED,
        ok_with(handle.ack, "Processing started"),
    ))
}

/// `GET /api/documents/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ok(documents::load_document_for(&conn, &actor, &id)?))
}

/// `POST /api/documents/:id/audited`
pub async fn mark_audited(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ok(documents::mark_document_audited(&conn, &actor, &id)?))
}

/// `POST /api/documents/:id/manual-entry`
pub async fn manual_entry(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ok(documents::enter_manual_entry(&conn, ctx.core.failures(), &actor, &id)?))
}

/// `GET /api/documents/:id/url`
pub async fn signed_url(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SignedUrl>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let url = documents::document_url(
        &conn,
        ctx.core.store(),
        &actor,
        &id,
        ctx.core.config.signed_url_ttl(),
    )?;
    Ok(ok(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_and_data_url() {
        assert_eq!(decode_content("JVBERg==").unwrap(), b"%PDF");
        assert_eq!(decode_content("data:application/pdf;base64,JVBERg==").unwrap(), b"%PDF");
        assert!(matches!(decode_content("%%%"), Err(ApiError::BadRequest(_))));
    }
}
