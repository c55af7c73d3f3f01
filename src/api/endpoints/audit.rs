use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ok, ApiContext, ApiResponse};
use crate::applications;
use crate::audit;
use crate::models::{Actor, AuditEntry, AuditFilter};

const MAX_PAGE: u32 = 500;

#[derive(Deserialize, Default)]
pub struct AuditQuery {
    pub field_id: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// `GET /api/applications/:id/audit`, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(application_id): Path<Uuid>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, ApiError> {
    let conn = ctx.core.open_db()?;
    applications::load_for(&conn, &actor, &application_id)?;
    let filter = AuditFilter {
        application_id: Some(application_id),
        field_id: query.field_id,
        limit: Some(query.limit.unwrap_or(100).min(MAX_PAGE)),
        offset: query.offset,
    };
    Ok(ok(audit::list_entries(&conn, &filter)?))
}

/// `GET /api/applications/:id/audit/export` as CSV, oldest first.
pub async fn export_csv(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(application_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = ctx.core.open_db()?;
    applications::load_for(&conn, &actor, &application_id)?;
    let csv = audit::export_application_csv(&conn, &application_id)?;
    let disposition = format!("attachment; filename=\"audit-{application_id}.csv\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
