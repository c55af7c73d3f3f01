use std::str::FromStr;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ok, ApiContext, ApiResponse};
use crate::fields::{self, FieldChange};
use crate::models::enums::{Justification, ModuleId};
use crate::models::{Actor, ModuleField};

/// `GET /api/applications/:id/fields`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<ModuleField>>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ok(fields::list_fields(&conn, &actor, &application_id)?))
}

#[derive(Deserialize)]
pub struct SetFieldRequest {
    pub value: Value,
    pub justification: Option<Justification>,
}

/// `PUT /api/applications/:id/fields/:module/:field`
pub async fn set_value(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path((application_id, module, field_name)): Path<(Uuid, String, String)>,
    Json(body): Json<SetFieldRequest>,
) -> Result<Json<ApiResponse<FieldChange>>, ApiError> {
    let module = ModuleId::from_str(&module.to_ascii_lowercase())
        .map_err(|_| ApiError::BadRequest(format!("unknown module '{module}'")))?;
    let conn = ctx.core.open_db()?;
    let change = fields::set_field_value(
        &conn,
        ctx.core.mapping(),
        &actor,
        &application_id,
        module,
        &field_name,
        body.value,
        body.justification,
    )?;
    Ok(ok(change))
}

#[derive(Deserialize, Default)]
pub struct VerifyRequest {
    pub justification: Option<Justification>,
}

/// `POST /api/fields/:id/verify`
pub async fn verify(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(field_id): Path<Uuid>,
    body: Option<Json<VerifyRequest>>,
) -> Result<Json<ApiResponse<ModuleField>>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let conn = ctx.core.open_db()?;
    Ok(ok(fields::verify_field(&conn, &actor, &field_id, body.justification)?))
}
