//! Application lifecycle endpoints: create, list, overview, status
//! advancement, readiness and certification.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ok, ok_with, ApiContext, ApiResponse};
use crate::applications::{self, ApplicationOverview};
use crate::certification::{self, CertificationOutcome, ReadinessReport};
use crate::fields::{self, AuditRequest};
use crate::models::enums::ApplicationStatus;
use crate::models::{Actor, Application, AuditEntry};

/// `POST /api/applications`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<(StatusCode, Json<ApiResponse<Application>>), ApiError> {
    let conn = ctx.core.open_db()?;
    let app = applications::create_application(&conn, &actor)?;
    Ok((StatusCode::CREATED, ok(app)))
}

/// `GET /api/applications`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ApiResponse<Vec<Application>>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ok(applications::list_applications(&conn, &actor)?))
}

/// `GET /api/applications/:id`
pub async fn overview(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ApplicationOverview>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ok(applications::application_overview(&conn, ctx.core.mapping(), &actor, &id)?))
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub status: ApplicationStatus,
}

/// `POST /api/applications/:id/status`
pub async fn advance(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<AdvanceRequest>,
) -> Result<Json<ApiResponse<Application>>, ApiError> {
    let conn = ctx.core.open_db()?;
    applications::load_for(&conn, &actor, &id)?;
    Ok(ok(certification::advance_application(&conn, &actor, &id, body.status)?))
}

/// `GET /api/applications/:id/readiness`
pub async fn readiness(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReadinessReport>>, ApiError> {
    let conn = ctx.core.open_db()?;
    applications::load_for(&conn, &actor, &id)?;
    Ok(ok(certification::check_readiness(&conn, ctx.core.mapping(), &id)?))
}

#[derive(Deserialize)]
pub struct CertifyRequest {
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Serialize)]
pub struct CertifyResponse {
    #[serde(flatten)]
    pub outcome: CertificationOutcome,
    pub certificate_url: Option<String>,
}

/// `POST /api/applications/:id/certify`
pub async fn certify(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<CertifyRequest>,
) -> Result<Json<ApiResponse<CertifyResponse>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let store = ctx.core.store();
    let outcome = certification::certify(&conn, ctx.core.mapping(), Some(store), &actor, &id, body.confirmed)?;
    let certificate_url = outcome
        .certificate
        .as_ref()
        .and_then(|c| store.signed_url(&c.key, ctx.core.config.signed_url_ttl()).ok())
        .map(|u| u.url);
    let message = match &outcome.certificate_error {
        Some(_) => "Application certified; certificate could not be generated",
        None => "Application certified",
    };
    Ok(ok_with(
        CertifyResponse {
            outcome,
            certificate_url,
        },
        message,
    ))
}

/// `POST /api/applications/:id/audit-requests`
pub async fn request_audit(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<AuditRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuditEntry>>), ApiError> {
    let conn = ctx.core.open_db()?;
    let entry = fields::request_audit(&conn, &actor, &id, &body)?;
    Ok((StatusCode::CREATED, ok(entry)))
}
