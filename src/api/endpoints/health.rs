use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::{ok, ApiContext, ApiResponse};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub mapping_version: u32,
}

/// `GET /api/health`
pub async fn check(State(ctx): State<ApiContext>) -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        mapping_version: ctx.core.mapping().version,
    })
}
