//! Serves stored binaries behind signed URLs. No actor headers: the
//! signature is the credential.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Deserialize)]
pub struct SignatureQuery {
    pub expires: i64,
    pub signature: String,
}

fn content_type(key: &str) -> String {
    mime_guess::from_path(key).first_or_octet_stream().to_string()
}

/// `GET /objects/*key?expires=..&signature=..`
pub async fn fetch(
    State(ctx): State<ApiContext>,
    Path(key): Path<String>,
    Query(query): Query<SignatureQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let store = ctx.core.store();
    store.verify_signature(&key, query.expires, &query.signature, Utc::now())?;
    let bytes = store.get(&key)?;
    tracing::debug!(key = %key, size = bytes.len(), "Signed object served");
    Ok(([(header::CONTENT_TYPE, content_type(&key))], bytes))
}
