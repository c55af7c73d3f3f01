//! Caller identity from request headers.
//!
//! Identity is established upstream (gateway / SSO); this layer only reads
//! `x-actor-id` and `x-actor-role` and injects an `Actor` into request
//! extensions for the handlers. Missing or malformed headers are a 401.

use std::str::FromStr;

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::models::enums::ActorRole;
use crate::models::Actor;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

pub async fn require_actor(mut req: Request<axum::body::Body>, next: Next) -> Response {
    match actor_from_headers(req.headers()) {
        Ok(actor) => {
            req.extensions_mut().insert(actor);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

/// Parse the caller. The pipeline's own `system` role is never accepted
/// from outside.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))
    };

    let id = Uuid::parse_str(header(ACTOR_ID_HEADER)?)
        .map_err(|_| ApiError::Unauthorized(format!("{ACTOR_ID_HEADER} is not a UUID")))?;
    if id.is_nil() {
        return Err(ApiError::Unauthorized(format!("{ACTOR_ID_HEADER} is not a valid identity")));
    }

    let role_raw = header(ACTOR_ROLE_HEADER)?.to_ascii_lowercase();
    let role = match ActorRole::from_str(&role_raw) {
        Ok(ActorRole::System) | Err(_) => {
            return Err(ApiError::Unauthorized(format!("unknown role '{role_raw}'")))
        }
        Ok(role) => role,
    };

    Ok(Actor { id, role })
}
