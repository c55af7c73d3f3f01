//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//!
//! Middleware stack (outermost to innermost):
//! 1. Trace + `Cache-Control: no-store` → 2. Actor extraction → 3. Access log

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Endpoint handlers use `State<ApiContext>`; the actor middleware injects
/// `Extension<Actor>` for them.
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/applications",
            get(endpoints::applications::list).post(endpoints::applications::create),
        )
        .route("/applications/:id", get(endpoints::applications::overview))
        .route("/applications/:id/status", post(endpoints::applications::advance))
        .route("/applications/:id/readiness", get(endpoints::applications::readiness))
        .route("/applications/:id/certify", post(endpoints::applications::certify))
        .route(
            "/applications/:id/audit-requests",
            post(endpoints::applications::request_audit),
        )
        .route(
            "/applications/:id/documents",
            get(endpoints::documents::list).post(endpoints::documents::upload),
        )
        .route("/applications/:id/fields", get(endpoints::fields::list))
        .route(
            "/applications/:id/fields/:module/:field",
            put(endpoints::fields::set_value),
        )
        .route("/applications/:id/audit", get(endpoints::audit::list))
        .route("/applications/:id/audit/export", get(endpoints::audit::export_csv))
        .route("/documents/:id", get(endpoints::documents::detail))
        .route("/documents/:id/process", post(endpoints::documents::process))
        .route("/documents/:id/audited", post(endpoints::documents::mark_audited))
        .route("/documents/:id/manual-entry", post(endpoints::documents::manual_entry))
        .route("/documents/:id/url", get(endpoints::documents::signed_url))
        .route("/fields/:id/verify", post(endpoints::fields::verify))
        .with_state(ctx.clone())
        // Innermost first
        .layer(axum::middleware::from_fn(middleware::access_log::log_access))
        .layer(axum::middleware::from_fn(middleware::actor::require_actor));

    let objects = Router::new()
        .route("/objects/*key", get(endpoints::objects::fetch))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected)
        .merge(objects)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
}
