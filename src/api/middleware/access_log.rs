//! Request access logging.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::models::Actor;

/// Log every API request once it has been answered. Runs after the actor
/// middleware so the identity is available.
pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let actor = req.extensions().get::<Actor>().copied();
    let started = std::time::Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match actor {
        Some(a) => tracing::info!(actor = %a.id, role = %a.role, %method, path = %path, status, elapsed_ms, "API request"),
        None => tracing::info!(%method, path = %path, status, elapsed_ms, "API request"),
    }
    response
}
