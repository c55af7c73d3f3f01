//! HTTP surface.
//!
//! Thin axum layer over the service modules. Routes live under `/api/` and
//! require actor headers; `/objects/` serves signed binaries without them.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod types;

pub use router::api_router;
pub use types::ApiContext;
