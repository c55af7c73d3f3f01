pub mod api;
pub mod applications;
pub mod audit;
pub mod certification;
pub mod config;
pub mod core_state;
pub mod db;
pub mod documents;
pub mod error;
pub mod fields;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod registry;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
