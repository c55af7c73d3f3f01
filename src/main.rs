use std::process::ExitCode;
use std::sync::Arc;

use agcert_lib::config::{self, AppConfig};
use agcert_lib::core_state::CoreState;
use agcert_lib::{api, init_tracing};

fn main() -> ExitCode {
    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // The blocking OCR client must be built outside the async runtime.
    let core = match CoreState::from_config(config) {
        Ok(core) => Arc::new(core),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start async runtime");
            return ExitCode::FAILURE;
        }
    };

    // `core` is released here, after the runtime, so the blocking client is
    // never dropped on an async worker.
    let result = runtime.block_on(serve(Arc::clone(&core)));
    drop(runtime);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(core: Arc<CoreState>) -> std::io::Result<()> {
    let addr = core.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "API listening");

    axum::serve(listener, api::api_router(core))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await
}
