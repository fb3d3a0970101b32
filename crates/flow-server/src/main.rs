use std::sync::Arc;

use flow_server::{build_app, AppState, ServerConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run().await {
        log::error!("flow-server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load()?;
    let state = AppState::from_config(&config)?;
    log::info!(
        "Serving {} workflows with {} node types",
        state.controller.catalog().len(),
        state.controller.registry().len()
    );

    let app = build_app(Arc::new(state));
    let listener = TcpListener::bind(&config.bind_addr).await?;
    log::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        })
        .await?;
    Ok(())
}
