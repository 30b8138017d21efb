//! Pangool gateway: the tablet talks to this process, which talks to the model, the
//! speakers and the microphone pipeline.

mod app;
mod logging;
mod routes;

use pangool_core::PangoolConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = PangoolConfig::load()?;
    let _log_guard = logging::init(&config.logging)?;

    info!(
        target: "pangool::gateway",
        model = %config.inference.model,
        backend = %config.inference.base_url,
        token_mode = ?config.inference.token_mode,
        "Pangool oracle starting"
    );

    let state = app::AppState::from_config(&config)?;
    let app = app::build_app(state, &config.server.frontend_dist);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(target: "pangool::gateway", "Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!(target: "pangool::gateway", "Shutdown requested (Ctrl+C)");
        })
        .await?;

    Ok(())
}
