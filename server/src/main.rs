use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stagecast_server::config::ServerConfig;
use stagecast_server::db::pool::{create_pool, run_migrations};
use stagecast_server::hub::Hub;
use stagecast_server::web::app_state::AppState;
use stagecast_server::web::router::build_router;

#[derive(Parser)]
#[command(name = "stagecast-server", about = "Realtime broadcast hub")]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "stagecast.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config)?;

    let pool = create_pool(&config.database.url).await?;
    run_migrations(&pool).await?;

    let (hub, handle) = Hub::new(pool.clone(), config.attachment_limits());
    tokio::spawn(hub.run());

    let app_state = Arc::new(AppState {
        hub: handle,
        db: pool,
    });
    let app = build_router(app_state);

    info!("Stagecast server starting on {}", config.server.address);

    let listener = tokio::net::TcpListener::bind(&config.server.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
