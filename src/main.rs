//! MedShield Security Monitor server binary

use std::net::SocketAddr;
use std::sync::Arc;

use medshield_monitor::monitor::SecurityMonitor;
use medshield_monitor::{create_router, AppState, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medshield_monitor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("MedShield Security Monitor starting...");
    tracing::info!(
        "Scorer: {} {}",
        config.monitor.scorer.program,
        config.monitor.scorer.scripts_dir.display()
    );

    let monitor = Arc::new(SecurityMonitor::new(config.monitor.clone()));
    if config.monitor.auto_start {
        monitor.start_monitoring();
    }
    Arc::clone(&monitor).spawn_analysis_loop();

    let state = AppState {
        monitor,
        config: config.clone(),
    };
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
