use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use cortex_chat_server::config::Settings;
use cortex_chat_server::services::CortexClient;
use cortex_chat_server::{build_router, build_state};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,cortex_chat_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting Cortex Chat Server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let client = Arc::new(CortexClient::new(settings.platform.clone())?);
    info!("✅ Platform client ready for {}", settings.platform.base_url);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let idle_timeout = Duration::from_secs(settings.session.idle_timeout_seconds);

    let state = build_state(settings, client.clone(), client);

    // Idle session cleanup
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(idle_timeout.min(Duration::from_secs(60)));
        loop {
            interval.tick().await;
            registry.cleanup_idle(idle_timeout);
        }
    });
    info!("✅ Idle session cleanup every {:?}", idle_timeout.min(Duration::from_secs(60)));

    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
