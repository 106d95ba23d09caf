mod config;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use atlas_api::{AppState, AppStateInner};
use atlas_db::Database;

use crate::config::{AdminSeed, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "atlas_server=debug,atlas_api=debug,atlas_gateway=debug,atlas_db=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    info!("Starting with {:?}", config);

    let db = Database::open(&config.db_path)?;
    let state = AppStateInner::new(db, config.jwt_secret.clone())
        .with_token_ttl(chrono::Duration::hours(config.token_ttl_hours))
        .into_state();

    if let Some(seed) = &config.admin {
        provision_admin(&state, seed)?;
    }

    let gateway = atlas_gateway::router(state.dispatcher.clone());

    let app = atlas_api::router(state)
        .merge(gateway)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Atlas server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Admins are never created over HTTP; this is the only way in.
fn provision_admin(state: &AppState, seed: &AdminSeed) -> anyhow::Result<()> {
    let hash = state.hash_password(&seed.password)?;
    let admin = state.db.ensure_admin(&seed.username, &hash)?;
    info!("Admin account {} ({}) provisioned", admin.username, admin.id);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
