mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use catsync_engine::SyncEngine;

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(catsync_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = catsync_db::PoolConfig::from_app_config(&config);
    let pool = catsync_db::connect_pool(&config.database_url, pool_config).await?;
    catsync_db::run_migrations(&pool).await?;

    let storefronts = catsync_core::load_storefronts(&config.storefronts_path)?;
    let enabled = storefronts.enabled().len();
    tracing::info!(
        total = storefronts.storefronts.len(),
        enabled,
        "storefront registry loaded"
    );

    let engine = Arc::new(SyncEngine::new(
        pool.clone(),
        Arc::clone(&config),
        storefronts.storefronts,
    ));

    let _scheduler = scheduler::build_scheduler(Arc::clone(&engine), Arc::clone(&config)).await?;

    let app = build_app(AppState { pool, engine });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "catsync server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
