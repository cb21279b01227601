use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commerce_notification_service::config::{LoggingConfig, Settings};
use commerce_notification_service::postgres::PostgresPool;
use commerce_notification_service::server::{create_app, AppState};
use commerce_notification_service::triggers::{EventHandler, RedisSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    init_tracing(&settings.logging);
    tracing::info!(storage = %settings.storage.backend, "Configuration loaded");

    // PostgreSQL is only needed by the postgres storage backend
    let postgres_pool = if settings.storage.backend == "postgres" {
        let pool = PostgresPool::new(&settings.database).await?;
        if settings.database.run_migrations {
            pool.run_migrations().await?;
            tracing::info!("Database migrations applied");
        }
        Some(Arc::new(pool))
    } else {
        None
    };

    // Create application state
    let state = AppState::new(settings.clone(), postgres_pool.clone());

    match state.template_store.seed_defaults().await {
        Ok(seeded) => tracing::info!(seeded, "Default templates checked"),
        Err(e) => tracing::error!(error = %e, "Failed to seed default templates"),
    }
    if let Err(e) = state.template_store.refresh_metrics().await {
        tracing::warn!(error = %e, "Failed to refresh template metrics");
    }
    tracing::info!("Application state initialized");

    // Domain event subscriber
    let (shutdown_tx, redis_handle) = if settings.events.enabled {
        let handler = Arc::new(EventHandler::new(
            state.dispatcher.clone(),
            settings.events.clone(),
        ));
        let redis_subscriber = RedisSubscriber::new(
            settings.redis.clone(),
            handler,
            state.redis_health.clone(),
        );
        let shutdown_tx = redis_subscriber.shutdown_signal();

        let handle = tokio::spawn(async move {
            if let Err(e) = redis_subscriber.start().await {
                tracing::error!(error = %e, "Redis subscriber failed");
            }
        });
        (shutdown_tx, Some(handle))
    } else {
        tracing::info!("Event subscriber disabled");
        (tokio::sync::broadcast::channel(1).0, None)
    };

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    if let Some(handle) = redis_handle {
        let _ = handle.await;
    }

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Send shutdown signal to background tasks
    let _ = shutdown_tx.send(());
}
