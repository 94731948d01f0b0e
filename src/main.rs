use anyhow::{Context, Result};
use axum::serve;
use routeguard::core::config::Config;
use routeguard::core::routes::build_router;
use routeguard::core::startup::{open_database, seed_bootstrap_admin};
use routeguard::core::state::AppState;
use routeguard::core::tracing_init::init_tracing;
use routeguard::utils::time::current_timestamp;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, info, Level};

fn main() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    // Load and validate configuration
    let config = Config::from_file(&config_path).context(format!(
        "Failed to load configuration from '{}'. \
        If this is your first run, copy config.example.toml to config.toml and adjust the values.",
        config_path.display()
    ))?;

    init_tracing(&config.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        bind = %config.server.bind,
        port = config.server.port,
        num_threads = config.server.num_threads,
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "routeguard starting"
    );

    let database = open_database(&config)?;
    seed_bootstrap_admin(&config, &database).await?;

    let state = Arc::new(AppState::new(config.clone(), database));

    spawn_cleanup_task(Arc::clone(&state));
    info!(
        cleanup_interval_seconds = config.performance.cleanup_interval,
        "Cleanup task started"
    );

    let app = build_router(Arc::clone(&state)).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        ),
    );

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind TCP listener to {}", addr))?;

    info!(
        address = %addr,
        users = state.database.user_count(),
        grants = state.database.grant_count(),
        "routeguard listening"
    );

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("Shutting down gracefully");

    Ok(())
}

/// Periodically drop expired tokens and stale login throttle entries
fn spawn_cleanup_task(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.performance.cleanup_interval);
    let token_ttl = state.config.auth.token_ttl();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            let now = current_timestamp();
            let expired_tokens = state.tokens.purge_expired(now, token_ttl);
            state.throttle.cleanup_old_entries(now);

            if expired_tokens > 0 {
                info!(
                    expired_tokens,
                    active_tokens = state.tokens.len(),
                    "Token cleanup completed"
                );
            } else {
                debug!(throttled_addresses = state.throttle.len(), "Cleanup completed");
            }
        }
    });
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
