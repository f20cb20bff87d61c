//! # Tastemap Binary
//!
//! Assembles the application from the plugins selected at compile time.

use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use tm_api::AppState;
use tm_auth_simple::SimpleAuthProvider;
use tm_config::{LogFormat, LogSettings, Settings};
use tm_services::SearchSettings;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-postgres")]
use tm_db_postgres::PgStore;

#[cfg(all(feature = "db-memory", not(feature = "db-postgres")))]
use tm_db_memory::MemoryStore;

#[cfg(not(any(feature = "db-postgres", feature = "db-memory")))]
compile_error!("enable one storage feature: `db-postgres` or `db-memory`");

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    match log.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);
    info!(env = %settings.environment, "settings loaded");

    // 1. Auth
    let auth = Arc::new(SimpleAuthProvider::new(
        settings.auth.session_secret.expose_secret().as_bytes(),
        chrono::Duration::hours(settings.auth.session_ttl_hours),
    )?);

    // 2. Storage
    #[cfg(feature = "db-postgres")]
    let store = {
        let store = PgStore::connect(
            settings.database.url.expose_secret(),
            settings.database.max_connections,
            settings.database.acquire_timeout(),
        )
        .await?;
        store.migrate().await?;
        info!("postgres store ready");
        Arc::new(store)
    };

    #[cfg(all(feature = "db-memory", not(feature = "db-postgres")))]
    let store = {
        info!("using the in-memory store; data is lost on exit");
        Arc::new(MemoryStore::new())
    };

    // 3. Services and routes
    let search = SearchSettings {
        default_limit: settings.search.default_limit,
        max_limit: settings.search.max_limit,
        tag_filter: settings.search.tag_filter,
    };
    let state = AppState::new(store, auth, search);
    let app = tm_api::router(state, settings.server.request_timeout());

    let address = settings.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("tastemap listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
