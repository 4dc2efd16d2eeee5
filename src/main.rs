use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use flashcards_core::config::Config;
use flashcards_core::db::SqliteKvStore;
use flashcards_core::logging::init_tracing;
use flashcards_core::routes;
use flashcards_core::state::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };
    let log_guards = init_tracing(&config.log_level, config.log_dir.as_deref());
    if log_guards.writes_files() {
        tracing::info!(dir = ?config.log_dir, "writing log files");
    }

    let store = match SqliteKvStore::open(&config.db_path).await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, path = %config.db_path.display(), "failed to open store");
            std::process::exit(1);
        }
    };

    let app = routes::router(AppState::new(Arc::new(store.clone())))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, db = %config.db_path.display(), "sync server listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server error");
    }

    // Checkpoints the WAL so the database file is complete on its own.
    store.pool().close().await;
    tracing::info!("sync server stopped");
}

/// Resolves on Ctrl+C or SIGTERM. A signal that cannot be watched is logged
/// and ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl+C received; finishing in-flight syncs"),
            Err(err) => {
                tracing::warn!(error = %err, "cannot watch Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("SIGTERM received; finishing in-flight syncs");
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot watch SIGTERM");
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
