//! Tracing setup for the sync server.
//!
//! Everything goes to stdout. With a log directory configured, server events
//! also go to `sync-server.log` and entries posted to `/api/logs` go to
//! `client.log`, both rotated daily.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Target used for entries forwarded by clients.
pub const CLIENT_LOG_TARGET: &str = "client";

const SERVER_LOG_FILE: &str = "sync-server.log";
const CLIENT_LOG_FILE: &str = "client.log";

/// Keeps the background file writers alive; drop it last.
pub struct LogGuards {
    guards: Vec<WorkerGuard>,
}

impl LogGuards {
    pub fn writes_files(&self) -> bool {
        !self.guards.is_empty()
    }
}

pub fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> LogGuards {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    let log_dir = log_dir.filter(|dir| match std::fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(err) => {
            eprintln!("failed to create log directory {}: {err}", dir.display());
            false
        }
    });

    let mut guards = Vec::new();
    let (server_layer, client_layer) = match log_dir {
        Some(dir) => {
            let (server_writer, server_guard) =
                tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, dir, SERVER_LOG_FILE));
            let (client_writer, client_guard) =
                tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, dir, CLIENT_LOG_FILE));
            guards.push(server_guard);
            guards.push(client_guard);

            let server = fmt::layer()
                .with_writer(server_writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter_fn(|meta| meta.target() != CLIENT_LOG_TARGET));
            let client = fmt::layer()
                .with_writer(client_writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter_fn(|meta| meta.target() == CLIENT_LOG_TARGET));
            (Some(server), Some(client))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(server_layer)
        .with(client_layer)
        .init();

    LogGuards { guards }
}
