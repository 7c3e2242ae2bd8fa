//! HTTP server entry point.
//!
//! # Responsibility
//! - Load configuration, start logging and open the contact database once.
//! - Serve the router until Ctrl-C, then close the database.

use identity_core::db::open_db;
use identity_core::{core_version, init_logging, logging_status, LoggingConfig};
use identity_server::{router, AppState, ServerConfig};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    let logging = LoggingConfig::new(config.log_level.as_str(), config.log_dir.as_path());
    init_logging(&logging.with_stderr(true))?;
    if let Some((level, log_dir)) = logging_status() {
        info!(
            "event=logging_ready module=server status=ok level={level} log_dir={}",
            log_dir.display()
        );
    }

    let conn = open_db(&config.db_path)?;
    let state = Arc::new(AppState::new(conn)?);
    let app = router(state);

    info!(
        "event=server_start module=server status=ok addr={} db_path={} version={}",
        config.bind_addr,
        config.db_path.display(),
        core_version()
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("event=server_stop module=server status=ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("event=signal_listen module=server status=error error={err}");
        // Without a signal handler, run until the process is killed.
        std::future::pending::<()>().await;
    }
}
