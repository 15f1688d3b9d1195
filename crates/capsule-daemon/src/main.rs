mod config;
mod sweep;

use capsule_store::{Notification, SqliteBackend, Store};
use tracing::{debug, info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capsuled=info,capsule_store=info,capsule_auth=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let backend = SqliteBackend::open(&config.db_path)?;
    for row in backend.list_documents()? {
        info!(
            key = %row.key,
            revision = row.revision,
            updated_at = %row.updated_at,
            "Found document"
        );
    }
    let store = Store::new(backend);
    info!(
        "Capsule store ready: {} users, {} capsules",
        store.users().len(),
        store.capsules().len()
    );

    // Trace every document write made through this process
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        while let Some(notification) = changes.recv().await {
            match notification {
                Notification::Changed(event) => {
                    debug!(key = %event.key, revision = event.revision, "Document changed")
                }
                Notification::Lagged(missed) => warn!("Change log lagged, {} events missed", missed),
            }
        }
    });

    info!("Unlock sweep every {}s", config.sweep_interval_secs);
    tokio::select! {
        _ = sweep::run_sweep_loop(store, config.sweep_interval_secs) => {}
        _ = shutdown_signal() => {}
    }

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
                warn!("Failed to install SIGTERM handler: {}", e);
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
