use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stitchbook::config::Config;
use stitchbook::directory::InMemoryDirectory;
use stitchbook::engine::{Collaborators, Engine};
use stitchbook::{api, reaper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    stitchbook::observability::init(config.metrics_port);

    std::fs::create_dir_all(&config.data_dir)?;

    let mut collaborators = Collaborators::default();
    if let Some(path) = &config.directory_path {
        let directory = InMemoryDirectory::from_json_file(path)?;
        info!("loaded {} tailors from {}", directory.len(), path.display());
        collaborators.directory = Arc::new(directory);
    }

    let engine = Arc::new(Engine::new(config.wal_path(), collaborators)?);

    tokio::spawn(reaper::run_reminders(engine.clone(), config.reminder_interval));
    tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("stitchbook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_in_flight: {}", config.max_in_flight);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let app = api::router(engine, config.max_in_flight);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("stitchbook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM; in-flight requests drain before `serve` returns.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
