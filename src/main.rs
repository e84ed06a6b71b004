use std::sync::Arc;

use kvline::config::Config;
use kvline::engine::Engine;
use kvline::protocol::Executor;
use kvline::server::TcpServer;
use kvline::storage::Storage;
use kvline::wal::Wal;
use kvline::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().await?;
    init_logging(&config);

    info!(version = kvline::VERSION, "starting kvline");

    let engine = Arc::new(Engine::new());
    let storage = if config.wal.enabled {
        let wal = Arc::new(Wal::new(
            std::path::PathBuf::from(&config.wal.data_directory),
            config.wal.max_segment_size.as_u64(),
            config.wal.flushing_batch_size as usize,
            config.wal.flushing_batch_timeout,
        ));
        Storage::new(Arc::clone(&engine), wal)
    } else {
        Storage::without_wal(Arc::clone(&engine))
    };
    let storage = Arc::new(storage);

    let cancel = CancellationToken::new();
    let wal_handle = storage.start(cancel.clone()).await?;

    let executor = Arc::new(Executor::new(Arc::clone(&storage)));
    let server = TcpServer::new(&config.network).await?;

    info!(address = %config.network.address, "listening");
    let serve_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        server.serve(serve_cancel, executor).await;
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining connections and WAL");
    cancel.cancel();

    if let Err(e) = server_handle.await {
        error!(error = %e, "accept loop task panicked");
    }

    if let Some(handle) = wal_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "WAL flusher task panicked before its final drain completed");
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_writer(log_writer(&config.logging.output))
        .init();
}

fn log_writer(output: &str) -> BoxMakeWriter {
    if output == "stdout" {
        return BoxMakeWriter::new(std::io::stdout);
    }

    let path = output.to_string();
    BoxMakeWriter::new(move || {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .expect("failed to open logging.output file")
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
