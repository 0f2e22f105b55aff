//! notenav: index a notes vault with every content provider.
//!
//! Reconciles the vault directory with the SQLite file store, runs all
//! processors until their queues and retries drain, then prints how many
//! notes each provider has processed. Ctrl-C stops processing; results of
//! batches already written are kept.

mod config;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notenav_content::{ContentService, FsVault, ProcessorEvent};
use notenav_core::{logging, ContentType, FileDatabase, ShutdownFlag};
use notenav_db::Database;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _file_guard = init_tracing();

    let config = AppConfig::from_env()?;
    info!(
        subsystem = logging::SUBSYSTEM_CLI,
        vault = %config.vault_path.display(),
        database_url = %config.database_url,
        batch_size = config.processor.batch_size,
        parallel_limit = config.processor.parallel_limit,
        "Configuration loaded"
    );

    let db = Database::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;

    let shutdown = ShutdownFlag::new();
    let service = ContentService::with_default_providers(
        db.files.clone(),
        Arc::new(FsVault::new(&config.vault_path)),
        config.read_cache_capacity,
        Arc::new(shutdown.clone()),
        config.processor.clone(),
    );
    let mut receivers: Vec<_> = service.processors().iter().map(|p| p.events()).collect();

    let started = Instant::now();
    let files = service.reconcile().await?;
    service.start(config.settings.clone());
    service.queue_files(&files);

    let interrupted = tokio::select! {
        _ = service.settle() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        warn!(subsystem = logging::SUBSYSTEM_CLI, "Interrupted, stopping processors");
        shutdown.trigger();
    }
    service.stop();
    service.wait_for_idle().await;

    let exhausted: usize = receivers.iter_mut().map(count_exhausted).sum();
    info!(
        subsystem = logging::SUBSYSTEM_CLI,
        files = files.len(),
        exhausted,
        interrupted,
        duration_ms = started.elapsed().as_millis() as u64,
        "Content processing finished"
    );

    print_summary(&service, files.len(), exhausted);
    db.pool.close().await;
    Ok(())
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: `logging::DEFAULT_FILTER`)
///
/// The returned guard must live until exit so buffered file output is flushed.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging::DEFAULT_FILTER.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("notenav.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        subsystem = logging::SUBSYSTEM_CLI,
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Files dropped after exhausting their retries, from buffered events.
fn count_exhausted(rx: &mut tokio::sync::broadcast::Receiver<ProcessorEvent>) -> usize {
    let mut count = 0;
    loop {
        match rx.try_recv() {
            Ok(ProcessorEvent::RetryExhausted { .. }) => count += 1,
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    count
}

fn print_summary(service: &ContentService, total: usize, exhausted: usize) {
    let store = service.store();
    let records: Vec<_> = store
        .paths()
        .into_iter()
        .filter_map(|path| store.get_file(&path))
        .collect();

    println!("Indexed {total} files");
    for kind in ContentType::ALL {
        let processed = records
            .iter()
            .filter(|data| data.processed_mtime(kind).is_some())
            .count();
        println!("  {:<16} {processed}", kind.as_str());
    }
    if exhausted > 0 {
        println!("  {exhausted} file(s) failed after all retries");
    }
}
