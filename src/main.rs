use anyhow::Result;
use momentum_screener::analysis;
use momentum_screener::storage_utils::{AppConfig, AsyncStorageManager};
use momentum_screener::tui;
use std::path::Path;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "momentum-screener.log";

/// The interactive UI owns the terminal, so its logs go to a file instead of stderr.
fn init_tracing(interactive: bool, log_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if interactive {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(non_blocking_file).with_ansi(false))
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .init();
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let plain = std::env::args().skip(1).any(|arg| arg == "--plain");

    let storage = AsyncStorageManager::new_relative("storage").await?;
    let _guard = init_tracing(!plain, &storage.base_dir.join("logs"))?;

    let config: AppConfig = storage.load_or_init("config").await?;
    config.thresholds.validate()?;
    info!(config = %storage.path_for("config").display(), "Loaded configuration");

    if !plain {
        tui::run_tui(config).await?;
        return Ok(());
    }

    println!("Fetching data...");
    let report = match analysis::run_scan(&config, config.thresholds).await {
        Ok(report) => report,
        Err(e) => {
            error!(kind = e.kind(), "Scan failed: {}", e);
            return Err(e.into());
        }
    };
    momentum_screener::comfy_table::run(&report);

    Ok(())
}
