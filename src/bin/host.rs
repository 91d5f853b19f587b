//! Tabwarden worker binary.
//!
//! Started by the browser shim, which speaks newline-delimited JSON on this
//! process's stdin/stdout. All tracing output goes to stderr (and optionally
//! a daily log file) so that stdout remains a clean protocol channel.

use anyhow::Context;
use tabwarden::WardenConfig;
use tabwarden::host::run_stdio_bridge;
use tabwarden::warden_dirs;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn load_config() -> anyhow::Result<WardenConfig> {
    let path = warden_dirs::config_file();
    if !path.exists() {
        WardenConfig::default()
            .save_to_file(&path)
            .with_context(|| format!("failed to write default config to {}", path.display()))?;
        anyhow::bail!(
            "wrote default config to {}; set remote.project_id and remote.api_key, then restart",
            path.display()
        );
    }
    let config = WardenConfig::from_file(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config in {}", path.display()))?;
    Ok(config)
}

/// Install the global subscriber. The returned guard flushes the file
/// writer and must live until exit.
fn init_tracing(
    config: &WardenConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if !config.logging.file {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return Ok(None);
    }

    let log_dir = warden_dirs::logs_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tabwarden.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _guard = init_tracing(&config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tabwarden-host starting");

    run_stdio_bridge(config).await.map_err(|e| {
        tracing::error!(error = %e, "tabwarden-host exited with error");
        anyhow::anyhow!("tabwarden-host failed: {e}")
    })?;

    tracing::info!("tabwarden-host shut down cleanly");
    Ok(())
}
