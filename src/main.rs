#![forbid(unsafe_code)]

//! `bot-gateway` binary — bootstraps configuration, the alias hot-reload
//! watcher, and the [`Gateway`] itself.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use bot_gateway::config::GlobalConfig;
use bot_gateway::config_watch::AliasWatcher;
use bot_gateway::gateway::Gateway;
use bot_gateway::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bot-gateway", about = "Chat-to-worker bridge gateway", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the IPC Unix-domain-socket path.
    #[arg(long)]
    ipc_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("bot-gateway bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config_text = std::fs::read_to_string(&args.config).map_err(|err| {
        AppError::Config(format!(
            "cannot read config file '{}': {err} — copy config.toml next to the binary, \
             or pass --config <path>",
            args.config.display()
        ))
    })?;
    let mut config = GlobalConfig::from_toml_str(&config_text)?;

    if let Some(ipc_path) = args.ipc_path {
        config.ipc_socket_path = ipc_path;
    }

    config.load_credentials()?;

    if !config.has_any_adapter() {
        return Err(AppError::Config(
            "no chat adapter configured; add at least one of [telegram]/[discord]/[slack]/[lark]/[messenger] to the config".into(),
        ));
    }

    let config = Arc::new(config);
    info!("configuration loaded");

    let gateway = Arc::new(Gateway::new(Arc::clone(&config))?);

    let _alias_watcher = AliasWatcher::start(&args.config, gateway.registry())
        .await
        .map_err(|err| {
            error!(%err, "alias hot-reload watcher failed to start; continuing without it");
            err
        })
        .ok();

    let handle = gateway.start().await?;
    info!("bot-gateway ready");

    shutdown_signal().await;
    info!("shutdown signal received — starting graceful shutdown");

    tokio::spawn(async {
        shutdown_signal().await;
        error!("second shutdown signal received — forcing exit");
        std::process::exit(1);
    });

    gateway.stop(handle).await;
    info!("bot-gateway shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
