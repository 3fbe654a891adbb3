//! Command-line server for the Filen WebDAV gateway.
//!
//! Wires configuration (flags over an optional JSON config file), logging
//! (stderr plus a rolling file under the platform log directory), and the
//! gateway itself, then serves until SIGINT/SIGTERM.
//!
//! The storage SDK is linked by the embedding application; this binary runs
//! the gateway against the bundled in-memory store, which is what protocol
//! debugging against Finder, Explorer, and rclone needs.

use anyhow::{Context, Result};
use clap::Parser;
use filen_webdav::sdk::memory::{MemoryClient, MemoryLogin};
use filen_webdav::{AuthMode, ServerConfig, Tenancy, WebDavServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// WebDAV gateway for Filen's end-to-end-encrypted cloud storage
#[derive(Parser, Debug)]
#[command(name = "filen-webdav", version)]
struct Args {
    /// Bind address
    #[arg(long)]
    hostname: Option<String>,

    /// Bind port
    #[arg(long)]
    port: Option<u16>,

    /// Serve HTTPS with a cached self-signed certificate
    #[arg(long)]
    https: bool,

    /// Authentication mode (basic or digest)
    #[arg(long, value_enum)]
    auth_mode: Option<CliAuthMode>,

    /// Username for single-tenant mode
    #[arg(long, env = "WEBDAV_USERNAME")]
    username: Option<String>,

    /// Password for single-tenant mode
    #[arg(long, env = "WEBDAV_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Run multi-tenant: credentials arrive inside the Basic password
    #[arg(long, conflicts_with_all = ["username", "password"])]
    proxy: bool,

    /// Glob of paths served from local disk instead of the store
    /// (e.g. "*.DS_Store"); repeatable
    #[arg(long = "temp-file-glob")]
    temp_file_globs: Vec<String>,

    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Suppress the rolling file log
    #[arg(long)]
    disable_logging: bool,

    /// Verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliAuthMode {
    Basic,
    Digest,
}

fn init_logging(disable_file_log: bool, verbose: u8) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("filen_webdav={level},filen_webdav_cli={level}")));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if disable_file_log {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init()
            .context("logging init")?;
        return Ok(None);
    }

    let log_dir = dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("@filen")
        .join("logs");
    std::fs::create_dir_all(&log_dir).context("create log directory")?;
    let appender = tracing_appender::rolling::daily(&log_dir, "webdav");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("logging init")?;
    Ok(Some(guard))
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => ServerConfig::default(),
    };

    if let Some(hostname) = &args.hostname {
        config.hostname = hostname.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.https {
        config.https = true;
    }
    if let Some(mode) = args.auth_mode {
        config.auth_mode = match mode {
            CliAuthMode::Basic => AuthMode::Basic,
            CliAuthMode::Digest => AuthMode::Digest,
        };
    }
    if !args.temp_file_globs.is_empty() {
        config.temp_files_to_store_on_disk = args.temp_file_globs.clone();
    }
    if args.disable_logging {
        config.disable_logging = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _log_guard = init_logging(config.disable_logging || args.disable_logging, args.verbose)?;

    let tenancy = if args.proxy {
        let login = MemoryLogin::new();
        info!("running in proxy mode against the in-memory store");
        Tenancy::Proxy { login }
    } else {
        let username = args.username.clone().unwrap_or_else(|| "admin".to_string());
        let password = args
            .password
            .clone()
            .context("--password (or WEBDAV_PASSWORD) is required in single-tenant mode")?;
        Tenancy::Single {
            client: MemoryClient::new(username.clone()),
            username,
            password,
        }
    };

    let server = WebDavServer::start(config, tenancy)
        .await
        .context("start server")?;
    info!(url = %server.url(), "gateway ready; mount it with any WebDAV client");

    wait_for_shutdown().await;
    info!("shutting down");
    server.stop(false).await;
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
