//! WebHands - browser automation transport and CDP relay.
//!
//! `webhands run` executes a browser request (JSON from a file or stdin) and
//! prints the structured summary. `webhands relay` serves the CDP relay until
//! interrupted.

mod config;

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webhands_browser::BrowserRunner;
use webhands_protocols::BrowserRequest;
use webhands_relay::RelayServer;

use config::WebHandsConfig;

/// WebHands CLI.
#[derive(Parser)]
#[command(name = "webhands")]
#[command(about = "Browser automation transport and CDP relay")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    config: PathBuf,

    /// Directory for rolling log files (stderr only when unset)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a browser request and print its summary as JSON
    Run {
        /// Request JSON file; "-" reads stdin
        #[arg(default_value = "-")]
        request: String,

        /// Override headless mode
        #[arg(long)]
        headless: Option<bool>,

        /// Use a named persistent profile
        #[arg(long)]
        profile: Option<String>,
    },

    /// Serve the CDP relay until interrupted
    Relay {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the bind port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_ref());

    let config = WebHandsConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run {
            request,
            headless,
            profile,
        } => run_request(config, &request, headless, profile).await,
        Commands::Relay { host, port } => run_relay(config, host, port).await,
    }
}

fn init_tracing(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "webhands.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            None
        }
    }
}

async fn run_request(
    config: WebHandsConfig,
    request_arg: &str,
    headless: Option<bool>,
    profile: Option<String>,
) -> anyhow::Result<()> {
    let body = if request_arg == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed to read request from stdin")?;
        body
    } else {
        std::fs::read_to_string(request_arg)
            .with_context(|| format!("failed to read request file {}", request_arg))?
    };

    let mut request: BrowserRequest =
        serde_json::from_str(&body).context("invalid browser request JSON")?;
    if headless.is_some() {
        request.headless = headless;
    }
    if profile.is_some() {
        request.browser_profile = profile;
    }

    let runner = BrowserRunner::new(config.browser_config());
    let summary = runner.run(&request).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_relay(
    config: WebHandsConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut relay_config = config.relay.config.clone();
    if let Some(host) = host {
        relay_config.host = host;
    }
    if let Some(port) = port {
        relay_config.port = port;
    }

    let server = RelayServer::new(relay_config);
    let addr = server.start().await?;
    info!(addr = %addr, "relay serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    server.stop().await;
    info!("relay stopped");
    Ok(())
}
