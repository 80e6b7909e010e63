use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfarer_core::Hub;

use wayfarer_server::{
    build_router,
    infra::{
        app_state::AppState,
        config::{Config, ConfigLoader, ConfigLoaderOptions, ConfigOverrides},
    },
    worker,
};

const HUB_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "wayfarer-server")]
#[command(about = "Live directory listings and file operations over WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Quiet period before a changed directory is rescanned, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Fill the mime field of listed files from their extension
    #[arg(long)]
    sniff_mime: Option<bool>,

    /// Program that runs operations (defaults to this binary's worker subcommand)
    #[arg(long)]
    worker_program: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one operation and print its JSON result
    Worker {
        /// Operation name
        name: String,
        /// Operation parameters as JSON
        parameters: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Worker { name, parameters }) => run_worker(&name, &parameters),
        None => match run_server(cli.serve) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(stderr_only: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    if stderr_only {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Stdout carries the result line only; logs go to stderr.
fn run_worker(name: &str, parameters: &str) -> ExitCode {
    init_tracing(true);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start worker runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(worker::run(name, parameters)) {
        Ok(result) => {
            let line = match serde_json::to_string(&result) {
                Ok(line) => line,
                Err(err) => {
                    error!(error = %err, "failed to encode result");
                    return ExitCode::FAILURE;
                }
            };
            let mut stdout = std::io::stdout().lock();
            if writeln!(stdout, "{line}").and_then(|_| stdout.flush()).is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(command = %name, error = %err, "worker failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let options = ConfigLoaderOptions {
        config_path: args.config.clone(),
        env_file: args.env_file.clone(),
        overrides: ConfigOverrides {
            host: args.host.clone(),
            port: args.port,
            debounce_ms: args.debounce_ms,
            sniff_mime: args.sniff_mime,
            worker_program: args.worker_program.clone(),
        },
    };
    ConfigLoader::with_options(options)
        .load()
        .context("failed to load configuration")
}

#[tokio::main]
async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    init_tracing(false);

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    match &config.metadata.config_path {
        Some(path) => info!(path = %path.display(), "configuration loaded from file"),
        None => info!("no wayfarer.toml found; using environment and defaults"),
    }

    let hub_config = config
        .hub_config()
        .context("failed to resolve worker program")?;
    info!(
        program = %hub_config.launcher.program().display(),
        debounce_ms = config.watch.debounce_ms,
        sniff_mime = config.watch.sniff_mime,
        "starting hub"
    );
    let (hub, hub_task) = Hub::spawn(hub_config, Arc::new(worker::catalogue()));

    let addr = config.bind_address();
    let state = AppState::new(hub, config);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting Wayfarer server on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    // Upgraded sockets outlive the listener and keep their hub handles.
    match tokio::time::timeout(HUB_SHUTDOWN_GRACE, hub_task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "hub task failed"),
        Err(_) => info!("hub still referenced by open sockets; exiting anyway"),
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
