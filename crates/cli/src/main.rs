mod config_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    switchboard_config::SwitchboardConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "switchboard", about = "Switchboard: channel account registry and webhook gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and ~/.config/switchboard/).
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Serve {
        /// Address to bind to (overrides config value).
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides config value).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate the configuration and report problems.
    CheckConfig,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Explicit `--config` must load; otherwise fall back to discovery.
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SwitchboardConfig> {
    match path {
        Some(path) => switchboard_config::load_config(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(switchboard_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        None => serve(&cli, None, None).await,
        Some(Commands::Serve { ref bind, port }) => serve(&cli, bind.clone(), port).await,
        Some(Commands::CheckConfig) => config_commands::check(cli.config.as_ref()),
    }
}

async fn serve(cli: &Cli, bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "switchboard starting");
    let mut config = load_config(cli.config.as_ref())?;

    // CLI args override config values
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let report = switchboard_config::validate(&config);
    if report.has_errors() {
        for d in &report.diagnostics {
            tracing::error!(path = %d.path, "{}", d.message);
        }
        anyhow::bail!("invalid configuration, run `switchboard check-config` for details");
    }

    switchboard_gateway::start_gateway(config).await
}
