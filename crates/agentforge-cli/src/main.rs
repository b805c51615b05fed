use agentforge_agents::{RequestBuilder, Route};
use agentforge_config::{AppConfig, ConfigLoader};
use agentforge_gateway::GatewayServer;
use agentforge_security::{RedactingWriter, mask_secret};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str = "agentforge=info,tower_http=info";

#[derive(Parser)]
#[command(name = "agentforge", version, about = "Agent creation and chat proxy server")]
struct Cli {
    /// Path to config file (default: ~/.agentforge/config.yml)
    #[arg(short, long, global = true, env = "AGENTFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the effective configuration and credential status
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port, db } => {
            apply_serve_overrides(&mut config, host, port, db);
            info!(
                "starting agentforge gateway on {}:{} (db: {})",
                config.gateway.host,
                config.gateway.port,
                config.database.path.display()
            );
            GatewayServer::new(config)
                .run()
                .await
                .context("gateway exited with an error")?;
        }
        Commands::CheckConfig => {
            print!("{}", render_config_report(&config, |key| std::env::var(key).ok())?);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(RedactingWriter::stderr()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(RedactingWriter::stderr()))
            .init();
    }
}

fn apply_serve_overrides(
    config: &mut AppConfig,
    host: Option<String>,
    port: Option<u16>,
    db: Option<PathBuf>,
) {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(db) = db {
        config.database.path = db;
    }
}

fn render_config_report<F>(config: &AppConfig, lookup: F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut report = serde_yaml::to_string(config).context("failed to render configuration")?;
    report.push_str("\ncredentials:\n");

    let builder = RequestBuilder::from_config(&config.upstream, &lookup);
    for route in [Route::Together, Route::OpenAi] {
        let profile = builder.profile(route);
        let status = match lookup(&profile.key_env).filter(|_| profile.has_credential()) {
            Some(key) => format!("set ({})", mask_secret(&key)),
            None => "missing".to_string(),
        };
        report.push_str(&format!(
            "  {} ({}): {}\n",
            route.provider_name(),
            profile.key_env,
            status
        ));
    }
    Ok(report)
}
