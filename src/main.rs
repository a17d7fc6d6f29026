use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsum::config::Config;
use docsum::summarize::Pipeline;
use docsum::{doctor, gateway};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Summarize uploaded text and PDF documents with a chat-completion model.
#[derive(Parser, Debug)]
#[command(name = "docsum", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Tracing filter, e.g. `debug` or `docsum=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check that tesseract and pdftoppm can be found
    Check,
}

fn init_tracing(cli_level: Option<&str>, config_level: &str) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env never overrides variables already set in the process
    let dotenv = dotenvy::dotenv().ok();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(cli.log_level.as_deref(), &config.log_level);
    if let Some(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });

    match command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            config.validate()?;

            if config.completion.api_key.is_none() {
                warn!("API_KEY is not set; completion requests will be unauthenticated");
            }
            for tool in doctor::check_ocr_tools(&config.ocr) {
                if !tool.is_ok() {
                    warn!(
                        "{} not found at {:?}; scanned PDF pages will fail",
                        tool.name, tool.configured
                    );
                }
            }

            let pipeline = Arc::new(Pipeline::from_config(&config)?);
            info!(
                model = %config.completion.model,
                base_url = %config.completion.base_url,
                "Completion backend configured"
            );
            gateway::run_gateway(&config.gateway, pipeline).await
        }
        Commands::Check => {
            let statuses = doctor::check_ocr_tools(&config.ocr);
            for tool in &statuses {
                match &tool.resolved {
                    Some(path) => println!("ok       {:<10} {}", tool.name, path.display()),
                    None => println!("missing  {:<10} {}", tool.name, tool.configured),
                }
            }
            if statuses.iter().all(doctor::ToolStatus::is_ok) {
                Ok(())
            } else {
                anyhow::bail!("OCR toolchain incomplete")
            }
        }
    }
}
