//! KubeSage CLI: the main entry point.
//!
//! Commands:
//! - `chat`    Ask one question about the cluster
//! - `tools`   List the tool catalog the bots can use
//! - `models`  Show which bot variant each model identifier routes to
//! - `config`  Validate configuration or print the defaults

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "kubesage",
    about = "KubeSage: Kubernetes observability through LLM tool calling",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.kubesage/config.toml)
    #[arg(long, global = true, env = "KUBESAGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question
    Chat {
        /// The question
        question: String,

        /// Model identifier, e.g. anthropic/claude-3-5-haiku
        #[arg(short, long)]
        model: Option<String>,

        /// Restrict the analysis to one namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// API key for hosted models (overrides config and environment)
        #[arg(long)]
        api_key: Option<String>,

        /// Print a JSON report instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// List available tools
    Tools,

    /// Show the bot variant chosen for each model identifier
    Models {
        #[arg(required = true)]
        models: Vec<String>,
    },

    /// Validate the configuration
    Config {
        /// Print the default configuration instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing. Logs go to stderr so answers stay pipeable.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat {
            question,
            model,
            namespace,
            api_key,
            json,
        } => {
            let options = commands::chat::ChatOptions {
                model,
                namespace,
                api_key,
                json,
            };
            commands::chat::run(config_path, &question, options).await?
        }
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Models { models } => commands::models::run(config_path, &models).await?,
        Commands::Config { default } => commands::config_cmd::run(config_path, default).await?,
    }

    Ok(())
}
