mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use intentmem::config::IntentMemConfig;
use intentmem::llm::ModelVariant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "intentmem",
    version,
    about = "Natural-language transaction intents with durable per-wallet memory"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (intent analysis + blob proxy)
    Serve,
    /// Extract an intent from one message and print it as JSON
    Analyze {
        /// The message to analyze
        text: String,
        /// Model variant: flash (terse) or pro (narrative)
        #[arg(long, default_value = "flash")]
        model: ModelVariant,
    },
    /// Interactive chat with persistent memory for a wallet
    Chat {
        /// Wallet address whose memory to load
        #[arg(long)]
        wallet: String,
        #[arg(long, default_value = "flash")]
        model: ModelVariant,
    },
    /// Check configuration and pointer cache health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = IntentMemConfig::load()?;

    // Log to stderr so stdout stays clean for JSON output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => intentmem::server::serve(config).await?,
        Command::Analyze { text, model } => cli::analyze::analyze(&config, &text, model).await?,
        Command::Chat { wallet, model } => cli::chat::chat(&config, &wallet, model).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
