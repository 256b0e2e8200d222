use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "noted", version, about = "Summarize articles into your Notion workspace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Workspace link management
    Link {
        #[command(subcommand)]
        action: commands::link::LinkAction,
    },
    /// Summarization API key
    Credential {
        #[command(subcommand)]
        action: commands::credential::CredentialAction,
    },
    /// Summarize an article and save it to the linked workspace
    Clip(commands::clip::ClipArgs),
    /// List the categories the relay sorts summaries into
    Categories,
    /// Check relay health
    Health,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let fallback = noted_core::Config::load()
        .map(|c| c.logging.filter)
        .unwrap_or_else(|_| "warn".to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Link { action } => commands::link::run(action).await,
        Commands::Credential { action } => commands::credential::run(action),
        Commands::Clip(args) => commands::clip::run(args).await,
        Commands::Categories => commands::relay::categories().await,
        Commands::Health => commands::relay::health().await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
