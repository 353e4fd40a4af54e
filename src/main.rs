use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcript_client::config::{AnswerMode, Config};
use transcript_client::transport;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    env!("TRANSCRIPT_VERSION_SUFFIX")
);

#[derive(Parser)]
#[command(name = "transcript")]
#[command(
    author,
    version = VERSION,
    about = "Transcript client - upload audio and ask questions about it",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Transcript service URL (overrides config)
    #[arg(long, global = true)]
    url: Option<String>,

    /// User id requests are issued under (overrides config)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the transcript service is reachable
    Health,

    /// Upload an audio file and wait until it is ready for questions
    Upload {
        /// Audio file to upload
        file: PathBuf,
    },

    /// Ask one question and stream the answer
    Ask {
        /// Conversation id
        conversation: String,

        /// Question text
        question: String,

        /// Poll the task for the full answer instead of streaming it
        #[arg(long)]
        poll: bool,
    },

    /// List conversations
    List,

    /// Rename a conversation
    Rename {
        /// Conversation id
        id: String,

        /// New title
        title: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation id
        id: String,
    },

    /// Delete all conversations of the user
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Export a conversation as a Markdown report
    Export {
        /// Conversation id
        conversation: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Interactive console
    Chat {
        /// Conversation to open on start
        #[arg(short, long)]
        conversation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "transcript_client=debug"
    } else {
        "transcript_client=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        })
        .with_overrides(cli.url, cli.user);
    tracing::debug!("Using server {}", config.server.base_url);

    match cli.command {
        Commands::Health => {
            transport::cli::run_health(&config).await?;
        }
        Commands::Upload { file } => {
            transport::cli::run_upload(&config, &file).await?;
        }
        Commands::Ask {
            conversation,
            question,
            poll,
        } => {
            if poll {
                config.session.answer_mode = AnswerMode::Poll;
            }
            transport::cli::run_ask(&config, &conversation, &question).await?;
        }
        Commands::List => {
            transport::cli::run_list(&config).await?;
        }
        Commands::Rename { id, title } => {
            transport::cli::run_rename(&config, &id, &title).await?;
        }
        Commands::Delete { id } => {
            transport::cli::run_delete(&config, &id).await?;
        }
        Commands::Clear { yes } => {
            transport::cli::run_clear(&config, yes).await?;
        }
        Commands::Export {
            conversation,
            output,
        } => {
            transport::cli::run_export(&config, &conversation, output.as_deref()).await?;
        }
        Commands::Chat { conversation } => {
            tracing::info!("Starting interactive console");
            transport::cli::run_chat(&config, conversation).await?;
        }
    }

    Ok(())
}
