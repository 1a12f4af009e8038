mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vitalchat::config::VitalConfig;

#[derive(Parser)]
#[command(
    name = "vitalchat",
    version,
    about = "Health-metrics chat assistant backed by a local model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve,
    /// Chat in a session (one message, or interactively from stdin)
    Chat {
        /// Session to continue (defaults to the active one)
        #[arg(long, conflicts_with = "new")]
        session: Option<String>,
        /// Start a fresh session
        #[arg(long)]
        new: bool,
        /// Model to use instead of the configured default
        #[arg(long)]
        model: Option<String>,
        /// Send this single message and exit
        message: Option<String>,
    },
    /// List sessions grouped by recency and folder
    Sessions {
        #[command(subcommand)]
        action: Option<SessionAction>,
    },
    /// Manage folders
    Folders {
        #[command(subcommand)]
        action: FolderAction,
    },
    /// List models installed on the inference service
    Models,
    /// Manage the knowledge base
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },
    /// Check storage health and backend reachability
    Doctor,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Delete a session
    Delete { id: String },
}

#[derive(Subcommand)]
enum FolderAction {
    /// Create a folder
    Create { name: String },
    /// Rename a folder
    Rename { id: String, name: String },
    /// Delete a folder and every session in it
    Delete { id: String },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// List entries
    List,
    /// Show which entries a question would retrieve
    Search { query: String },
    /// Print all entries as JSON
    Export,
    /// Replace all entries with those in a JSON file
    Import { file: PathBuf },
    /// Delete one entry
    Delete { id: String },
    /// Restore the built-in entries
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = VitalConfig::load()?;

    // Log to stderr so stdout carries only command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => vitalchat::server::serve(config).await?,
        Command::Chat {
            session,
            new,
            model,
            message,
        } => cli::chat::chat(&config, session, new, model, message).await?,
        Command::Sessions { action } => match action {
            None => cli::sessions::sessions(&config)?,
            Some(SessionAction::Delete { id }) => cli::sessions::delete_session(&config, &id)?,
        },
        Command::Folders { action } => match action {
            FolderAction::Create { name } => cli::sessions::create_folder(&config, &name)?,
            FolderAction::Rename { id, name } => cli::sessions::rename_folder(&config, &id, &name)?,
            FolderAction::Delete { id } => cli::sessions::delete_folder(&config, &id)?,
        },
        Command::Models => cli::models::models(&config).await?,
        Command::Knowledge { action } => match action {
            KnowledgeAction::List => cli::knowledge::list(&config)?,
            KnowledgeAction::Search { query } => cli::knowledge::search(&config, &query)?,
            KnowledgeAction::Export => cli::knowledge::export(&config)?,
            KnowledgeAction::Import { file } => cli::knowledge::import(&config, &file)?,
            KnowledgeAction::Delete { id } => cli::knowledge::delete(&config, &id)?,
            KnowledgeAction::Reset => cli::knowledge::reset(&config)?,
        },
        Command::Doctor => cli::doctor::doctor(&config).await?,
    }

    Ok(())
}
