//! Parlor CLI — the main entry point.
//!
//! Commands:
//! - `init`       — Write a default config file
//! - `chat`       — Interactive conversation with a character
//! - `send`       — One message, print the reply
//! - `characters` — List characters
//! - `books`      — Knowledge book management and SillyTavern import/export
//! - `models`     — List models offered by the endpoint
//! - `export`     — Write a backup file
//! - `import`     — Restore a backup file
//! - `backup`     — Push or pull a backup to the configured server

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parlor",
    about = "Parlor — character chat with knowledge books",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,

    /// Chat with a character
    Chat {
        /// Character name or id (defaults to the first character)
        #[arg(short, long)]
        character: Option<String>,
    },

    /// Send one message and print the reply
    Send {
        #[arg(short, long)]
        character: Option<String>,

        message: String,
    },

    /// List characters
    Characters,

    /// Knowledge books
    Books {
        #[command(subcommand)]
        action: Option<BooksAction>,
    },

    /// List models offered by the configured endpoint
    Models,

    /// Write every stored record to a backup file
    Export { output: String },

    /// Replace stored data with a backup file
    Import { input: String },

    /// Sync a backup with the configured backup server
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BooksAction {
    /// List books and their entries
    List,

    /// Import a SillyTavern world-info file as a new book
    Import { file: String },

    /// Export a book as a SillyTavern world-info file
    Export { book: String, output: String },

    /// Bind a book to a character, or to everyone with `global`
    Bind { book: String, character: String },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Upload the current data
    Push,

    /// Download and restore
    Pull,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat { character } => commands::chat::run(character).await?,
        Commands::Send { character, message } => commands::chat::send_once(character, &message).await?,
        Commands::Characters => commands::characters::run().await?,
        Commands::Books { action } => match action.unwrap_or(BooksAction::List) {
            BooksAction::List => commands::books::list().await?,
            BooksAction::Import { file } => commands::books::import(&file).await?,
            BooksAction::Export { book, output } => commands::books::export(&book, &output).await?,
            BooksAction::Bind { book, character } => commands::books::bind(&book, &character).await?,
        },
        Commands::Models => commands::models::run().await?,
        Commands::Export { output } => commands::backup::export(&output).await?,
        Commands::Import { input } => commands::backup::import(&input).await?,
        Commands::Backup { action } => match action {
            BackupAction::Push => commands::backup::push().await?,
            BackupAction::Pull => commands::backup::pull().await?,
        },
    }

    Ok(())
}
