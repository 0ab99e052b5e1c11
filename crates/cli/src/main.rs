//! Insight Library CLI - Database migrations and account tooling.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! il-cli migrate
//!
//! # Bootstrap an account (prints one-shot credentials)
//! il-cli users create -e admin@studio.test -n "Studio Admin" -r admin
//!
//! # List accounts awaiting approval
//! il-cli users list --pending
//!
//! # Browse the activity audit log
//! il-cli logs list --action user_delete --search studio --page 0
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `users create` - Provision a pre-approved account with a generated password
//! - `users list` - List profiles
//! - `logs list` - Page through the activity log

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "il-cli")]
#[command(author, version, about = "Insight Library CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage accounts
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
    /// Read the activity audit log
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    /// Create a pre-approved account
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name (defaults to the email's local part)
        #[arg(short, long)]
        name: Option<String>,

        /// Role (`admin`, `moderator`, `user`)
        #[arg(short, long, default_value = "user")]
        role: String,
    },
    /// List accounts, newest first
    List {
        /// Only accounts awaiting approval
        #[arg(long)]
        pending: bool,
    },
}

#[derive(Subcommand)]
enum LogsAction {
    /// List one page of entries, newest first
    List {
        /// Exact action type (e.g. `user_create`)
        #[arg(long)]
        action: Option<String>,

        /// Substring over actor email, target email and action type
        #[arg(long)]
        search: Option<String>,

        /// Zero-based page index
        #[arg(long, default_value_t = 0)]
        page: u32,

        /// Entries per page
        #[arg(long)]
        page_size: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Users { action } => match action {
            UsersAction::Create { email, name, role } => {
                commands::users::create(&email, name.as_deref(), &role).await?;
            }
            UsersAction::List { pending } => commands::users::list(pending).await?,
        },
        Commands::Logs { action } => match action {
            LogsAction::List {
                action,
                search,
                page,
                page_size,
            } => {
                commands::logs::list(action.as_deref(), search, page, page_size).await?;
            }
        },
    }
    Ok(())
}
