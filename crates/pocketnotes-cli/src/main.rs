//! pocketnotes CLI - jot down notes with photos from the terminal
//!
//! Every invocation is a cold start: the session is restored from the local
//! notes service, the command runs, and pending remote work is awaited
//! before exiting.

mod cli;
mod commands;
mod error;
mod outbox;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::{run_login, run_logout, run_status};
use crate::commands::common::{open_session, GlobalOptions};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::retry::run_retry;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pocketnotes=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = GlobalOptions {
        data_dir: cli.data_dir,
        config: cli.config,
    };

    match cli.command {
        Commands::Add {
            name,
            description,
            image,
        } => {
            let mut session = open_session(&options).await?;
            run_add(&mut session, &name, description, image).await?;
        }
        Commands::List { json } => run_list(&open_session(&options).await?, json)?,
        Commands::Delete { position } => {
            let mut session = open_session(&options).await?;
            run_delete(&mut session, position).await?;
        }
        Commands::Login => run_login(&open_session(&options).await?).await?,
        Commands::Logout => run_logout(&open_session(&options).await?).await?,
        Commands::Status => run_status(&open_session(&options).await?)?,
        Commands::Retry => {
            let mut session = open_session(&options).await?;
            run_retry(&mut session).await?;
        }
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
