//! Wander CLI - keep a travel bucket list from the terminal
//!
//! Every change is written locally first and synced when the API is reachable.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_db_path;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::list::run_list;
use crate::commands::photo::run_photo;
use crate::commands::pull::run_pull;
use crate::commands::queue::run_queue;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
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

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wander=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Add {
            name,
            location,
            trip_date,
            json,
        } => run_add(&name, location, trip_date, json, &db_path).await,
        Commands::List { limit, json } => run_list(limit, json, &db_path).await,
        Commands::Edit {
            id,
            name,
            lat,
            lng,
            trip_date,
            clear_trip_date,
            json,
        } => {
            let args = EditArgs {
                name,
                lat,
                lng,
                trip_date,
                clear_trip_date,
            };
            run_edit(&id, args, json, &db_path).await
        }
        Commands::Delete { id } => run_delete(&id, &db_path).await,
        Commands::Photo { command } => run_photo(command, &db_path).await,
        Commands::Sync { json } => run_sync(json, &db_path).await,
        Commands::Pull { json } => run_pull(json, &db_path).await,
        Commands::Queue { clear, json } => run_queue(clear, json, &db_path).await,
        Commands::Status { json } => run_status(json, &db_path).await,
        Commands::Watch { check_interval } => run_watch(check_interval, &db_path).await,
    }
}
