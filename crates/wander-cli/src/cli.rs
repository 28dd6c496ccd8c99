use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wander")]
#[command(about = "Keep a travel bucket list that works offline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a place to the bucket list
    #[command(alias = "new")]
    Add {
        /// Place name
        #[arg(required = true)]
        name: Vec<String>,
        #[command(flatten)]
        location: LocationArgs,
        /// Planned trip date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        trip_date: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List places, most recently updated first
    List {
        /// Number of places to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a place
    Edit {
        /// Place ID or unique ID prefix
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New latitude (requires --lng)
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// New longitude (requires --lat)
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,
        /// New trip date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE", conflicts_with = "clear_trip_date")]
        trip_date: Option<NaiveDate>,
        /// Remove the trip date
        #[arg(long)]
        clear_trip_date: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a place
    Delete {
        /// Place ID or unique ID prefix
        id: String,
    },
    /// Manage photo references on a place
    Photo {
        #[command(subcommand)]
        command: PhotoCommands,
    },
    /// Push queued changes to the server (one cycle)
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Refresh local places from the server listing
    Pull {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queued mutations
    Queue {
        /// Drop every queued mutation without sending it
        #[arg(long)]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing in the foreground, following connectivity
    Watch {
        /// Seconds between connectivity checks
        #[arg(long, default_value = "15", value_name = "SECS")]
        check_interval: u64,
    },
}

#[derive(Args, Clone, Copy, Debug)]
pub struct LocationArgs {
    /// Latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,
    /// Longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lng: f64,
}

#[derive(Subcommand)]
pub enum PhotoCommands {
    /// Attach a photo reference to a place
    Add {
        /// Place ID or unique ID prefix
        place_id: String,
        /// Photo URI
        uri: String,
        /// Optional caption
        #[arg(long)]
        caption: Option<String>,
    },
    /// Remove a photo reference
    Remove {
        /// Photo ID
        photo_id: String,
    },
}
