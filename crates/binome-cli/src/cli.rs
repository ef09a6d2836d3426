use std::path::PathBuf;

use binome_core::{LatLng, PaymentMethod, VisitStatus};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "binome")]
#[command(about = "Record field visits and zones, and sync them with the team table")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local replica file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote table configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// After a change, wait for the debounced sync cycle to finish
    #[arg(long, global = true)]
    pub sync: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a session on this device
    Login {
        /// Team identifier
        #[arg(long, value_name = "TEAM")]
        user: String,
        /// Display name (defaults to the team identifier)
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
        /// Assigned zone id or name
        #[arg(long, value_name = "ZONE")]
        zone: Option<String>,
        /// Sign in with administrator rights
        #[arg(long)]
        admin: bool,
    },
    /// End the current session
    Logout,
    /// Show the current session
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage visits
    #[command(alias = "visits")]
    Visit {
        #[command(subcommand)]
        command: VisitCommands,
    },
    /// Manage zones
    #[command(alias = "zones")]
    Zone {
        #[command(subcommand)]
        command: ZoneCommands,
    },
    /// Reconcile the local replica with the remote tables
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum VisitCommands {
    /// Record a visit
    Add {
        /// Street address
        address: Vec<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// done, retry, refused or empty
        #[arg(long, default_value = "empty")]
        status: VisitStatus,
        /// Amount collected (completed visits only)
        #[arg(long)]
        amount: Option<f64>,
        /// cash, check, card or transfer
        #[arg(long)]
        payment: Option<PaymentMethod>,
        #[arg(long)]
        notes: Option<String>,
        /// Owning team (administrators only; defaults to the signed-in team)
        #[arg(long, value_name = "TEAM")]
        owner: Option<String>,
    },
    /// List visible visits
    List {
        /// Only visits inside this zone (id or name)
        #[arg(long, value_name = "ZONE")]
        zone: Option<String>,
        #[arg(long)]
        status: Option<VisitStatus>,
        /// Number of visits to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a visit
    Edit {
        /// Visit ID or unique ID prefix
        id: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long, allow_hyphen_values = true, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lng: Option<f64>,
        #[arg(long)]
        status: Option<VisitStatus>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        payment: Option<PaymentMethod>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a visit
    Delete {
        /// Visit ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ZoneCommands {
    /// Create a circular zone
    AddCircle {
        name: String,
        /// Center as "lat,lng"
        #[arg(long, value_parser = parse_lat_lng, allow_hyphen_values = true)]
        center: LatLng,
        /// Radius in meters
        #[arg(long)]
        radius: f64,
        #[command(flatten)]
        options: ZoneOptions,
    },
    /// Create a polygon zone from three or more vertices
    AddPolygon {
        name: String,
        /// Vertex as "lat,lng", repeated in ring order
        #[arg(
            long = "vertex",
            value_parser = parse_lat_lng,
            allow_hyphen_values = true,
            num_args = 1,
            required = true
        )]
        vertices: Vec<LatLng>,
        #[command(flatten)]
        options: ZoneOptions,
    },
    /// Create an axis-aligned rectangle zone
    AddRectangle {
        name: String,
        /// South-west corner as "lat,lng"
        #[arg(long, value_parser = parse_lat_lng, allow_hyphen_values = true)]
        south_west: LatLng,
        /// North-east corner as "lat,lng"
        #[arg(long, value_parser = parse_lat_lng, allow_hyphen_values = true)]
        north_east: LatLng,
        #[command(flatten)]
        options: ZoneOptions,
    },
    /// List visible zones
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a zone
    Delete {
        /// Zone ID, unique ID prefix or exact name
        zone: String,
    },
    /// Show the visible zones containing a point
    Locate {
        /// Point as "lat,lng"
        #[arg(value_parser = parse_lat_lng, allow_hyphen_values = true)]
        point: LatLng,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ZoneOptions {
    /// Display color (defaults to #3388ff)
    #[arg(long)]
    pub color: Option<String>,
    /// Team the zone is assigned to
    #[arg(long, value_name = "TEAM")]
    pub team: Option<String>,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run one reconciliation cycle now (default)
    Run,
    /// Show what the next cycle would change, without applying it
    Plan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync configuration and local counts
    Status,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Remote table API base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// Remote table API token
        #[arg(long, value_name = "TOKEN")]
        api_token: Option<String>,
        /// Send no credential; a trusted proxy injects it
        #[arg(long)]
        proxied: bool,
        /// Remote table holding visits
        #[arg(long, value_name = "TABLE")]
        distributions_table: Option<String>,
        /// Remote table holding zones
        #[arg(long, value_name = "TABLE")]
        zones_table: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved configuration
    Show,
}

/// Parse a `"lat,lng"` pair.
pub fn parse_lat_lng(raw: &str) -> Result<LatLng, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got '{raw}'"))?;
    let lat = lat
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
    let lng = lng
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid longitude '{}'", lng.trim()))?;
    let point = LatLng::new(lat, lng);
    if point.is_valid() {
        Ok(point)
    } else {
        Err(format!("coordinates out of range: {lat}, {lng}"))
    }
}
