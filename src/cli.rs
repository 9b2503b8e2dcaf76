use clap::{Parser, Subcommand};

use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_CTGOV_API_BASE_URL, DEFAULT_MAPQUEST_GEOCODE_URL,
    DEFAULT_MAX_SEARCH_SITES, DEFAULT_NPPES_API_BASE_URL, DEFAULT_NPPES_API_VERSION,
    DEFAULT_PHYSICIAN_LIMIT, DEFAULT_RADIUS_KM, DEFAULT_TRIAL_LIMIT,
};
use crate::proximity::DistanceUnit;

#[derive(Parser, Debug)]
#[command(name = "trial-physician-finder")]
#[command(about = "Find clinical trials and the physicians practicing near their sites", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Search trials once and resolve physicians for one of them.
    Lookup(LookupArgs),
}

/// Upstream endpoints and fan-out policy shared by every command.
#[derive(clap::Args, Debug, Clone)]
pub struct ClientArgs {
    /// NPPES registry API base URL.
    #[arg(long, default_value = DEFAULT_NPPES_API_BASE_URL)]
    pub nppes_base_url: String,

    /// NPPES API version query parameter.
    #[arg(long, default_value = DEFAULT_NPPES_API_VERSION)]
    pub nppes_version: String,

    /// ClinicalTrials.gov v2 API base URL.
    #[arg(long, default_value = DEFAULT_CTGOV_API_BASE_URL)]
    pub ctgov_base_url: String,

    /// MapQuest geocoding endpoint.
    #[arg(long, default_value = DEFAULT_MAPQUEST_GEOCODE_URL)]
    pub mapquest_url: String,

    /// MapQuest API key. Without it physicians have no coordinates.
    #[arg(long, env = "MAPQUEST_API_KEY", hide_env_values = true)]
    pub mapquest_key: Option<String>,

    /// Max trial sites searched per trial.
    #[arg(long, default_value_t = DEFAULT_MAX_SEARCH_SITES)]
    pub max_sites: usize,

    /// Physicians requested per site search.
    #[arg(long, default_value_t = DEFAULT_PHYSICIAN_LIMIT)]
    pub physician_limit: u32,

    /// Trials requested per search when the caller gives no limit.
    #[arg(long, default_value_t = DEFAULT_TRIAL_LIMIT)]
    pub trial_limit: u32,

    /// Per-request HTTP timeout.
    #[arg(long, default_value_t = 15)]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient upstream failures.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Physician search cache lifetime; 0 disables caching.
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub client: ClientArgs,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 9000)]
    pub port: u16,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LookupArgs {
    #[command(flatten)]
    pub client: ClientArgs,

    /// Condition to search trials for (e.g. "type 2 diabetes").
    #[arg(long)]
    pub condition: String,

    #[arg(long)]
    pub city: Option<String>,

    /// State / region (e.g. TX).
    #[arg(long)]
    pub state: Option<String>,

    /// Specialty term used for both the trial search and physician matching.
    #[arg(long)]
    pub specialty: Option<String>,

    /// Trial to resolve; defaults to the first search hit.
    #[arg(long)]
    pub nct_id: Option<String>,

    /// Only list physicians whose specialty equals this value.
    #[arg(long)]
    pub filter_specialty: Option<String>,

    /// Only list physicians whose city contains this text.
    #[arg(long)]
    pub filter_city: Option<String>,

    /// Only list physicians with this gender (M/F).
    #[arg(long)]
    pub filter_gender: Option<String>,

    #[arg(long, default_value_t = DEFAULT_RADIUS_KM)]
    pub radius: f64,

    /// Unit of --radius.
    #[arg(long, value_enum, ignore_case = true, default_value = "km")]
    pub unit: DistanceUnit,

    /// Only print physicians inside the radius.
    #[arg(long)]
    pub within_radius: bool,

    /// Write the listed physicians to this CSV file.
    #[arg(long)]
    pub csv: Option<std::path::PathBuf>,
}
