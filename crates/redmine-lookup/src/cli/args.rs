//! CLI argument structs for all commands.

use clap::Parser;
use std::path::PathBuf;

use super::types::EntityTypeArg;

/// Connection flags shared by every command
#[derive(Parser, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// YAML options file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Redmine server URL, without a trailing `/`
    #[arg(long, global = true, env = "REDMINE_URL")]
    pub url: Option<String>,

    /// User API key for searches, reads and updates
    #[arg(long, global = true, env = "REDMINE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Administrator API key for statuses and users
    #[arg(long, global = true, env = "REDMINE_ADMIN_API_KEY", hide_env_values = true)]
    pub admin_api_key: Option<String>,

    /// Restrict searches to one project identifier
    #[arg(long, global = true, env = "REDMINE_PROJECT")]
    pub project: Option<String>,

    /// Run against a seeded in-memory tracker instead of a server
    #[arg(long, global = true)]
    pub demo: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {}

/// Arguments for the `lookup` command
#[derive(Parser, Debug, Clone)]
pub struct LookupArgs {
    /// Indicator values (IP addresses, hashes, domains, emails)
    #[arg(required = true, num_args = 1..)]
    pub values: Vec<String>,

    /// Treat every value as this type instead of detecting it
    #[arg(short = 't', long = "type", value_enum)]
    pub entity_type: Option<EntityTypeArg>,

    /// Also fetch the matched issues
    #[arg(short, long)]
    pub details: bool,

    /// Report each entity separately instead of failing on the first error
    #[arg(long)]
    pub settle: bool,
}

/// Arguments for the `show` command
#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    /// Issue ids
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<u64>,
}

/// Arguments for the `dispatch` command
#[derive(Parser, Debug, Clone)]
pub struct DispatchArgs {
    /// JSON message, or `-` to read it from stdin
    #[arg(default_value = "-")]
    pub payload: String,
}
