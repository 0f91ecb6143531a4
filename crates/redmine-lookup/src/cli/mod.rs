//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! - `validate`: Check the options and list every problem
//! - `lookup`: Search Redmine for indicator values
//! - `show`: Fetch issues by id
//! - `dispatch`: Run one UI action (status, assignee or attribute update, refresh)
//!
//! # Example
//!
//! ```bash
//! redmine-lookup --url https://redmine.example.com lookup 8.8.8.8 --details
//! redmine-lookup --demo dispatch '{"action": "REFRESH_ISSUE", "id": 101}'
//! ```

mod args;
mod execute;
mod types;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub use args::{ConnectionArgs, DispatchArgs, LookupArgs, ShowArgs, ValidateArgs};
pub use types::EntityTypeArg;

/// Look up indicators in Redmine and update the matching issues
#[derive(Parser, Debug)]
#[command(name = "redmine-lookup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Connection settings
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Validate the options
    ///
    /// Prints the problems as JSON and exits non-zero when there are any.
    Validate(ValidateArgs),

    /// Search issues mentioning each value
    ///
    /// Value types are detected unless `--type` is given. With `--details`
    /// the matched issues are fetched as well.
    Lookup(LookupArgs),

    /// Fetch issues by id
    Show(ShowArgs),

    /// Run one presentation-layer action
    ///
    /// Reads a JSON message such as `{"action": "UPDATE_STATUS", ...}` and
    /// prints the refreshed issue, or statuses and users for
    /// `LOAD_REFERENCE_DATA`.
    Dispatch(DispatchArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    ///
    /// # Errors
    ///
    /// Returns the clap error for invalid arguments.
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    ///
    /// # Errors
    ///
    /// Returns any configuration, transport or tracker failure.
    pub async fn execute(&self) -> Result<()> {
        let conn = &self.connection;
        match &self.command {
            Commands::Validate(args) => execute::execute_validate(conn, args).await,
            Commands::Lookup(args) => {
                let integration = execute::connect(conn).await?;
                execute::execute_lookup(&integration, args).await
            }
            Commands::Show(args) => {
                let integration = execute::connect(conn).await?;
                execute::execute_show(&integration, args).await
            }
            Commands::Dispatch(args) => {
                let integration = execute::connect(conn).await?;
                execute::execute_dispatch(&integration, args).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lookup_with_type_and_details() {
        let cli = Cli::try_parse_from([
            "redmine-lookup",
            "lookup",
            "evil.example.com",
            "--type",
            "domain",
            "--details",
        ])
        .unwrap();
        match cli.command {
            Commands::Lookup(args) => {
                assert_eq!(args.values, vec!["evil.example.com".to_string()]);
                assert_eq!(args.entity_type, Some(EntityTypeArg::Domain));
                assert!(args.details);
            }
            _ => panic!("Expected Lookup command"),
        }
    }

    #[test]
    fn test_parse_lookup_requires_values() {
        assert!(Cli::try_parse_from(["redmine-lookup", "lookup"]).is_err());
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["redmine-lookup", "show", "101", "205", "--demo"]).unwrap();
        assert!(cli.connection.demo);
        match cli.command {
            Commands::Show(args) => assert_eq!(args.ids, vec![101, 205]),
            _ => panic!("Expected Show command"),
        }
    }

    #[test]
    fn test_parse_dispatch_defaults_to_stdin() {
        let cli = Cli::try_parse_from(["redmine-lookup", "dispatch"]).unwrap();
        match cli.command {
            Commands::Dispatch(args) => assert_eq!(args.payload, "-"),
            _ => panic!("Expected Dispatch command"),
        }
    }

    #[test]
    fn test_parse_rejects_non_numeric_issue_id() {
        assert!(Cli::try_parse_from(["redmine-lookup", "show", "abc"]).is_err());
    }
}
