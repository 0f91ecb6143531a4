//! Redmine lookup CLI binary.

use anyhow::Result;
use redmine_lookup::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the redmine-lookup CLI.
///
/// Runs on tokio's current_thread runtime: every request is I/O bound and the
/// fan-outs interleave on one thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable JSON.
    // Example: RUST_LOG=redmine_lookup=debug redmine-lookup --demo lookup 8.8.8.8
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("redmine_lookup=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!("Starting redmine-lookup CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("redmine-lookup CLI completed successfully");
    Ok(())
}
