//! Command execution logic.
//!
//! Every command prints JSON on stdout; logs go to stderr.

use anyhow::{Context, Result, anyhow, bail};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::{Value, json};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::args::{ConnectionArgs, DispatchArgs, LookupArgs, ShowArgs, ValidateArgs};
use crate::config::LookupOptions;
use crate::integration::Integration;
use crate::model::{Entity, IssueId, LookupResult};
use crate::transport::in_memory::InMemoryTracker;

/// Base URL reported by `--demo` runs.
const DEMO_URL: &str = "http://redmine.demo";

/// Merge the config file (if any) with the command-line overrides.
pub async fn resolve_options(conn: &ConnectionArgs) -> Result<LookupOptions> {
    let mut options = match &conn.config {
        Some(path) => LookupOptions::load(path)
            .await
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => LookupOptions::default(),
    };

    if let Some(url) = &conn.url {
        options.url.clone_from(url);
    }
    if let Some(key) = &conn.api_key {
        options.api_key.clone_from(key);
    }
    if let Some(key) = &conn.admin_api_key {
        options.admin_api_key.clone_from(key);
    }
    if let Some(project) = &conn.project {
        options.project.clone_from(project);
    }

    if conn.demo {
        if options.url.is_empty() {
            options.url = DEMO_URL.to_string();
        }
        if options.admin_api_key.is_empty() {
            options.admin_api_key = "demo".to_string();
        }
    }
    Ok(options)
}

/// Build the integration the commands run against.
pub async fn connect(conn: &ConnectionArgs) -> Result<Integration> {
    let options = resolve_options(conn).await?;
    if conn.demo {
        tracing::info!("Using the in-memory demo tracker");
        return Ok(Integration::with_transport(
            options,
            Arc::new(InMemoryTracker::demo()),
        ));
    }
    Ok(Integration::new(options)?)
}

/// Execute the validate command
pub async fn execute_validate(conn: &ConnectionArgs, _args: &ValidateArgs) -> Result<()> {
    let options = resolve_options(conn).await?;
    let issues = Integration::validate(&options);
    print_json(&issues)?;

    if !issues.is_empty() {
        bail!("{} configuration problem(s) found", issues.len());
    }
    Ok(())
}

/// Execute the lookup command
pub async fn execute_lookup(integration: &Integration, args: &LookupArgs) -> Result<()> {
    let entities = parse_entities(args)?;

    if args.settle {
        let settled: Vec<Value> = integration
            .lookup_each(&entities)
            .await
            .into_iter()
            .map(|outcome| match outcome {
                Ok(result) => json!(result),
                Err(error) => json!({ "error": error }),
            })
            .collect();
        return print_json(&settled);
    }

    let results = integration.lookup(&entities).await?;
    if !args.details {
        return print_json(&results);
    }

    let detailed =
        try_join_all(results.iter().map(|result| with_details(integration, result))).await?;
    print_json(&detailed)
}

async fn with_details(integration: &Integration, result: &LookupResult) -> Result<Value> {
    let details = match &result.data {
        Some(data) => Some(integration.details(&data.issue_ids).await?),
        None => None,
    };
    Ok(json!({
        "entity": result.entity,
        "data": result.data,
        "details": details,
    }))
}

/// Execute the show command
pub async fn execute_show(integration: &Integration, args: &ShowArgs) -> Result<()> {
    let ids: Vec<IssueId> = args.ids.iter().copied().map(IssueId::new).collect();
    let details = integration.details(&ids).await?;
    print_json(&details)
}

/// Execute the dispatch command
pub async fn execute_dispatch(integration: &Integration, args: &DispatchArgs) -> Result<()> {
    let raw = if args.payload == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("Failed to read the message from stdin")?;
        buffer
    } else {
        args.payload.clone()
    };
    let payload: Value = serde_json::from_str(&raw).context("The message is not valid JSON")?;

    match integration.dispatch_json(payload).await {
        Ok(response) => print_json(&response),
        Err(error) => {
            print_json(&json!({ "error": &error }))?;
            Err(error.into())
        }
    }
}

fn parse_entities(args: &LookupArgs) -> Result<Vec<Entity>> {
    args.values
        .iter()
        .map(|value| match args.entity_type {
            Some(entity_type) => Ok(Entity::new(value.trim(), entity_type.into())),
            None => Entity::detect(value)
                .ok_or_else(|| anyhow!("Cannot detect the type of {value:?}; pass --type")),
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::types::EntityTypeArg;
    use crate::model::EntityType;

    fn lookup_args(values: &[&str], entity_type: Option<EntityTypeArg>) -> LookupArgs {
        LookupArgs {
            values: values.iter().map(ToString::to_string).collect(),
            entity_type,
            details: false,
            settle: false,
        }
    }

    #[test]
    fn test_parse_entities_detects_types() {
        let entities = parse_entities(&lookup_args(&["8.8.8.8", "a@b.io"], None)).unwrap();
        assert_eq!(entities[0].entity_type, EntityType::Ipv4);
        assert_eq!(entities[1].entity_type, EntityType::Email);
    }

    #[test]
    fn test_parse_entities_explicit_type_wins() {
        let entities =
            parse_entities(&lookup_args(&["localhost"], Some(EntityTypeArg::Domain))).unwrap();
        assert_eq!(entities[0], Entity::new("localhost", EntityType::Domain));
    }

    #[test]
    fn test_parse_entities_rejects_unknown_shape() {
        let error = parse_entities(&lookup_args(&["not an indicator"], None)).unwrap_err();
        assert!(error.to_string().contains("--type"));
    }

    #[tokio::test]
    async fn test_demo_options_fill_gaps() {
        let conn = ConnectionArgs {
            demo: true,
            ..ConnectionArgs::default()
        };
        let options = resolve_options(&conn).await.unwrap();
        assert_eq!(options.url, DEMO_URL);
        assert!(options.has_admin_credentials());
    }

    #[tokio::test]
    async fn test_flags_override_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("redmine.yaml");
        std::fs::write(&path, "url: https://file.example.com\nproject: soc\n").unwrap();

        let conn = ConnectionArgs {
            config: Some(path),
            project: Some("ir".to_string()),
            ..ConnectionArgs::default()
        };
        let options = resolve_options(&conn).await.unwrap();
        assert_eq!(options.url, "https://file.example.com");
        assert_eq!(options.project, "ir");
    }
}
