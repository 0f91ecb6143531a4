//! Search orchestrator.
//!
//! Issues one search request per entity, all at once, with no concurrency cap.
//!
//! [`search_all`] is a structured join: the first failure drops the sibling
//! requests still in flight and the caller gets either every result or that
//! one error, never a partially filled list. Results come back in input
//! order. [`search_each`] settles every entity independently instead, for
//! callers that want to render what succeeded.

use crate::client::TrackerClient;
use crate::error::Result;
use crate::model::{Entity, LookupResult};
use futures::future::{join_all, try_join_all};
use tracing::debug;

async fn search_one(client: &TrackerClient, entity: &Entity) -> Result<LookupResult> {
    let data = client.search(entity).await.map_err(|e| {
        e.with_operation("search")
            .with_entity(entity.value.clone())
    })?;

    debug!(
        entity = %entity.value,
        total = data.as_ref().map_or(0, |m| m.total_count),
        "Search complete"
    );
    Ok(LookupResult {
        entity: entity.clone(),
        data,
    })
}

/// Search every entity concurrently; all succeed or the first failure is returned.
///
/// Entities without matches yield a result whose `data` is `None`.
///
/// # Errors
///
/// Returns the first classified failure, annotated with the entity. Requests
/// for the remaining entities are cancelled.
pub async fn search_all(client: &TrackerClient, entities: &[Entity]) -> Result<Vec<LookupResult>> {
    try_join_all(entities.iter().map(|entity| search_one(client, entity))).await
}

/// Search every entity concurrently, reporting each outcome separately.
pub async fn search_each(client: &TrackerClient, entities: &[Entity]) -> Vec<Result<LookupResult>> {
    join_all(entities.iter().map(|entity| search_one(client, entity))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupOptions;
    use crate::error::ErrorKind;
    use crate::model::EntityType;
    use crate::transport::in_memory::{Fault, InMemoryTracker};
    use crate::transport::Transport;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryTracker>, TrackerClient) {
        let tracker = Arc::new(InMemoryTracker::new());
        tracker.create_issue(1, "Traffic to 8.8.8.8", "", 1);
        tracker.create_issue(2, "Mail from bob@example.com", "", 1);
        let client = TrackerClient::new(
            Arc::clone(&tracker) as Arc<dyn Transport>,
            Arc::new(LookupOptions::new("https://r")),
        );
        (tracker, client)
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let (_tracker, client) = setup();
        let entities = vec![
            Entity::new("bob@example.com", EntityType::Email),
            Entity::new("1.1.1.1", EntityType::Ipv4),
            Entity::new("8.8.8.8", EntityType::Ipv4),
        ];

        let results = search_all(&client, &entities).await.unwrap();
        let values: Vec<&str> = results.iter().map(|r| r.entity.value.as_str()).collect();
        assert_eq!(values, ["bob@example.com", "1.1.1.1", "8.8.8.8"]);
        assert!(results[1].data.is_none());
        assert_eq!(results[2].data.as_ref().unwrap().issue_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (tracker, client) = setup();
        assert!(search_all(&client, &[]).await.unwrap().is_empty());
        assert_eq!(tracker.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_failure_names_the_entity() {
        let (tracker, client) = setup();
        tracker.inject_fault(Fault::status("/search.json", 500).for_query("8.8.8.8"));
        let entities = vec![
            Entity::new("bob@example.com", EntityType::Email),
            Entity::new("8.8.8.8", EntityType::Ipv4),
        ];

        let error = search_all(&client, &entities).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnexpectedStatus(500));
        assert_eq!(error.context.entity.as_deref(), Some("8.8.8.8"));
        assert_eq!(error.context.operation.as_deref(), Some("search"));

        let settled = search_each(&client, &entities).await;
        assert!(settled[0].is_ok());
        assert!(settled[1].is_err());
    }
}
