//! Search and enrichment flows against the in-memory tracker.

mod common;

use common::{ADMIN_KEY, USER_KEY, integration_with, options, setup};
use proptest::prelude::*;
use redmine_lookup::classify::{NOT_FOUND_REMEDIATION, UNAUTHORIZED_REMEDIATION};
use redmine_lookup::model::{EntityType, SEARCH_RESULT_LIMIT};
use redmine_lookup::transport::Method;
use redmine_lookup::transport::in_memory::{Fault, InMemoryTracker};
use redmine_lookup::{Entity, ErrorKind, IssueId, LookupOptions, Severity};
use std::sync::Arc;

fn ip(value: &str) -> Entity {
    Entity::new(value, EntityType::Ipv4)
}

#[tokio::test]
async fn test_lookup_and_enrich_8_8_8_8() {
    let (_tracker, integration) = setup();

    let results = integration.lookup(&[ip("8.8.8.8")]).await.unwrap();
    assert_eq!(results.len(), 1);
    let data = results[0].data.as_ref().unwrap();
    assert_eq!(data.total_count, 2);
    assert_eq!(data.issue_ids, vec![IssueId::new(101), IssueId::new(205)]);
    assert_eq!(data.summary, vec!["# Issues: 2".to_string()]);

    let details = integration.details(&data.issue_ids).await.unwrap();
    assert_eq!(details.issues.len(), 2);

    let first = &details.issues[0];
    assert_eq!(first.id, IssueId::new(101));
    assert_eq!(first.journals.len(), 3);
    assert_eq!(first.num_notes, 2);

    let second = &details.issues[1];
    assert_eq!(second.journals.len(), 1);
    assert_eq!(second.num_notes, 0);
    assert_eq!(second.assigned_to.as_ref().unwrap().name, "Grace Hopper");

    let statuses = details.statuses.unwrap();
    assert_eq!(statuses.len(), 3);
    assert!(details.users.unwrap().iter().any(|u| u.name == "Ada Lovelace"));
}

#[tokio::test]
async fn test_zero_matches_is_null_not_error() {
    let (_tracker, integration) = setup();
    let results = integration
        .lookup(&[ip("1.2.3.4"), ip("8.8.8.8")])
        .await
        .unwrap();

    assert!(results[0].data.is_none());
    assert!(results[1].data.is_some());
    let json = serde_json::to_value(&results[0]).unwrap();
    assert!(json["data"].is_null());
}

#[tokio::test]
async fn test_lookup_warms_reference_cache() {
    let (tracker, integration) = setup();
    integration.lookup(&[ip("8.8.8.8")]).await.unwrap();
    assert!(integration.reference_cache().is_populated());

    integration.details(&[IssueId::new(101)]).await.unwrap();
    assert_eq!(tracker.request_count(Method::Get, "/issue_statuses.json"), 1);
    assert_eq!(tracker.request_count(Method::Get, "/users.json"), 1);
}

#[tokio::test]
async fn test_details_without_admin_key_have_no_reference_data() {
    let tracker = Arc::new(common::seeded_tracker());
    let integration = integration_with(&tracker, LookupOptions::new("https://redmine.test"));

    let details = integration.details(&[IssueId::new(205)]).await.unwrap();
    assert!(details.statuses.is_none());
    assert!(details.users.is_none());
    let json = serde_json::to_value(&details).unwrap();
    assert!(json.get("statuses").is_none());
}

#[tokio::test]
async fn test_project_scope() {
    let tracker = Arc::new(common::seeded_tracker());
    tracker.create_issue_in("soc", 400, "8.8.8.8 in SOC queue", "", 1);

    let scoped = integration_with(&tracker, options().with_project("soc"));
    let results = scoped.lookup(&[ip("8.8.8.8")]).await.unwrap();
    assert_eq!(results[0].data.as_ref().unwrap().issue_ids, vec![IssueId::new(400)]);
    assert_eq!(tracker.request_count(Method::Get, "/projects/soc/search.json"), 1);

    let wrong = integration_with(&tracker, options().with_project("nope"));
    let error = wrong.lookup(&[ip("8.8.8.8")]).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::NotFound);
    assert_eq!(error.remediation.as_deref(), Some(NOT_FOUND_REMEDIATION));
    assert_eq!(error.context.entity.as_deref(), Some("8.8.8.8"));
}

#[tokio::test]
async fn test_invalid_api_key_is_unauthorized() {
    let tracker = Arc::new(common::seeded_tracker());
    tracker.require_api_keys(&[USER_KEY]);
    tracker.require_admin_keys(&[ADMIN_KEY]);

    let integration = integration_with(
        &tracker,
        LookupOptions::new("https://redmine.test").with_api_key("revoked"),
    );
    let error = integration.lookup(&[ip("8.8.8.8")]).await.unwrap_err();

    assert_eq!(error.kind, ErrorKind::Unauthorized);
    assert_eq!(error.severity, Severity::Warning);
    assert_eq!(error.context.status_code, Some(401));
    assert_eq!(error.remediation.as_deref(), Some(UNAUTHORIZED_REMEDIATION));
    assert_ne!(error.remediation.as_deref(), Some(NOT_FOUND_REMEDIATION));
}

#[tokio::test]
async fn test_disconnect_is_transport_failure() {
    let (tracker, integration) = setup();
    tracker.inject_fault(Fault::disconnect("/issues/205.json"));

    let error = integration
        .details(&[IssueId::new(101), IssueId::new(205)])
        .await
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::TransportFailure);
    assert_eq!(error.severity, Severity::Danger);
    assert_eq!(error.context.issue_id, Some(IssueId::new(205)));
    assert!(error.detail.starts_with("Error making HTTP request"));
}

#[tokio::test]
async fn test_settled_lookup_isolates_failures() {
    let (tracker, integration) = setup();
    tracker.inject_fault(Fault::status("/search.json", 502).for_query("1.1.1.1"));

    let outcomes = integration
        .lookup_each(&[ip("1.1.1.1"), ip("8.8.8.8")])
        .await;
    assert_eq!(outcomes[0].as_ref().unwrap_err().kind, ErrorKind::UnexpectedStatus(502));
    assert_eq!(outcomes[1].as_ref().unwrap().data.as_ref().unwrap().total_count, 2);
}

fn tracker_with_mentions(count: u64) -> InMemoryTracker {
    let tracker = InMemoryTracker::new();
    tracker.add_status(1, "New", false);
    for id in 1..=count {
        tracker.create_issue(id, &format!("Hit {id} for 10.0.0.1"), "", 1);
    }
    tracker.create_issue(count + 1, "Noise", "", 1);
    tracker
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_result_list_is_capped(count in 0u64..40) {
        let tracker = Arc::new(tracker_with_mentions(count));
        let integration = integration_with(&tracker, LookupOptions::new("https://redmine.test"));

        let results = tokio_test::block_on(integration.lookup(&[ip("10.0.0.1")])).unwrap();
        match &results[0].data {
            None => prop_assert_eq!(count, 0),
            Some(data) => {
                prop_assert_eq!(data.total_count, count);
                let expected = usize::try_from(count).unwrap().min(SEARCH_RESULT_LIMIT);
                prop_assert_eq!(data.issue_ids.len(), expected);
            }
        }
    }
}
