//! Detail enrichment orchestrator.
//!
//! Fetches every matched issue concurrently with the same structured-join
//! semantics as [`crate::search::search_all`].

use crate::client::TrackerClient;
use crate::error::Result;
use crate::model::{Issue, IssueDetails, IssueId, ReferenceData};
use futures::future::try_join_all;

/// Fetch every issue in `issue_ids` concurrently, in input order.
///
/// Each issue's `num_notes` counts its journals with non-empty note text.
///
/// # Errors
///
/// Returns the first classified failure, annotated with the issue id.
/// Outstanding fetches are cancelled.
pub async fn enrich_all(client: &TrackerClient, issue_ids: &[IssueId]) -> Result<Vec<Issue>> {
    try_join_all(issue_ids.iter().map(|&issue_id| async move {
        client
            .get_issue(issue_id)
            .await
            .map_err(|e| e.with_operation("issue_detail").with_issue(issue_id))
    }))
    .await
}

/// Fetch the issues and attach the reference snapshot, when there is one.
///
/// # Errors
///
/// Same as [`enrich_all`].
pub async fn enrich(
    client: &TrackerClient,
    issue_ids: &[IssueId],
    reference: Option<ReferenceData>,
) -> Result<IssueDetails> {
    let issues = enrich_all(client, issue_ids).await?;
    let (statuses, users) = reference.map_or((None, None), |r| (Some(r.statuses), Some(r.users)));
    Ok(IssueDetails {
        issues,
        statuses,
        users,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupOptions;
    use crate::error::ErrorKind;
    use crate::model::{JournalDetail, Status, User};
    use crate::transport::in_memory::InMemoryTracker;
    use crate::transport::Transport;
    use std::sync::Arc;

    fn setup() -> TrackerClient {
        let tracker = Arc::new(InMemoryTracker::new());
        tracker.create_issue(10, "first", "", 1);
        tracker.append_journal(10, "a note", Vec::new());
        tracker.append_journal(
            10,
            "",
            vec![JournalDetail {
                property: "attr".into(),
                name: "status_id".into(),
                old_value: Some("1".into()),
                new_value: Some("2".into()),
            }],
        );
        tracker.create_issue(11, "second", "", 1);
        TrackerClient::new(
            tracker as Arc<dyn Transport>,
            Arc::new(LookupOptions::new("https://r")),
        )
    }

    #[tokio::test]
    async fn test_counts_only_journals_with_notes() {
        let client = setup();
        let issues = enrich_all(&client, &[IssueId::new(10), IssueId::new(11)])
            .await
            .unwrap();

        assert_eq!(issues[0].id, IssueId::new(10));
        assert_eq!(issues[0].journals.len(), 2);
        assert_eq!(issues[0].num_notes, 1);
        assert_eq!(issues[1].num_notes, 0);
    }

    #[tokio::test]
    async fn test_missing_issue_fails_the_batch() {
        let client = setup();
        let error = enrich_all(&client, &[IssueId::new(10), IssueId::new(99)])
            .await
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(error.context.issue_id, Some(IssueId::new(99)));
    }

    #[tokio::test]
    async fn test_enrich_attaches_reference_snapshot() {
        let client = setup();
        let reference = ReferenceData {
            statuses: vec![Status { id: 1, name: "New".into(), is_closed: false }],
            users: vec![User { id: 5, name: "Ada Lovelace".into() }],
        };

        let details = enrich(&client, &[IssueId::new(11)], Some(reference.clone()))
            .await
            .unwrap();
        assert_eq!(details.statuses, Some(reference.statuses));
        assert_eq!(details.users, Some(reference.users));

        let bare = enrich(&client, &[IssueId::new(11)], None).await.unwrap();
        assert!(bare.statuses.is_none());
    }
}
