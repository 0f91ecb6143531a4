//! Typed access to the Redmine endpoints the integration consumes.
//!
//! `TrackerClient` builds each [`RequestSpec`], runs it through
//! [`transport::execute`] and decodes the payload. It does not fan out,
//! cache or verify anything; the orchestrators above it do that.

use crate::config::LookupOptions;
use crate::error::{ClassifiedError, Result};
use crate::model::{Entity, Issue, IssueId, SEARCH_RESULT_LIMIT, SearchMatch, Status, User, UserRecord};
use crate::transport::{self, RequestSpec, Transport};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Status codes accepted for reads.
pub const READ_OK: &[u16] = &[200];

/// Status codes accepted for updates; current Redmine answers `204 No Content`.
pub const WRITE_OK: &[u16] = &[200, 204];

/// Relations included when fetching issue detail.
const DETAIL_INCLUDES: &str = "relations,children,journals,attachments";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: IssueId,
}

/// Client for one Redmine instance.
#[derive(Clone)]
pub struct TrackerClient {
    transport: Arc<dyn Transport>,
    options: Arc<LookupOptions>,
}

impl std::fmt::Debug for TrackerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerClient")
            .field("url", &self.options.url)
            .field("project", &self.options.project)
            .field("transport", &"<dyn Transport>")
            .finish_non_exhaustive()
    }
}

impl TrackerClient {
    /// Create a client over `transport`.
    pub fn new(transport: Arc<dyn Transport>, options: Arc<LookupOptions>) -> Self {
        Self { transport, options }
    }

    /// The options this client was built with.
    #[must_use]
    pub fn options(&self) -> &LookupOptions {
        &self.options
    }

    /// Request searching the tracker for one entity.
    #[must_use]
    pub fn search_request(&self, entity: &Entity) -> RequestSpec {
        let path = if self.options.project.is_empty() {
            "/search.json".to_string()
        } else {
            format!("/projects/{}/search.json", self.options.project)
        };

        RequestSpec::get(path)
            .query("q", format!("\"{}\"", entity.value))
            .query("issues", "1")
            .query("limit", SEARCH_RESULT_LIMIT.to_string())
            .api_key(&self.options.api_key)
    }

    /// Request fetching one issue with its relations, children, journals and attachments.
    #[must_use]
    pub fn issue_request(&self, issue_id: IssueId) -> RequestSpec {
        let include = if self.options.include_changesets {
            format!("{DETAIL_INCLUDES},changesets")
        } else {
            DETAIL_INCLUDES.to_string()
        };

        RequestSpec::get(format!("/issues/{issue_id}.json"))
            .query("include", include)
            .api_key(&self.options.api_key)
    }

    /// Request writing `changes` (the inner `issue` object) to an issue.
    #[must_use]
    pub fn update_request(&self, issue_id: IssueId, changes: Value) -> RequestSpec {
        RequestSpec::put(
            format!("/issues/{issue_id}.json"),
            serde_json::json!({ "issue": changes }),
        )
        .api_key(&self.options.api_key)
    }

    /// Request listing issue statuses, authenticated with the admin key.
    #[must_use]
    pub fn statuses_request(&self) -> RequestSpec {
        RequestSpec::get("/issue_statuses.json").api_key(&self.options.admin_api_key)
    }

    /// Request listing users, authenticated with the admin key.
    #[must_use]
    pub fn users_request(&self) -> RequestSpec {
        RequestSpec::get("/users.json").api_key(&self.options.admin_api_key)
    }

    /// Search for one entity. Zero hits yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the classified transport/HTTP failure, or `UnexpectedPayload`
    /// if the body is not a search response.
    pub async fn search(&self, entity: &Entity) -> Result<Option<SearchMatch>> {
        let body = transport::execute(self.transport.as_ref(), &self.search_request(entity), READ_OK)
            .await?;
        let response: SearchResponse = serde_json::from_value(body.clone()).map_err(|e| {
            ClassifiedError::unexpected_payload(format!("Unexpected search payload: {e}"), body)
        })?;

        if response.total_count == 0 {
            return Ok(None);
        }

        let ids = response.results.into_iter().map(|hit| hit.id).collect();
        Ok(Some(SearchMatch::new(response.total_count, ids)))
    }

    /// Fetch one issue and derive its note count.
    ///
    /// # Errors
    ///
    /// Returns the classified transport/HTTP failure, or `UnexpectedPayload`
    /// if the body has no decodable `issue` object.
    pub async fn get_issue(&self, issue_id: IssueId) -> Result<Issue> {
        let mut body =
            transport::execute(self.transport.as_ref(), &self.issue_request(issue_id), READ_OK)
                .await?;

        let raw = body.get_mut("issue").map(Value::take).unwrap_or(Value::Null);
        let mut issue: Issue = serde_json::from_value(raw.clone()).map_err(|e| {
            ClassifiedError::unexpected_payload(format!("Unexpected issue payload: {e}"), raw)
        })?;
        issue.derive_num_notes();

        debug!(issue_id = %issue.id, num_notes = issue.num_notes, "Returning Issue");
        Ok(issue)
    }

    /// Send one update. The response body is discarded; only the status matters.
    ///
    /// # Errors
    ///
    /// Returns the classified failure when the status is not in [`WRITE_OK`].
    pub async fn update(&self, issue_id: IssueId, changes: Value) -> Result<()> {
        let request = self.update_request(issue_id, changes);
        transport::execute(self.transport.as_ref(), &request, WRITE_OK).await?;
        Ok(())
    }

    /// Fetch every issue status.
    ///
    /// # Errors
    ///
    /// Returns the classified failure, or `UnexpectedPayload` when
    /// `issue_statuses` is not an array of statuses.
    pub async fn statuses(&self) -> Result<Vec<Status>> {
        let body = transport::execute(self.transport.as_ref(), &self.statuses_request(), READ_OK)
            .await?;
        decode_list(body, "issue_statuses", "Unexpected return payload when fetching issue statuses")
    }

    /// Fetch every user, projected to `{id, "<firstname> <lastname>"}`.
    ///
    /// # Errors
    ///
    /// Returns the classified failure, or `UnexpectedPayload` when `users` is
    /// not an array of users.
    pub async fn users(&self) -> Result<Vec<User>> {
        let body =
            transport::execute(self.transport.as_ref(), &self.users_request(), READ_OK).await?;
        let records: Vec<UserRecord> =
            decode_list(body, "users", "Unexpected return payload when fetching users")?;
        Ok(records.into_iter().map(User::from).collect())
    }
}

fn decode_list<T: serde::de::DeserializeOwned>(
    mut body: Value,
    field: &str,
    detail: &str,
) -> Result<Vec<T>> {
    let list = body.get_mut(field).map(Value::take).unwrap_or(Value::Null);
    if !list.is_array() {
        return Err(ClassifiedError::unexpected_payload(detail, list));
    }
    serde_json::from_value(list.clone())
        .map_err(|e| ClassifiedError::unexpected_payload(format!("{detail}: {e}"), list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::EntityType;
    use crate::transport::in_memory::InMemoryTracker;
    use crate::transport::Method;

    fn client_with(options: LookupOptions) -> TrackerClient {
        TrackerClient::new(Arc::new(InMemoryTracker::new()), Arc::new(options))
    }

    #[test]
    fn test_search_request_tracker_wide() {
        let client = client_with(LookupOptions::new("https://r").with_api_key("k"));
        let request = client.search_request(&Entity::new("8.8.8.8", EntityType::Ipv4));

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/search.json");
        assert_eq!(request.query_value("q"), Some("\"8.8.8.8\""));
        assert_eq!(request.query_value("issues"), Some("1"));
        assert_eq!(request.query_value("limit"), Some("10"));
        assert_eq!(request.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_search_request_scoped_to_project() {
        let client = client_with(LookupOptions::new("https://r").with_project("soc"));
        let request = client.search_request(&Entity::new("a@b.io", EntityType::Email));

        assert_eq!(request.path, "/projects/soc/search.json");
        assert_eq!(request.api_key, None);
    }

    #[test]
    fn test_issue_request_includes() {
        let mut options = LookupOptions::new("https://r");
        let client = client_with(options.clone());
        assert_eq!(
            client.issue_request(IssueId::new(7)).query_value("include"),
            Some("relations,children,journals,attachments")
        );

        options.include_changesets = true;
        let client = client_with(options);
        let request = client.issue_request(IssueId::new(7));
        assert_eq!(request.path, "/issues/7.json");
        assert_eq!(
            request.query_value("include"),
            Some("relations,children,journals,attachments,changesets")
        );
    }

    #[test]
    fn test_reference_requests_use_admin_key() {
        let client = client_with(
            LookupOptions::new("https://r")
                .with_api_key("user")
                .with_admin_api_key("admin"),
        );
        assert_eq!(client.statuses_request().api_key.as_deref(), Some("admin"));
        assert_eq!(client.users_request().api_key.as_deref(), Some("admin"));
        assert_eq!(
            client
                .update_request(IssueId::new(1), serde_json::json!({"notes": "n"}))
                .api_key
                .as_deref(),
            Some("user")
        );
    }

    #[test]
    fn test_decode_list_rejects_non_array() {
        let result: Result<Vec<Status>> = decode_list(
            serde_json::json!({"issue_statuses": {"oops": true}}),
            "issue_statuses",
            "Unexpected return payload when fetching issue statuses",
        );
        let error = result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnexpectedPayload);
        assert!(error.context.body.is_some());
    }

    #[tokio::test]
    async fn test_get_unknown_issue_is_not_found() {
        let tracker = Arc::new(InMemoryTracker::new());
        let client = TrackerClient::new(tracker, Arc::new(LookupOptions::new("https://r")));
        let error = client.get_issue(IssueId::new(404)).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
    }
}
