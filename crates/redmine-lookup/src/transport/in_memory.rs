//! In-memory Redmine tracker.
//!
//! [`InMemoryTracker`] answers the same REST surface the lookup layer uses
//! (search, issue detail, issue update, statuses, users) from process-local
//! state. It reproduces the tracker behaviors the write-verify engine exists
//! for: a `PUT` that is acknowledged but silently ignored when the attribute is
//! locked or the status transition is not allowed by the workflow.
//!
//! Test hooks:
//!
//! - required user/admin API keys (401 / 403)
//! - per-request latency, so concurrent callers really interleave
//! - fault injection by method, path and search term
//! - per-route request counters

use super::{Method, RawResponse, RequestSpec, Transport, TransportError};
use crate::model::{Issue, IssueId, Journal, JournalDetail, NamedRef, Status, UserRecord};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Page size Redmine uses when no `limit` is given.
const DEFAULT_PAGE_SIZE: usize = 25;

/// What an injected fault does to a matching request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Answer with this status and an empty body.
    Status(u16),

    /// Fail without a response.
    Disconnect,
}

/// A scripted failure for requests matching method, path and search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    method: Option<Method>,
    path: String,
    query: Option<String>,
    outcome: FaultOutcome,
    remaining: Option<usize>,
}

impl Fault {
    /// Answer requests for `path` with `status`.
    pub fn status(path: impl Into<String>, status: u16) -> Self {
        Self {
            method: None,
            path: path.into(),
            query: None,
            outcome: FaultOutcome::Status(status),
            remaining: None,
        }
    }

    /// Drop requests for `path` without answering.
    pub fn disconnect(path: impl Into<String>) -> Self {
        Self {
            outcome: FaultOutcome::Disconnect,
            ..Self::status(path, 0)
        }
    }

    /// Only match requests with this method.
    #[must_use]
    pub const fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Only match searches for this (unquoted) term.
    #[must_use]
    pub fn for_query(mut self, term: impl Into<String>) -> Self {
        self.query = Some(term.into());
        self
    }

    /// Stop matching after `count` hits.
    #[must_use]
    pub const fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    fn matches(&self, request: &RequestSpec) -> bool {
        self.remaining != Some(0)
            && self.method.is_none_or(|m| m == request.method)
            && self.path == request.path
            && self
                .query
                .as_deref()
                .is_none_or(|term| request.query_value("q").map(strip_quotes) == Some(term))
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    issues: BTreeMap<u64, Issue>,
    issue_projects: HashMap<u64, String>,
    projects: HashSet<String>,
    statuses: Vec<Status>,
    users: Vec<UserRecord>,
    api_keys: HashSet<String>,
    admin_keys: HashSet<String>,
    locked_attributes: HashSet<String>,
    forbidden_transitions: HashSet<(u64, u64)>,
    faults: Vec<Fault>,
    counts: HashMap<String, usize>,
    next_journal_id: u64,
    put_status: u16,
}

/// Process-local fake of the Redmine REST API.
#[derive(Debug)]
pub struct InMemoryTracker {
    state: Mutex<TrackerState>,
    latency: Duration,
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTracker {
    /// Create an empty tracker that accepts any API key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                next_journal_id: 1,
                put_status: 200,
                ..TrackerState::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delay every request by `latency` before answering.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// A small seeded tracker for demos.
    #[must_use]
    pub fn demo() -> Self {
        let tracker = Self::new();
        tracker.add_status(1, "New", false);
        tracker.add_status(2, "In Progress", false);
        tracker.add_status(3, "Resolved", false);
        tracker.add_status(5, "Closed", true);
        tracker.add_user(5, "Ada", "Lovelace");
        tracker.add_user(7, "Grace", "Hopper");
        tracker.create_issue(
            101,
            "Beaconing to 8.8.8.8 from build agents",
            "Outbound DNS to 8.8.8.8 bypassing the resolver.",
            1,
        );
        tracker.append_journal(101, "Seen again on agent-04.", Vec::new());
        tracker.create_issue(
            205,
            "Phishing campaign using evil.example.com",
            "Mail from billing@evil.example.com; landing page resolves to 8.8.8.8.",
            2,
        );
        tracker.assign(205, 7);
        tracker.forbid_transition(1, 5);
        tracker
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a workflow status.
    pub fn add_status(&self, id: u64, name: &str, is_closed: bool) {
        self.lock().statuses.push(Status {
            id,
            name: name.to_string(),
            is_closed,
        });
    }

    /// Register a user.
    pub fn add_user(&self, id: u64, firstname: &str, lastname: &str) {
        self.lock().users.push(UserRecord {
            id,
            login: firstname.to_lowercase(),
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
        });
    }

    /// Change a user's name; issues assigned to them report the new name.
    pub fn rename_user(&self, id: u64, firstname: &str, lastname: &str) {
        let mut state = self.lock();
        if let Some(user) = state.users.iter_mut().find(|u| u.id == id) {
            user.firstname = firstname.to_string();
            user.lastname = lastname.to_string();
        }
    }

    /// Register a project identifier, making `/projects/{id}/search.json` valid.
    pub fn add_project(&self, identifier: &str) {
        self.lock().projects.insert(identifier.to_string());
    }

    /// Create an issue outside any project.
    pub fn create_issue(&self, id: u64, subject: &str, description: &str, status_id: u64) {
        let mut state = self.lock();
        let status = state.status_ref(status_id);
        state.issues.insert(
            id,
            Issue {
                id: IssueId::new(id),
                subject: subject.to_string(),
                status,
                assigned_to: None,
                description: description.to_string(),
                journals: Vec::new(),
                num_notes: 0,
                extra: Map::new(),
            },
        );
    }

    /// Create an issue inside `project`.
    pub fn create_issue_in(
        &self,
        project: &str,
        id: u64,
        subject: &str,
        description: &str,
        status_id: u64,
    ) {
        self.add_project(project);
        self.create_issue(id, subject, description, status_id);
        let mut state = self.lock();
        state.issue_projects.insert(id, project.to_string());
        if let Some(issue) = state.issues.get_mut(&id) {
            issue
                .extra
                .insert("project".into(), json!({"id": 1, "name": project}));
        }
    }

    /// Assign an issue directly, bypassing the API.
    pub fn assign(&self, issue_id: u64, user_id: u64) {
        let mut state = self.lock();
        let user = state.user_ref(user_id);
        if let Some(issue) = state.issues.get_mut(&issue_id) {
            issue.assigned_to = user;
        }
    }

    /// Append a journal directly, bypassing the API.
    pub fn append_journal(&self, issue_id: u64, notes: &str, details: Vec<JournalDetail>) {
        self.lock().push_journal(issue_id, notes, details);
    }

    /// Only accept these user keys (admin keys are always accepted); others get 401.
    pub fn require_api_keys(&self, keys: &[&str]) {
        self.lock()
            .api_keys
            .extend(keys.iter().map(ToString::to_string));
    }

    /// Restrict `/users.json` to these keys; others get 403.
    pub fn require_admin_keys(&self, keys: &[&str]) {
        self.lock()
            .admin_keys
            .extend(keys.iter().map(ToString::to_string));
    }

    /// Silently ignore writes to this attribute (`description`, `status_id`, ...).
    pub fn lock_attribute(&self, attribute: &str) {
        self.lock().locked_attributes.insert(attribute.to_string());
    }

    /// Silently ignore status changes from `from` to `to`.
    pub fn forbid_transition(&self, from: u64, to: u64) {
        self.lock().forbidden_transitions.insert((from, to));
    }

    /// Status code returned for accepted updates (200 by default).
    pub fn set_put_status(&self, status: u16) {
        self.lock().put_status = status;
    }

    /// Add a scripted fault.
    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Remove every scripted fault.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Number of requests received for `method` and `path`.
    #[must_use]
    pub fn request_count(&self, method: Method, path: &str) -> usize {
        self.lock()
            .counts
            .get(&route_key(method, path))
            .copied()
            .unwrap_or(0)
    }

    /// Number of requests received in total.
    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.lock().counts.values().sum()
    }

    /// Current server-side state of an issue.
    #[must_use]
    pub fn issue(&self, id: u64) -> Option<Issue> {
        let state = self.lock();
        state.issues.get(&id).map(|issue| state.render_issue(issue))
    }
}

#[async_trait]
impl Transport for InMemoryTracker {
    async fn send(&self, request: &RequestSpec) -> Result<RawResponse, TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();
        *state
            .counts
            .entry(route_key(request.method, &request.path))
            .or_insert(0) += 1;

        if let Some(fault) = state.faults.iter_mut().find(|f| f.matches(request)) {
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining -= 1;
            }
            return match fault.outcome {
                FaultOutcome::Status(status) => Ok(RawResponse::new(status, Value::Null)),
                FaultOutcome::Disconnect => Err(TransportError::Connect(format!(
                    "connection reset while requesting {}",
                    request.path
                ))),
            };
        }

        Ok(state.handle(request))
    }
}

impl TrackerState {
    fn handle(&mut self, request: &RequestSpec) -> RawResponse {
        let key = request.api_key.as_deref();
        if !self.api_keys.is_empty()
            && !key.is_some_and(|k| self.api_keys.contains(k) || self.admin_keys.contains(k))
        {
            return RawResponse::new(401, Value::Null);
        }

        let path = request.path.as_str();
        match (request.method, path) {
            (Method::Get, "/search.json") => self.search(request, None),
            (Method::Get, "/issue_statuses.json") => {
                RawResponse::new(200, json!({"issue_statuses": self.statuses}))
            }
            (Method::Get, "/users.json") => self.list_users(key),
            (Method::Get, _) if path.starts_with("/projects/") => {
                match project_search_scope(path) {
                    Some(project) => self.search(request, Some(project)),
                    None => RawResponse::new(404, Value::Null),
                }
            }
            (method, _) => match parse_issue_path(path) {
                Some(id) if method == Method::Get => self.show_issue(id, request),
                Some(id) => self.update_issue(id, request),
                None => RawResponse::new(404, Value::Null),
            },
        }
    }

    fn search(&self, request: &RequestSpec, project: Option<&str>) -> RawResponse {
        if let Some(project) = project
            && !self.projects.contains(project)
        {
            return RawResponse::new(404, Value::Null);
        }

        let term = request
            .query_value("q")
            .map(strip_quotes)
            .unwrap_or_default()
            .to_lowercase();
        let limit = request
            .query_value("limit")
            .and_then(|l| l.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let hits: Vec<&Issue> = self
            .issues
            .values()
            .filter(|issue| {
                project.is_none_or(|p| {
                    self.issue_projects.get(&issue.id.get()).map(String::as_str) == Some(p)
                })
            })
            .filter(|issue| !term.is_empty() && issue_mentions(issue, &term))
            .collect();

        let results: Vec<Value> = hits
            .iter()
            .take(limit)
            .map(|issue| {
                json!({
                    "id": issue.id,
                    "title": format!("Issue #{} ({}): {}", issue.id, issue.status.name, issue.subject),
                    "type": "issue",
                    "url": format!("/issues/{}", issue.id),
                    "description": issue.description,
                })
            })
            .collect();

        RawResponse::new(
            200,
            json!({
                "results": results,
                "total_count": hits.len(),
                "offset": 0,
                "limit": limit,
            }),
        )
    }

    fn list_users(&self, key: Option<&str>) -> RawResponse {
        if !self.admin_keys.is_empty() && !key.is_some_and(|k| self.admin_keys.contains(k)) {
            return RawResponse::new(403, Value::Null);
        }
        RawResponse::new(
            200,
            json!({
                "users": self.users,
                "total_count": self.users.len(),
                "offset": 0,
                "limit": DEFAULT_PAGE_SIZE,
            }),
        )
    }

    fn show_issue(&self, id: u64, request: &RequestSpec) -> RawResponse {
        let Some(issue) = self.issues.get(&id) else {
            return RawResponse::new(404, Value::Null);
        };

        let mut rendered = self.render_issue(issue);
        let includes_journals = request
            .query_value("include")
            .is_some_and(|include| include.split(',').any(|part| part == "journals"));
        if !includes_journals {
            rendered.journals.clear();
        }

        let mut body = serde_json::to_value(&rendered).unwrap_or(Value::Null);
        // Redmine does not send the derived count; the client computes it.
        if let Some(object) = body.as_object_mut() {
            object.remove("numNotes");
        }
        RawResponse::new(200, json!({ "issue": body }))
    }

    fn update_issue(&mut self, id: u64, request: &RequestSpec) -> RawResponse {
        if !self.issues.contains_key(&id) {
            return RawResponse::new(404, Value::Null);
        }
        let Some(changes) = request
            .body
            .as_ref()
            .and_then(|b| b.get("issue"))
            .and_then(Value::as_object)
        else {
            return RawResponse::new(422, json!({"errors": ["Issue payload is missing"]}));
        };

        let mut notes = String::new();
        let mut details = Vec::new();

        for (attribute, value) in changes {
            if self.locked_attributes.contains(attribute) {
                continue;
            }
            match attribute.as_str() {
                "status_id" => {
                    if let Some(detail) = as_id(value).and_then(|to| self.change_status(id, to)) {
                        details.push(detail);
                    }
                }
                "assigned_to_id" => match as_id(value) {
                    Some(user_id) if self.user_ref(user_id).is_none() => {
                        return RawResponse::new(422, json!({"errors": ["Assignee is invalid"]}));
                    }
                    user_id => details.extend(self.change_assignee(id, user_id)),
                },
                "notes" => notes = value.as_str().unwrap_or_default().to_string(),
                _ => details.extend(self.change_field(id, attribute, value)),
            }
        }

        if !notes.is_empty() || !details.is_empty() {
            self.push_journal(id, &notes, details);
        }
        RawResponse::new(self.put_status, Value::Null)
    }

    fn change_status(&mut self, id: u64, to: u64) -> Option<JournalDetail> {
        let status = self.statuses.iter().find(|s| s.id == to)?;
        let new_status = NamedRef::new(status.id, status.name.clone());
        let issue = self.issues.get_mut(&id)?;
        let from = issue.status.id;
        if from == to || self.forbidden_transitions.contains(&(from, to)) {
            return None;
        }
        issue.status = new_status;
        Some(attr_detail("status_id", Some(from.to_string()), Some(to.to_string())))
    }

    fn change_assignee(&mut self, id: u64, user_id: Option<u64>) -> Option<JournalDetail> {
        let user = user_id.and_then(|u| self.user_ref(u));
        let issue = self.issues.get_mut(&id)?;
        let from = issue.assigned_to.as_ref().map(|a| a.id);
        if from == user_id {
            return None;
        }
        issue.assigned_to = user;
        Some(attr_detail(
            "assigned_to_id",
            from.map(|f| f.to_string()),
            user_id.map(|u| u.to_string()),
        ))
    }

    fn change_field(&mut self, id: u64, attribute: &str, value: &Value) -> Option<JournalDetail> {
        let issue = self.issues.get_mut(&id)?;
        let old = issue.attribute(attribute);
        if old.as_ref() == Some(value) {
            return None;
        }
        match attribute {
            "description" => issue.description = value.as_str().unwrap_or_default().to_string(),
            "subject" => issue.subject = value.as_str().unwrap_or_default().to_string(),
            _ => {
                issue.extra.insert(attribute.to_string(), value.clone());
            }
        }
        Some(attr_detail(
            attribute,
            old.map(|v| value_text(&v)),
            Some(value_text(value)),
        ))
    }

    fn push_journal(&mut self, issue_id: u64, notes: &str, details: Vec<JournalDetail>) {
        let id = self.next_journal_id;
        let Some(issue) = self.issues.get_mut(&issue_id) else {
            return;
        };
        self.next_journal_id += 1;
        issue.journals.push(Journal {
            id,
            user: Some(NamedRef::new(1, "Redmine Admin")),
            notes: notes.to_string(),
            created_on: Some(Utc::now()),
            details,
        });
    }

    fn status_ref(&self, status_id: u64) -> NamedRef {
        self.statuses
            .iter()
            .find(|s| s.id == status_id)
            .map_or_else(
                || NamedRef::new(status_id, format!("Status {status_id}")),
                |s| NamedRef::new(s.id, s.name.clone()),
            )
    }

    fn user_ref(&self, user_id: u64) -> Option<NamedRef> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| NamedRef::new(u.id, format!("{} {}", u.firstname, u.lastname)))
    }

    /// Issue as the API would render it now, with current user names.
    fn render_issue(&self, issue: &Issue) -> Issue {
        let mut rendered = issue.clone();
        if let Some(assignee) = rendered.assigned_to.as_mut()
            && let Some(current) = self.user_ref(assignee.id)
        {
            *assignee = current;
        }
        rendered.derive_num_notes();
        rendered
    }
}

fn route_key(method: Method, path: &str) -> String {
    format!("{method} {path}")
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn project_search_scope(path: &str) -> Option<&str> {
    path.strip_prefix("/projects/")
        .and_then(|rest| rest.strip_suffix("/search.json"))
        .filter(|project| !project.is_empty() && !project.contains('/'))
}

fn parse_issue_path(path: &str) -> Option<u64> {
    path.strip_prefix("/issues/")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

fn issue_mentions(issue: &Issue, term: &str) -> bool {
    issue.subject.to_lowercase().contains(term)
        || issue.description.to_lowercase().contains(term)
        || issue
            .journals
            .iter()
            .any(|j| j.notes.to_lowercase().contains(term))
}

fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), ToString::to_string)
}

fn attr_detail(name: &str, old_value: Option<String>, new_value: Option<String>) -> JournalDetail {
    JournalDetail {
        property: "attr".to_string(),
        name: name.to_string(),
        old_value,
        new_value,
    }
}
