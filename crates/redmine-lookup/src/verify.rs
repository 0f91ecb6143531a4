//! Write-verify engine.
//!
//! Redmine answers a well-formed `PUT` with success even when it ignored the
//! change (missing permission, workflow transition not allowed). Every write
//! here is therefore followed by a re-fetch of the issue, and the refreshed
//! state is checked against what was requested. Callers get either the
//! refreshed issue or exactly one classified error; the echo of the request
//! is never returned as the new state.
//!
//! [`verified_write`] is the generic combinator. [`AttributeUpdate`] knows the
//! wire name, the selector and the mismatch message for each attribute.

use crate::client::TrackerClient;
use crate::error::{ClassifiedError, ErrorKind, Result};
use crate::model::{Issue, IssueId, NamedRef};
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Result of comparing refreshed state with a requested change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The change is visible in the refreshed issue.
    Confirmed,

    /// The change is not visible; carries the user-facing detail.
    Mismatch(String),
}

impl Verification {
    /// `Confirmed` when `ok`, otherwise a mismatch with `detail`.
    pub fn check(ok: bool, detail: impl FnOnce() -> String) -> Self {
        if ok { Self::Confirmed } else { Self::Mismatch(detail()) }
    }
}

/// Write `changes` to an issue, re-fetch it and let `verify` judge the result.
///
/// A rejected write returns immediately without a re-fetch.
///
/// # Errors
///
/// Returns the classified failure of the write or the re-fetch, or
/// `SemanticMismatch` when `verify` reports a mismatch.
pub async fn verified_write<F>(
    client: &TrackerClient,
    issue_id: IssueId,
    changes: Value,
    verify: F,
) -> Result<Issue>
where
    F: FnOnce(&Issue) -> Verification,
{
    client.update(issue_id, changes).await?;
    let issue = client.get_issue(issue_id).await?;

    match verify(&issue) {
        Verification::Confirmed => Ok(issue),
        Verification::Mismatch(detail) => Err(ClassifiedError::semantic_mismatch(detail)),
    }
}

/// A single-attribute change.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeUpdate {
    /// Move the issue to another workflow status.
    Status {
        /// Requested status
        new: NamedRef,
        /// Status the caller believed the issue had
        old: Option<NamedRef>,
    },

    /// Reassign the issue.
    Assignee {
        /// Requested assignee
        new: NamedRef,
        /// Assignee the caller believed the issue had
        old: Option<NamedRef>,
    },

    /// Replace the description.
    Description(String),

    /// Append a note.
    Notes {
        /// Note text
        text: String,
        /// Highest journal id seen before the write; only newer journals confirm
        after: Option<u64>,
    },

    /// Set any other top-level field.
    Other {
        /// Redmine field name
        name: String,
        /// Requested value
        value: Value,
    },
}

impl AttributeUpdate {
    /// Build an update from a generic `{attributeName, attributeValue}` pair.
    ///
    /// `status_id` and `assigned_to_id` are routed to the id-compared variants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAction` when the value has the wrong shape for the
    /// attribute (non-string description or notes, non-numeric id, empty note).
    pub fn from_attribute(name: &str, value: Value) -> Result<Self> {
        let update = match name {
            "description" => Self::Description(expect_text(name, value)?),
            "notes" => {
                let text = expect_text(name, value)?;
                if text.trim().is_empty() {
                    return Err(ClassifiedError::invalid_action("Cannot add an empty note"));
                }
                Self::Notes { text, after: None }
            }
            "status_id" | "assigned_to_id" => {
                let id = as_id(&value).ok_or_else(|| {
                    ClassifiedError::invalid_action(format!("{name} must be a numeric id"))
                })?;
                let new = NamedRef::new(id, format!("#{id}"));
                if name == "status_id" {
                    Self::Status { new, old: None }
                } else {
                    Self::Assignee { new, old: None }
                }
            }
            "" => return Err(ClassifiedError::invalid_action("attributeName is required")),
            _ => Self::Other {
                name: name.to_string(),
                value,
            },
        };
        Ok(update)
    }

    /// Attribute name used in error context and logs.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Status { .. } => "status",
            Self::Assignee { .. } => "assigned_to",
            Self::Description(_) => "description",
            Self::Notes { .. } => "notes",
            Self::Other { name, .. } => name,
        }
    }

    /// Logical operation name used in error context.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Status { .. } => "update_status",
            Self::Assignee { .. } => "update_assignee",
            _ => "update_attribute",
        }
    }

    /// The inner `issue` object of the `PUT` body.
    #[must_use]
    pub fn changes(&self) -> Value {
        match self {
            Self::Status { new, .. } => json!({ "status_id": new.id }),
            Self::Assignee { new, .. } => json!({ "assigned_to_id": new.id }),
            Self::Description(text) => json!({ "description": text }),
            Self::Notes { text, .. } => json!({ "notes": text }),
            Self::Other { name, value } => json!({ name.as_str(): value }),
        }
    }

    /// Compare the refreshed issue with this change.
    ///
    /// Status and assignee compare ids, so a rename between the write and the
    /// re-fetch still confirms. Description compares text with line endings
    /// normalized. Notes are append-only and confirm when a
    /// journal newer than `after` carries the same text.
    #[must_use]
    pub fn verify(&self, issue: &Issue) -> Verification {
        match self {
            Self::Status { new, old } => Verification::check(issue.status.id == new.id, || {
                let from = old.as_ref().map_or(issue.status.name.as_str(), |o| o.name.as_str());
                format!("Cannot update status from \"{from}\" to \"{}\"", new.name)
            }),
            Self::Assignee { new, old } => Verification::check(
                issue.assigned_to.as_ref().is_some_and(|a| a.id == new.id),
                || {
                    let from = old
                        .as_ref()
                        .or(issue.assigned_to.as_ref())
                        .map_or("(unassigned)", |o| o.name.as_str());
                    format!("Cannot update assignee from \"{from}\" to \"{}\"", new.name)
                },
            ),
            Self::Description(text) => Verification::check(
                unix_line_endings(&issue.description) == unix_line_endings(text),
                || "Cannot update description.  Please check your permissions.".to_string(),
            ),
            Self::Notes { text, after } => {
                let wanted = normalize_note(text);
                Verification::check(
                    issue
                        .journals
                        .iter()
                        .filter(|j| after.is_none_or(|seen| j.id > seen))
                        .any(|j| normalize_note(&j.notes) == wanted),
                    || "Cannot add note.  Please check your permissions.".to_string(),
                )
            }
            Self::Other { name, value } => Verification::check(
                issue.attribute(name).is_some_and(|current| values_match(&current, value)),
                || format!("Cannot update {name}.  Please check your permissions."),
            ),
        }
    }
}

/// One write request against one issue.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Target issue
    pub issue_id: IssueId,

    /// Requested change
    pub update: AttributeUpdate,
}

impl UpdateRequest {
    /// Create a new request.
    #[must_use]
    pub const fn new(issue_id: IssueId, update: AttributeUpdate) -> Self {
        Self { issue_id, update }
    }
}

/// Apply one update with read-after-write verification.
///
/// A note without a known `after` point is preceded by a read of the issue so
/// that an existing journal with the same text cannot confirm it.
///
/// # Errors
///
/// Returns the classified failure of the write, the re-fetch or the
/// verification, annotated with the operation, issue and attribute.
pub async fn apply(client: &TrackerClient, request: &UpdateRequest) -> Result<Issue> {
    let UpdateRequest { issue_id, update } = request;
    debug!(issue_id = %issue_id, attribute = update.attribute(), "Updating issue");

    let annotate = |e: ClassifiedError| {
        e.with_operation(update.operation())
            .with_issue(*issue_id)
            .with_attribute(update.attribute())
    };

    let update = match update {
        AttributeUpdate::Notes { text, after: None } => {
            let before = client.get_issue(*issue_id).await.map_err(annotate)?;
            AttributeUpdate::Notes {
                text: text.clone(),
                after: Some(before.journals.iter().map(|j| j.id).max().unwrap_or(0)),
            }
        }
        other => other.clone(),
    };

    verified_write(client, *issue_id, update.changes(), |issue| update.verify(issue))
        .await
        .map_err(|e| {
            if e.kind == ErrorKind::SemanticMismatch {
                warn!(
                    issue_id = %issue_id,
                    attribute = update.attribute(),
                    detail = %e.detail,
                    "Update was not applied"
                );
            }
            annotate(e)
        })
}

fn expect_text(name: &str, value: Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Null => Ok(String::new()),
        other => Err(ClassifiedError::invalid_action(format!(
            "{name} must be text, got {other}"
        ))),
    }
}

fn as_id(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Redmine stores text fields with CRLF line endings.
fn unix_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}

fn normalize_note(text: &str) -> String {
    unix_line_endings(text).trim().to_string()
}

/// Redmine echoes numbers as strings for some fields; compare both spellings.
fn values_match(current: &Value, requested: &Value) -> bool {
    if current == requested {
        return true;
    }
    match (current, requested) {
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            *a == b.to_string()
        }
        (Value::Object(map), Value::Number(_) | Value::String(_)) => map
            .get("id")
            .is_some_and(|id| values_match(id, requested)),
        _ => false,
    }
}
