//! Presentation-contract messages.
//!
//! The UI sends one flat JSON object per action, for example:
//!
//! ```json
//! {"action": "UPDATE_STATUS", "id": 101,
//!  "newStatus": {"id": 2, "name": "In Progress"},
//!  "oldStatus": {"id": 1, "name": "New"}}
//! ```
//!
//! Every action answers with the refreshed issue, except
//! `LOAD_REFERENCE_DATA` which answers with the statuses and users.

use crate::error::{ClassifiedError, Result};
use crate::model::{Issue, IssueId, NamedRef, ReferenceData};
use crate::verify::{AttributeUpdate, UpdateRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action names accepted by [`Action::from_payload`].
pub const ACTION_NAMES: &[&str] = &[
    "UPDATE_ATTRIBUTE",
    "UPDATE_STATUS",
    "UPDATE_ASSIGNEE",
    "REFRESH_ISSUE",
    "LOAD_REFERENCE_DATA",
];

/// A message from the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    /// Set one attribute by its Redmine field name.
    UpdateAttribute {
        /// Target issue
        id: IssueId,
        /// Redmine field name (`description`, `notes`, `done_ratio`, ...)
        attribute_name: String,
        /// Requested value
        #[serde(default)]
        attribute_value: Value,
    },

    /// Move the issue to another status.
    UpdateStatus {
        /// Target issue
        id: IssueId,
        /// Requested status
        new_status: NamedRef,
        /// Status shown to the user before the edit
        #[serde(default)]
        old_status: Option<NamedRef>,
    },

    /// Reassign the issue.
    UpdateAssignee {
        /// Target issue
        id: IssueId,
        /// Requested assignee
        new_assignee: NamedRef,
        /// Assignee shown to the user before the edit
        #[serde(default)]
        old_assignee: Option<NamedRef>,
    },

    /// Re-fetch the issue without changing it.
    RefreshIssue {
        /// Target issue
        id: IssueId,
    },

    /// Fetch (or reuse) the statuses and users.
    LoadReferenceData,
}

impl Action {
    /// Decode a raw message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAction` for an unknown `action` or a payload whose
    /// fields do not fit the named action.
    pub fn from_payload(payload: Value) -> Result<Self> {
        let name = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !ACTION_NAMES.contains(&name.as_str()) {
            let mut error = ClassifiedError::invalid_action("Invalid Action passed to onMessage");
            error.context.body = Some(payload);
            return Err(error);
        }

        serde_json::from_value(payload).map_err(|e| {
            ClassifiedError::invalid_action(format!("Malformed {name} payload: {e}"))
        })
    }

    /// Target issue, for the actions that have one.
    #[must_use]
    pub const fn issue_id(&self) -> Option<IssueId> {
        match self {
            Self::UpdateAttribute { id, .. }
            | Self::UpdateStatus { id, .. }
            | Self::UpdateAssignee { id, .. }
            | Self::RefreshIssue { id } => Some(*id),
            Self::LoadReferenceData => None,
        }
    }

    /// The write this action asks for, if it is a write.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAction` when an `UPDATE_ATTRIBUTE` value does not fit
    /// its attribute.
    pub fn update_request(&self) -> Result<Option<UpdateRequest>> {
        let request = match self {
            Self::UpdateAttribute {
                id,
                attribute_name,
                attribute_value,
            } => UpdateRequest::new(
                *id,
                AttributeUpdate::from_attribute(attribute_name, attribute_value.clone())?,
            ),
            Self::UpdateStatus {
                id,
                new_status,
                old_status,
            } => UpdateRequest::new(
                *id,
                AttributeUpdate::Status {
                    new: new_status.clone(),
                    old: old_status.clone(),
                },
            ),
            Self::UpdateAssignee {
                id,
                new_assignee,
                old_assignee,
            } => UpdateRequest::new(
                *id,
                AttributeUpdate::Assignee {
                    new: new_assignee.clone(),
                    old: old_assignee.clone(),
                },
            ),
            Self::RefreshIssue { .. } | Self::LoadReferenceData => return Ok(None),
        };
        Ok(Some(request))
    }

    /// Log line for a failed action.
    #[must_use]
    pub fn failure_summary(&self) -> String {
        match self {
            Self::UpdateAttribute {
                id,
                attribute_name,
                attribute_value,
            } => format!(
                "Error updating attribute {attribute_name} with value {attribute_value} (issue #{id})"
            ),
            Self::UpdateStatus {
                id,
                new_status,
                old_status,
            } => format!(
                "Error updating status from {} to {} (issue #{id})",
                old_status.as_ref().map_or("?", |s| s.name.as_str()),
                new_status.name
            ),
            Self::UpdateAssignee {
                id,
                new_assignee,
                old_assignee,
            } => format!(
                "Error updating assignee from {} to {} (issue #{id})",
                old_assignee.as_ref().map_or("?", |a| a.name.as_str()),
                new_assignee.name
            ),
            Self::RefreshIssue { id } => format!("Error refreshing issue #{id}"),
            Self::LoadReferenceData => "Error loading reference data".to_string(),
        }
    }
}

/// Answer to a dispatched action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DispatchResponse {
    /// Refreshed, authoritative issue state
    Issue(Box<Issue>),

    /// Statuses and users
    ReferenceData(ReferenceData),
}

impl DispatchResponse {
    /// The issue, if this response carries one.
    #[must_use]
    pub fn into_issue(self) -> Option<Issue> {
        match self {
            Self::Issue(issue) => Some(*issue),
            Self::ReferenceData(_) => None,
        }
    }
}
