//! Domain types for Redmine lookups.
//!
//! These mirror the Redmine REST payloads closely enough to deserialize them
//! directly, while giving the rest of the crate typed access to the fields the
//! orchestrators and the write-verify engine care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::net::Ipv4Addr;

/// Maximum number of issues returned per entity search.
pub const SEARCH_RESULT_LIMIT: usize = 10;

/// Unique identifier for a Redmine issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(pub u64);

impl IssueId {
    /// Create a new issue ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for IssueId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Kind of indicator an entity carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// Dotted-quad IPv4 address
    #[serde(rename = "IPv4")]
    Ipv4,

    /// 32 hex digit hash
    #[serde(rename = "MD5")]
    Md5,

    /// 40 hex digit hash
    #[serde(rename = "SHA1")]
    Sha1,

    /// 64 hex digit hash
    #[serde(rename = "SHA256")]
    Sha256,

    /// DNS domain name
    #[serde(rename = "domain")]
    Domain,

    /// Email address
    #[serde(rename = "email")]
    Email,
}

impl EntityType {
    /// Guess the entity type of a raw indicator value.
    ///
    /// Returns `None` for values that match none of the supported shapes.
    #[must_use]
    pub fn detect(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if value.parse::<Ipv4Addr>().is_ok() {
            return Some(Self::Ipv4);
        }

        if value.chars().all(|c| c.is_ascii_hexdigit()) {
            return match value.len() {
                32 => Some(Self::Md5),
                40 => Some(Self::Sha1),
                64 => Some(Self::Sha256),
                _ => None,
            };
        }

        if let Some((local, domain)) = value.split_once('@') {
            return (!local.is_empty() && is_domain(domain)).then_some(Self::Email);
        }

        is_domain(value).then_some(Self::Domain)
    }

    /// Name used by Redmine integrations to tag this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ipv4 => "IPv4",
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Domain => "domain",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_domain(value: &str) -> bool {
    let labels: Vec<&str> = value.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        && labels
            .last()
            .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_alphabetic()))
}

/// An indicator value plus its recognized type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Raw indicator value
    pub value: String,

    /// Recognized type
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

impl Entity {
    /// Create a new entity.
    pub fn new(value: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            value: value.into(),
            entity_type,
        }
    }

    /// Create an entity by detecting the type of `value`.
    #[must_use]
    pub fn detect(value: &str) -> Option<Self> {
        EntityType::detect(value).map(|entity_type| Self::new(value.trim(), entity_type))
    }
}

/// An `{id, name}` reference as Redmine embeds it (status, assignee, author, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    /// Referenced record id
    pub id: u64,

    /// Display name at the time of the response
    #[serde(default)]
    pub name: String,
}

impl NamedRef {
    /// Create a new reference.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A single field change recorded on a journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDetail {
    /// Property family (`attr`, `cf`, `attachment`, ...)
    pub property: String,

    /// Changed field name
    pub name: String,

    /// Value before the change
    #[serde(default)]
    pub old_value: Option<String>,

    /// Value after the change
    #[serde(default)]
    pub new_value: Option<String>,
}

/// Append-only activity entry on an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    /// Journal id
    pub id: u64,

    /// Author of the entry
    #[serde(default)]
    pub user: Option<NamedRef>,

    /// Note text, empty for pure field-change entries
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,

    /// Creation timestamp
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,

    /// Field changes recorded by this entry
    #[serde(default)]
    pub details: Vec<JournalDetail>,
}

impl Journal {
    /// Whether this journal carries note text.
    #[must_use]
    pub fn has_note(&self) -> bool {
        !self.notes.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A Redmine issue as returned by the detail endpoint.
///
/// Fields the engine does not interpret (tracker, priority, relations, children,
/// attachments, custom fields, ...) are kept verbatim in `extra` so the
/// presentation layer still sees the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue id
    pub id: IssueId,

    /// Issue title
    #[serde(default)]
    pub subject: String,

    /// Current workflow status
    pub status: NamedRef,

    /// Current assignee, absent when unassigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<NamedRef>,

    /// Issue description
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,

    /// Activity entries, oldest first
    #[serde(default)]
    pub journals: Vec<Journal>,

    /// Number of journals with non-empty note text
    #[serde(rename = "numNotes", default)]
    pub num_notes: usize,

    /// Remaining payload fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Issue {
    /// Recompute `num_notes` from the journal list.
    pub fn derive_num_notes(&mut self) {
        self.num_notes = self.journals.iter().filter(|j| j.has_note()).count();
    }

    /// Look up a top-level attribute by its Redmine field name.
    ///
    /// Typed fields are re-serialized so callers can compare any attribute
    /// uniformly against a requested JSON value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::from(self.id.get())),
            "subject" => Some(Value::from(self.subject.clone())),
            "description" => Some(Value::from(self.description.clone())),
            "status" => serde_json::to_value(&self.status).ok(),
            "assigned_to" => self
                .assigned_to
                .as_ref()
                .and_then(|a| serde_json::to_value(a).ok()),
            _ => self.extra.get(name).cloned(),
        }
    }
}

/// Workflow status known to the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Status id
    pub id: u64,

    /// Display name
    pub name: String,

    /// Whether issues in this status count as closed
    #[serde(default)]
    pub is_closed: bool,
}

/// User as stored in the reference data (`{id, name}` display projection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub id: u64,

    /// `"<firstname> <lastname>"`
    pub name: String,
}

/// User as returned by `GET /users.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User id
    pub id: u64,

    /// Login name
    #[serde(default)]
    pub login: String,

    /// First name
    #[serde(default)]
    pub firstname: String,

    /// Last name
    #[serde(default)]
    pub lastname: String,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            name: format!("{} {}", record.firstname, record.lastname),
        }
    }
}

/// Tracker reference lists used to render editable dropdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// All issue statuses
    pub statuses: Vec<Status>,

    /// All users
    pub users: Vec<User>,
}

/// Matches found for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Total matches reported by the tracker (may exceed `issue_ids.len()`)
    pub total_count: u64,

    /// Matched issue ids, at most [`SEARCH_RESULT_LIMIT`]
    pub issue_ids: Vec<IssueId>,

    /// Summary tags for the presentation layer
    pub summary: Vec<String>,
}

impl SearchMatch {
    /// Build a match from the tracker's count and ids, enforcing the result limit.
    #[must_use]
    pub fn new(total_count: u64, mut issue_ids: Vec<IssueId>) -> Self {
        issue_ids.truncate(SEARCH_RESULT_LIMIT);
        Self {
            total_count,
            issue_ids,
            summary: vec![format!("# Issues: {total_count}")],
        }
    }
}

/// Search outcome for one entity; `data` is `None` when nothing matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    /// The searched entity
    pub entity: Entity,

    /// Matches, or `None` for zero hits
    pub data: Option<SearchMatch>,
}

/// Enriched issues for one lookup, optionally annotated with reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetails {
    /// Fully fetched issues
    pub issues: Vec<Issue>,

    /// Snapshot of the statuses, when admin credentials are configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<Status>>,

    /// Snapshot of the users, when admin credentials are configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<User>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::ipv4("8.8.8.8", Some(EntityType::Ipv4))]
    #[case::md5("d41d8cd98f00b204e9800998ecf8427e", Some(EntityType::Md5))]
    #[case::sha1("da39a3ee5e6b4b0d3255bfef95601890afd80709", Some(EntityType::Sha1))]
    #[case::sha256(
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        Some(EntityType::Sha256)
    )]
    #[case::domain("evil.example.com", Some(EntityType::Domain))]
    #[case::email("alice@example.com", Some(EntityType::Email))]
    #[case::bad_octet("300.1.1.1", None)]
    #[case::odd_hex("abcdef", None)]
    #[case::bare_word("localhost", None)]
    #[case::empty("", None)]
    fn test_detect_entity_type(#[case] input: &str, #[case] expected: Option<EntityType>) {
        assert_eq!(EntityType::detect(input), expected);
    }

    #[test]
    fn test_entity_type_serializes_like_integration_names() {
        let entity = Entity::new("8.8.8.8", EntityType::Ipv4);
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value, json!({"value": "8.8.8.8", "type": "IPv4"}));
    }

    #[test]
    fn test_issue_deserializes_redmine_payload() {
        let mut issue: Issue = serde_json::from_value(json!({
            "id": 101,
            "subject": "Beacon to 8.8.8.8",
            "tracker": {"id": 1, "name": "Bug"},
            "status": {"id": 1, "name": "New"},
            "assigned_to": {"id": 5, "name": "Ada Lovelace"},
            "description": null,
            "journals": [
                {"id": 1, "user": {"id": 5, "name": "Ada Lovelace"}, "notes": "seen again",
                 "created_on": "2024-03-01T10:00:00Z", "details": []},
                {"id": 2, "notes": "", "details": [
                    {"property": "attr", "name": "status_id", "old_value": "1", "new_value": "2"}
                ]},
                {"id": 3, "notes": null}
            ]
        }))
        .unwrap();

        issue.derive_num_notes();
        assert_eq!(issue.num_notes, 1);
        assert_eq!(issue.description, "");
        assert_eq!(issue.extra.get("tracker"), Some(&json!({"id": 1, "name": "Bug"})));
        assert_eq!(issue.attribute("subject"), Some(json!("Beacon to 8.8.8.8")));
        assert_eq!(issue.attribute("assigned_to"), Some(json!({"id": 5, "name": "Ada Lovelace"})));
        assert_eq!(issue.attribute("notes"), None);
    }

    #[test]
    fn test_search_match_enforces_limit() {
        let ids = (1..=25).map(IssueId::new).collect();
        let matched = SearchMatch::new(25, ids);
        assert_eq!(matched.issue_ids.len(), SEARCH_RESULT_LIMIT);
        assert_eq!(matched.summary, vec!["# Issues: 25".to_string()]);
    }

    #[test]
    fn test_user_projection_joins_names() {
        let record = UserRecord {
            id: 7,
            login: "glinda".into(),
            firstname: "Glinda".into(),
            lastname: "Upland".into(),
        };
        assert_eq!(User::from(record), User { id: 7, name: "Glinda Upland".into() });
    }
}
