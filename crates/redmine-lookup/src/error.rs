//! Error types for Redmine lookups.
//!
//! Every runtime operation reports a [`ClassifiedError`]: a kind from a small
//! taxonomy, a human-readable detail line, a severity hint for the
//! presentation layer and whatever request context was available when the
//! failure happened.

use crate::model::IssueId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request never reached the server, or no response arrived.
    TransportFailure,

    /// HTTP 401: insufficient permission or invalid credentials.
    Unauthorized,

    /// HTTP 404: the referenced project or resource is absent.
    NotFound,

    /// Any other status that differs from the expected one.
    UnexpectedStatus(u16),

    /// The write was acknowledged but the remote state did not change.
    SemanticMismatch,

    /// A 2xx response whose body did not have the expected shape.
    UnexpectedPayload,

    /// Configuration failed validation.
    ValidationError,

    /// Unknown or malformed dispatch action.
    InvalidAction,
}

impl ErrorKind {
    /// Severity used when none is set explicitly.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::Unauthorized | Self::NotFound | Self::SemanticMismatch | Self::ValidationError => {
                Severity::Warning
            }
            Self::UnexpectedStatus(_)
            | Self::TransportFailure
            | Self::UnexpectedPayload
            | Self::InvalidAction => Severity::Danger,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportFailure => f.write_str("transport failure"),
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::NotFound => f.write_str("not found"),
            Self::UnexpectedStatus(code) => write!(f, "unexpected status {code}"),
            Self::SemanticMismatch => f.write_str("semantic mismatch"),
            Self::UnexpectedPayload => f.write_str("unexpected payload"),
            Self::ValidationError => f.write_str("validation error"),
            Self::InvalidAction => f.write_str("invalid action"),
        }
    }
}

/// UI severity hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected or permission-related; render as a warning.
    Warning,

    /// Unexpected failure; render as an error.
    Danger,
}

impl Severity {
    /// Bootstrap-style alert class for this severity.
    #[must_use]
    pub const fn alert_class(self) -> &'static str {
        match self {
            Self::Warning => "alert-warning",
            Self::Danger => "alert-danger",
        }
    }
}

/// Request and operation context attached to an error.
///
/// API keys are never recorded here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Logical operation (`search`, `issue_detail`, `update_status`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Entity value being searched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    /// Issue being read or written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<IssueId>,

    /// Attribute being written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// HTTP method of the failed request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Path of the failed request, relative to the base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Status code actually received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Status codes that would have counted as success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_status: Vec<u16>,

    /// Response body or other raw diagnostic payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// A failure classified for callers and the presentation layer.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{detail}")]
pub struct ClassifiedError {
    /// Failure classification
    pub kind: ErrorKind,

    /// Human-readable description
    pub detail: String,

    /// UI severity hint
    pub severity: Severity,

    /// Suggested fix, when one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,

    /// Raw context
    #[serde(default)]
    pub context: ErrorContext,
}

impl ClassifiedError {
    /// Create an error with the kind's default severity and empty context.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            severity: kind.default_severity(),
            remediation: None,
            context: ErrorContext::default(),
        }
    }

    /// Create a [`ErrorKind::SemanticMismatch`] error.
    pub fn semantic_mismatch(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SemanticMismatch, detail)
    }

    /// Create a [`ErrorKind::UnexpectedPayload`] error carrying the offending body.
    pub fn unexpected_payload(detail: impl Into<String>, body: Value) -> Self {
        let mut error = Self::new(ErrorKind::UnexpectedPayload, detail);
        error.context.body = Some(body);
        error
    }

    /// Create a [`ErrorKind::InvalidAction`] error.
    pub fn invalid_action(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAction, detail)
    }

    /// Set the remediation hint.
    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    /// Annotate with the logical operation.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Annotate with the entity being searched.
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.context.entity = Some(entity.into());
        self
    }

    /// Annotate with the issue being read or written.
    #[must_use]
    pub fn with_issue(mut self, issue_id: IssueId) -> Self {
        self.context.issue_id = Some(issue_id);
        self
    }

    /// Annotate with the attribute being written.
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.context.attribute = Some(attribute.into());
        self
    }

    /// Whether the caller may continue with reduced functionality.
    #[must_use]
    pub const fn is_advisory(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

/// Result type for Redmine lookup operations.
pub type Result<T> = std::result::Result<T, ClassifiedError>;

/// A single configuration problem, keyed by the option it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Option key (`url`, `apiKey`, ...)
    pub key: String,

    /// What is wrong with it
    pub message: String,
}

impl ValidationIssue {
    /// Create a new validation issue.
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Errors that can occur while loading configuration or building a transport.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred reading a config, certificate or key file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// File that could not be read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for [`crate::config::LookupOptions`].
    #[error("Configuration error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The options failed validation.
    #[error("Invalid options: {}", format_issues(.0))]
    Invalid(Vec<ValidationIssue>),

    /// TLS or proxy settings were rejected by the HTTP client.
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ConfigError> for ClassifiedError {
    fn from(error: ConfigError) -> Self {
        let mut classified = Self::new(ErrorKind::ValidationError, error.to_string());
        if let ConfigError::Invalid(issues) = &error {
            classified.context.body = serde_json::to_value(issues).ok();
        }
        classified
    }
}
