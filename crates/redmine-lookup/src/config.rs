//! Integration options.
//!
//! Options are read from a kebab-case YAML file and may be overridden from
//! the command line. Empty strings mean "not set" for every optional value.
//!
//! ```yaml
//! url: https://redmine.example.com
//! api-key: 0123abcd
//! admin-api-key: ""
//! project: incident-response
//! request:
//!   ca: /etc/ssl/redmine-ca.pem
//!   timeout-secs: 30
//! ```

use crate::error::{ClassifiedError, ConfigError, ValidationIssue};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Default socket timeout for tracker requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Options for one Redmine instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LookupOptions {
    /// Base URL including scheme and port, without a trailing `/`
    pub url: String,

    /// User REST API key for searches, detail reads and updates
    pub api_key: String,

    /// Administrator REST API key, used only to fetch statuses and users
    pub admin_api_key: String,

    /// Single project identifier to search; empty searches every project
    pub project: String,

    /// Also include `changesets` when fetching issue detail
    pub include_changesets: bool,

    /// Transport settings
    pub request: RequestOptions,
}

/// TLS, proxy and timeout settings for the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RequestOptions {
    /// Client certificate file (PEM, or PKCS#12 when `key` is empty and `passphrase` is set)
    pub cert: String,

    /// Client private key file (PEM)
    pub key: String,

    /// Passphrase for a PKCS#12 client identity
    pub passphrase: String,

    /// Extra certificate authority file (PEM)
    pub ca: String,

    /// HTTP proxy URL; basic auth may be embedded in the URL
    pub proxy: String,

    /// Set to `false` to accept invalid server certificates
    pub reject_unauthorized: Option<bool>,

    /// Socket timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cert: String::new(),
            key: String::new(),
            passphrase: String::new(),
            ca: String::new(),
            proxy: String::new(),
            reject_unauthorized: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl LookupOptions {
    /// Options for `url` with every other value unset.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the user API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// Set the administrator API key.
    #[must_use]
    pub fn with_admin_api_key(mut self, key: impl Into<String>) -> Self {
        self.admin_api_key = key.into();
        self
    }

    /// Restrict searches to one project.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Whether reference-data features (editable status/assignee) are available.
    #[must_use]
    pub fn has_admin_credentials(&self) -> bool {
        !self.admin_api_key.is_empty()
    }

    /// Load options from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Yaml` if it is not valid YAML.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Validate the options, folding every problem into one error.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` listing each issue found by [`validate_options`].
    pub fn validate(&self) -> Result<(), ClassifiedError> {
        let issues = validate_options(self);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues).into())
        }
    }
}

/// Check the options, returning every problem found.
#[must_use]
pub fn validate_options(options: &LookupOptions) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let url = options.url.trim();

    if url.is_empty() {
        issues.push(ValidationIssue::new(
            "url",
            "You must provide your Redmine Server URL",
        ));
        return issues;
    }

    if url.ends_with('/') {
        issues.push(ValidationIssue::new(
            "url",
            "The Redmine Server URL cannot end with a trailing `/`",
        ));
    }

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        issues.push(ValidationIssue::new(
            "url",
            "The Redmine Server URL must include the schema (i.e., https://)",
        ));
    }

    if options.request.timeout_secs == 0 {
        issues.push(ValidationIssue::new(
            "request.timeout-secs",
            "The request timeout must be at least one second",
        ));
    }

    issues
}
