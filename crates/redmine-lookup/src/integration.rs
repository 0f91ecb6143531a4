//! The integration façade.
//!
//! [`Integration`] owns the client and the reference cache and exposes the
//! operations the host calls: lookup, detail enrichment and dispatch.

use crate::client::TrackerClient;
use crate::config::{LookupOptions, validate_options};
use crate::details;
use crate::dispatch::{Action, DispatchResponse};
use crate::error::{ClassifiedError, ConfigError, ErrorKind, Result, ValidationIssue};
use crate::model::{Entity, IssueDetails, IssueId, LookupResult, ReferenceData};
use crate::reference::ReferenceCache;
use crate::search;
use crate::transport::Transport;
use crate::transport::http::HttpTransport;
use crate::verify;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Entry point for one configured Redmine instance.
#[derive(Debug, Clone)]
pub struct Integration {
    client: TrackerClient,
    reference: Arc<ReferenceCache>,
}

impl Integration {
    /// Validate `options` and connect over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when validation fails, or the transport
    /// setup error.
    pub fn new(options: LookupOptions) -> std::result::Result<Self, ConfigError> {
        let issues = validate_options(&options);
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues));
        }
        let transport = HttpTransport::new(options.url.clone(), &options.request)?;
        info!(url = %options.url, project = %options.project, "Redmine integration started");
        Ok(Self::with_transport(options, Arc::new(transport)))
    }

    /// Use an existing transport without validating `options`.
    #[must_use]
    pub fn with_transport(options: LookupOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            client: TrackerClient::new(transport, Arc::new(options)),
            reference: Arc::new(ReferenceCache::new()),
        }
    }

    /// Share a reference cache with other integrations for the same tracker.
    #[must_use]
    pub fn with_reference_cache(mut self, cache: Arc<ReferenceCache>) -> Self {
        self.reference = cache;
        self
    }

    /// Check a set of options without building anything.
    #[must_use]
    pub fn validate(options: &LookupOptions) -> Vec<ValidationIssue> {
        validate_options(options)
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &TrackerClient {
        &self.client
    }

    /// The reference cache.
    #[must_use]
    pub const fn reference_cache(&self) -> &Arc<ReferenceCache> {
        &self.reference
    }

    /// Search every entity.
    ///
    /// With admin credentials the reference data is warmed concurrently; a
    /// failure there is logged and does not fail the lookup.
    ///
    /// # Errors
    ///
    /// Returns the first classified search failure.
    pub async fn lookup(&self, entities: &[Entity]) -> Result<Vec<LookupResult>> {
        debug!(count = entities.len(), "Looking up entities");
        let (results, _) = tokio::join!(
            search::search_all(&self.client, entities),
            self.reference_data()
        );
        results
    }

    /// Search every entity, reporting each outcome separately.
    pub async fn lookup_each(&self, entities: &[Entity]) -> Vec<Result<LookupResult>> {
        let (results, _) = tokio::join!(
            search::search_each(&self.client, entities),
            self.reference_data()
        );
        results
    }

    /// Fetch the issues, annotated with reference data when available.
    ///
    /// # Errors
    ///
    /// Returns the first classified fetch failure.
    pub async fn details(&self, issue_ids: &[IssueId]) -> Result<IssueDetails> {
        let reference = match self.reference.snapshot() {
            Some(snapshot) => Some(snapshot),
            None => self.reference_data().await,
        };
        details::enrich(&self.client, issue_ids, reference).await
    }

    /// Reference data, or `None` without admin credentials or on failure.
    pub async fn reference_data(&self) -> Option<ReferenceData> {
        if !self.client.options().has_admin_credentials() {
            return None;
        }
        match self.reference.load(&self.client).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(kind = %e.kind, detail = %e.detail, "Reference data unavailable");
                None
            }
        }
    }

    /// Run one presentation-contract action.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the action; it is also logged.
    pub async fn dispatch(&self, action: &Action) -> Result<DispatchResponse> {
        let result = self.run(action).await;
        if let Err(e) = &result {
            error!(kind = %e.kind, detail = %e.detail, "{}", action.failure_summary());
        }
        result
    }

    /// Decode and run a raw JSON message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAction` for an undecodable message, otherwise as
    /// [`Integration::dispatch`].
    pub async fn dispatch_json(&self, payload: Value) -> Result<DispatchResponse> {
        let action = Action::from_payload(payload).inspect_err(|e| {
            error!(detail = %e.detail, "Rejected message");
        })?;
        self.dispatch(&action).await
    }

    async fn run(&self, action: &Action) -> Result<DispatchResponse> {
        if let Some(request) = action.update_request()? {
            let issue = verify::apply(&self.client, &request).await?;
            return Ok(DispatchResponse::Issue(Box::new(issue)));
        }

        match action {
            Action::LoadReferenceData => {
                if !self.client.options().has_admin_credentials() {
                    return Err(ClassifiedError::new(
                        ErrorKind::ValidationError,
                        "An administrator API key is required to load statuses and users",
                    )
                    .with_operation("reference_data"));
                }
                let data = self
                    .reference
                    .load(&self.client)
                    .await
                    .map_err(|e| e.with_operation("reference_data"))?;
                Ok(DispatchResponse::ReferenceData(data))
            }
            _ => {
                let issue_id = action.issue_id().ok_or_else(|| {
                    ClassifiedError::invalid_action("Invalid Action passed to onMessage")
                })?;
                let issue = self
                    .client
                    .get_issue(issue_id)
                    .await
                    .map_err(|e| e.with_operation("refresh_issue").with_issue(issue_id))?;
                Ok(DispatchResponse::Issue(Box::new(issue)))
            }
        }
    }
}
