//! Error classifier.
//!
//! Maps transport outcomes onto [`ErrorKind`]s with detail, remediation and
//! severity text the presentation layer can show as-is.

use crate::error::{ClassifiedError, ErrorContext, ErrorKind};
use crate::transport::{RawResponse, RequestSpec, TransportError};

/// Remediation shown for HTTP 401.
pub const UNAUTHORIZED_REMEDIATION: &str = "Please confirm you have provided a valid API key and that your account has permissions to query Redmine.";

/// Remediation shown for HTTP 404.
pub const NOT_FOUND_REMEDIATION: &str =
    "Please ensure the project set for your Redmine instance is valid.";

/// Remediation shown for any other unexpected status.
pub const UNEXPECTED_STATUS_REMEDIATION: &str = "Please ensure your Redmine instance is accessible.";

/// Map an HTTP status code to its error kind.
#[must_use]
pub const fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 => ErrorKind::Unauthorized,
        404 => ErrorKind::NotFound,
        other => ErrorKind::UnexpectedStatus(other),
    }
}

/// Classify a response whose status was not in `expected`.
#[must_use]
pub fn unexpected_response(
    request: &RequestSpec,
    expected: &[u16],
    response: RawResponse,
) -> ClassifiedError {
    let kind = kind_for_status(response.status);
    let (detail, remediation) = match kind {
        ErrorKind::Unauthorized => (
            "You do not have permission to perform that action".to_string(),
            UNAUTHORIZED_REMEDIATION,
        ),
        ErrorKind::NotFound => (
            "Resource could not be found".to_string(),
            NOT_FOUND_REMEDIATION,
        ),
        _ => (
            format!(
                "Unexpected status code ({}) when attempting HTTP request",
                response.status
            ),
            UNEXPECTED_STATUS_REMEDIATION,
        ),
    };

    let mut error = ClassifiedError::new(kind, detail).with_remediation(remediation);
    error.context = ErrorContext {
        method: Some(request.method.to_string()),
        path: Some(request.path.clone()),
        status_code: Some(response.status),
        expected_status: expected.to_vec(),
        body: (!response.body.is_null()).then_some(response.body),
        ..ErrorContext::default()
    };
    error
}

/// Classify a request that never produced a response.
#[must_use]
pub fn transport_failure(request: &RequestSpec, failure: &TransportError) -> ClassifiedError {
    let mut error = ClassifiedError::new(
        ErrorKind::TransportFailure,
        format!("Error making HTTP request: {failure}"),
    )
    .with_remediation(UNEXPECTED_STATUS_REMEDIATION);
    error.context.method = Some(request.method.to_string());
    error.context.path = Some(request.path.clone());
    error
}
