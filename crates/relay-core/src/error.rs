use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error kinds the proxy surfaces to clients, per the §7 error-handling
/// design: each middleware/handler boundary that fails maps its error
/// through here so the JSON envelope, status code, and `Retry-After` logic
/// live in exactly one place.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RelayError {
    #[error("authentication failed")]
    AuthenticationError,

    #[error("request body too large")]
    RequestTooLarge,

    #[error("rate limited")]
    RateLimit { retry_after: Duration },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("no providers available")]
    NoProviders,

    #[error("upstream timeout")]
    Timeout,

    #[error("internal error: {0}")]
    InternalError(String),

    /// Never constructed on a path that reaches the error writer; JSON
    /// rewrite helpers degrade gracefully (forward the original body)
    /// instead of surfacing this. Kept so internal helpers have a typed
    /// way to signal "couldn't parse", distinct from a genuine failure.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationError => StatusCode::UNAUTHORIZED,
            Self::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::NoProviders => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "authentication_error",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimit { .. } => "rate_limit",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::NoProviders => "no_providers",
            Self::Timeout => "timeout",
            Self::InternalError(_) => "internal_error",
            Self::MalformedRequest(_) => "malformed_request",
        }
    }

    /// The `type` field of the Anthropic-shaped error envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "authentication_error",
            Self::RequestTooLarge => "invalid_request_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::UpstreamUnavailable(_) | Self::Timeout | Self::NoProviders => "api_error",
            Self::InternalError(_) => "internal_error",
            Self::MalformedRequest(_) => "invalid_request_error",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Error writer (§2 "Error writer", §6 "Error envelope"): every error path
/// through a middleware or the handler converts through here so the JSON
/// shape, status code, and `Retry-After` logic live in one place.
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = json!({
            "type": "error",
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        });
        let mut response = (self.status_code(), axum::Json(body)).into_response();
        if let Some(retry_after) = self.retry_after() {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(RelayError::AuthenticationError.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(RelayError::RequestTooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            RelayError::RateLimit { retry_after: Duration::from_secs(1) }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            RelayError::UpstreamUnavailable("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(RelayError::NoProviders.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(RelayError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            RelayError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let rl = RelayError::RateLimit { retry_after: Duration::from_secs(30) };
        assert_eq!(rl.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(RelayError::NoProviders.retry_after(), None);
    }

    #[test]
    fn malformed_request_never_maps_to_a_rewrite_path_status() {
        // Still has a status for completeness of the writer, but callers
        // must never construct it from a JSON-rewrite helper.
        assert_eq!(
            RelayError::MalformedRequest("bad json".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn into_response_sets_retry_after_on_rate_limit() {
        let response = RelayError::RateLimit { retry_after: Duration::from_secs(30) }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(axum::http::header::RETRY_AFTER).unwrap(), "30");
    }

    #[test]
    fn into_response_omits_retry_after_otherwise() {
        let response = RelayError::NoProviders.into_response();
        assert!(response.headers().get(axum::http::header::RETRY_AFTER).is_none());
    }
}
