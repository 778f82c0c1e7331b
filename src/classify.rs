//! Failure classification
//!
//! Maps HTTP status codes and transport failures onto [`ErrorKind`]s with a
//! retryability flag and a display-ready suggestion.

use crate::{Error, ErrorKind};
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Longest slice of a raw error body kept in an error message
const MAX_BODY_IN_MESSAGE: usize = 500;

/// Classify a non-success HTTP status.
///
/// | status | kind | retryable |
/// |---|---|---|
/// | 429 | `RateLimited` | yes |
/// | 401 | `AuthenticationFailed` | no |
/// | 403 | `AuthorizationFailed` | no |
/// | 400, 404, 422, other 4xx | `InvalidRequest` | no |
/// | 500, 502, 504 | `ServerError` | yes |
/// | 503 | `ServiceUnavailable` | yes |
/// | anything else | `Unknown` | no |
pub fn classify_status(
    status: u16,
    message: impl Into<String>,
    request_id: Option<String>,
    response_body: Option<String>,
) -> Error {
    let message = message.into();

    let (kind, retryable, suggestion) = match status {
        429 => (
            ErrorKind::RateLimited,
            true,
            "Rate limit exceeded. Wait before retrying or reduce request frequency",
        ),
        401 => (
            ErrorKind::AuthenticationFailed,
            false,
            "Check that your API key is valid and has not expired",
        ),
        403 => (
            ErrorKind::AuthorizationFailed,
            false,
            "Check that your API key has permission to use this model or endpoint",
        ),
        400..=499 => (
            ErrorKind::InvalidRequest,
            false,
            "Check the request parameters and payload",
        ),
        500 | 502 | 504 => (
            ErrorKind::ServerError,
            true,
            "The server encountered an error. Try again shortly",
        ),
        503 => (
            ErrorKind::ServiceUnavailable,
            true,
            "The service is temporarily unavailable. Try again later",
        ),
        _ => (
            ErrorKind::Unknown,
            false,
            "Unexpected response status from the API",
        ),
    };

    Error::new(kind, format!("HTTP {}: {}", status, message))
        .with_status(status)
        .with_retryable(retryable)
        .with_suggestion(suggestion)
        .with_request_id(request_id)
        .with_response_body(response_body)
}

/// Classify a failure raised by the HTTP client itself.
///
/// Failures that carry a status are routed through [`classify_status`]. Everything
/// else happened before a status arrived and is treated as a retryable transport
/// failure.
pub fn classify_transport(err: reqwest::Error) -> Error {
    if let Some(status) = err.status() {
        return classify_status(status.as_u16(), err.to_string(), None, None).with_source(err);
    }

    let (message, suggestion) = if err.is_timeout() {
        (
            format!("Request timed out: {}", err),
            "The request timed out. Check your network or raise the timeout",
        )
    } else if err.is_connect() {
        (
            format!("Failed to connect: {}", err),
            "Check that the base URL is reachable",
        )
    } else if err.is_builder() {
        return Error::config(format!("Invalid request: {}", err)).with_source(err);
    } else {
        (
            format!("HTTP transport error: {}", err),
            "A network error occurred. Try again",
        )
    };

    Error::transport(message)
        .with_suggestion(suggestion)
        .with_source(err)
}

/// Parse a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Extract the provider's request id from response headers.
pub fn extract_request_id(headers: &HeaderMap) -> Option<String> {
    ["x-request-id", "request-id", "openai-request-id"]
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Pull a readable message out of an error body.
///
/// Understands `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": ...}`. Falls back to the (truncated) raw body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|e| e.is_string()))
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    match trimmed.char_indices().nth(MAX_BODY_IN_MESSAGE) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_classify_rate_limit() {
        let err = classify_status(429, "slow down", Some("req_1".into()), None);
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.request_id(), Some("req_1"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_classify_auth_failures() {
        let unauthenticated = classify_status(401, "bad key", None, None);
        assert_eq!(unauthenticated.kind(), ErrorKind::AuthenticationFailed);
        assert!(!unauthenticated.is_retryable());

        let forbidden = classify_status(403, "no access", None, None);
        assert_eq!(forbidden.kind(), ErrorKind::AuthorizationFailed);
        assert!(!forbidden.is_retryable());
    }

    #[test]
    fn test_classify_invalid_request() {
        for status in [400, 404, 409, 422] {
            let err = classify_status(status, "nope", None, Some("{}".into()));
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "status {}", status);
            assert!(!err.is_retryable());
            assert_eq!(err.response_body(), Some("{}"));
        }
    }

    #[test]
    fn test_classify_server_errors() {
        for status in [500, 502, 504] {
            let err = classify_status(status, "oops", None, None);
            assert_eq!(err.kind(), ErrorKind::ServerError);
            assert!(err.is_retryable());
        }

        let unavailable = classify_status(503, "maintenance", None, None);
        assert_eq!(unavailable.kind(), ErrorKind::ServiceUnavailable);
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_classify_other_statuses_are_unknown() {
        for status in [501, 529, 302] {
            let err = classify_status(status, "odd", None, None);
            assert_eq!(err.kind(), ErrorKind::Unknown);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_message_includes_status() {
        let err = classify_status(500, "Internal Server Error", None, None);
        assert_eq!(err.message(), "HTTP 500: Internal Server Error");
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_extract_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req_abc"));
        assert_eq!(extract_request_id(&headers), Some("req_abc".to_string()));
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"Invalid model","type":"invalid_request_error"}}"#),
            "Invalid model"
        );
        assert_eq!(extract_error_message(r#"{"error":"plain"}"#), "plain");
        assert_eq!(extract_error_message(r#"{"message":"top"}"#), "top");
        assert_eq!(extract_error_message("gateway down"), "gateway down");
        assert_eq!(extract_error_message("   "), "empty response body");
    }

    #[test]
    fn test_extract_error_message_truncates_long_bodies() {
        let body = "x".repeat(2_000);
        let message = extract_error_message(&body);
        assert!(message.ends_with("..."));
        assert_eq!(message.len(), MAX_BODY_IN_MESSAGE + 3);
    }
}
