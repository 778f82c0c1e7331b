//! Error types for the Open Responder SDK
//!
//! Every failure surfaced by this crate is an [`Error`]: one struct carrying a
//! machine-checkable [`ErrorKind`], a human message, an optional suggestion meant
//! for direct display, and a flag telling the caller whether retrying the whole
//! operation could help. HTTP failures additionally carry the status code, request
//! id and raw body; streaming failures carry whatever output arrived before the
//! stream broke.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid policy, options or request construction. Never sent.
    Configuration,
    /// HTTP 429.
    RateLimited,
    /// HTTP 401.
    AuthenticationFailed,
    /// HTTP 403.
    AuthorizationFailed,
    /// Any other 4xx, or a local pre-send validation failure.
    InvalidRequest,
    /// HTTP 500, 502, 504.
    ServerError,
    /// HTTP 503.
    ServiceUnavailable,
    /// Network failure before any HTTP status was received.
    Transport,
    /// The connection broke while a stream was in flight.
    ConnectionDropped,
    /// The stream stalled longer than the configured idle timeout.
    StreamTimeout,
    /// Malformed wire payload or structured output that could not be parsed.
    Parsing,
    /// Structured output was requested but the provider returned no output text.
    MissingOutput,
    /// The provider reported `failed`, `incomplete` or a top-level `error` event.
    ResponseFailed,
    /// A registered tool could not be found or raised while running.
    ToolExecutionFailed,
    /// An operation was invoked in a state that does not allow it.
    IllegalState,
    /// The stream was cancelled by the caller.
    Cancelled,
    /// Anything that fits no other category.
    Unknown,
}

impl ErrorKind {
    /// Stable snake_case name for logs and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::AuthorizationFailed => "authorization_failed",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ServerError => "server_error",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Transport => "transport",
            ErrorKind::ConnectionDropped => "connection_dropped",
            ErrorKind::StreamTimeout => "stream_timeout",
            ErrorKind::Parsing => "parsing",
            ErrorKind::MissingOutput => "missing_output",
            ErrorKind::ResponseFailed => "response_failed",
            ErrorKind::ToolExecutionFailed => "tool_execution_failed",
            ErrorKind::IllegalState => "illegal_state",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether failures of this kind are transient unless stated otherwise.
    pub fn is_retryable_by_default(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::ServerError
                | ErrorKind::ServiceUnavailable
                | ErrorKind::Transport
                | ErrorKind::ConnectionDropped
                | ErrorKind::StreamTimeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the SDK
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    retryable: bool,
    suggestion: Option<String>,
    request_id: Option<String>,
    response_body: Option<String>,
    retry_after: Option<Duration>,
    partial_output: Option<String>,
    bytes_received: Option<u64>,
    tool_name: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Create an error of the given kind. Retryability follows the kind's default.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retryable: kind.is_retryable_by_default(),
            suggestion: None,
            request_id: None,
            response_body: None,
            retry_after: None,
            partial_output: None,
            bytes_received: None,
            tool_name: None,
            source: None,
        }
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }

    /// Create a local pre-send validation error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, msg)
            .with_suggestion("Check the request payload before sending it again")
    }

    /// Create a parsing error
    pub fn parsing(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parsing, msg)
    }

    /// Create the error reported when structured output has no text to parse
    pub fn missing_output(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingOutput, msg)
    }

    /// Create a provider-reported failure
    pub fn response_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResponseFailed, msg)
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolExecutionFailed, msg)
    }

    /// Create an illegal state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalState, msg)
    }

    /// Create a cancellation error
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "stream was cancelled")
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, msg)
    }

    /// Create a connection-dropped error
    pub fn connection_dropped(msg: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ConnectionDropped,
            format!("Connection dropped during streaming: {}", msg.into()),
        )
    }

    /// Create a stream timeout error
    pub fn stream_timeout() -> Self {
        Self::new(ErrorKind::StreamTimeout, "Stream timed out waiting for data")
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, msg)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_response_body(mut self, body: Option<String>) -> Self {
        self.response_body = body;
        self
    }

    /// Attach a server-provided retry hint. Rate-limit suggestions pick up the delay.
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        if let (Some(delay), ErrorKind::RateLimited) = (retry_after, self.kind) {
            self.suggestion = Some(format!(
                "Rate limit exceeded. Wait {} seconds before retrying",
                delay.as_secs().max(1)
            ));
        }
        self.retry_after = retry_after;
        self
    }

    /// Attach the text received before a stream failed. Empty text is dropped.
    pub fn with_partial_output(mut self, partial: impl Into<String>) -> Self {
        let partial = partial.into();
        if !partial.is_empty() {
            self.partial_output = Some(partial);
        }
        self
    }

    pub fn with_bytes_received(mut self, bytes: u64) -> Self {
        self.bytes_received = Some(bytes);
        self
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status code, when the failure came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the caller could usefully retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// A hint intended for direct display to a user.
    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn response_body(&self) -> Option<&str> {
        self.response_body.as_deref()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Output text received before a streaming failure.
    pub fn partial_output(&self) -> Option<&str> {
        self.partial_output.as_deref()
    }

    /// Bytes received before a streaming failure.
    pub fn bytes_received(&self) -> Option<u64> {
        self.bytes_received
    }

    /// Name of the tool whose execution failed.
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::parsing(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        crate::classify::classify_transport(err)
    }
}
