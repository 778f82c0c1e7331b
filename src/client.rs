//! Client for buffered and streaming response exchanges
//!
//! [`Responder`] is the entry point. It owns one pooled HTTP client and the
//! [`ResponderOptions`] it was built with, and offers two modes:
//!
//! - **Buffered**: [`respond`](Responder::respond) sends one logical request and
//!   returns the decoded [`Response`]. Failed attempts are classified and
//!   retried under the configured [`RetryPolicy`](crate::RetryPolicy); only the
//!   final failure is returned.
//! - **Streaming**: [`stream`](Responder::stream) returns a
//!   [`ResponseStream`] that is not yet running. Register callbacks, then
//!   `start()` it or await one of its result methods.
//!
//! ## Request flow
//!
//! ```text
//! Request::builder() ... build()
//!     │
//!     ├─> response_started telemetry
//!     │
//!     ├─> POST {base_url}/responses            ◄──┐
//!     │       │                                   │ retryable failure,
//!     │       ├─> 2xx: decode body / open stream  │ attempts left:
//!     │       └─> error: classify                 │ sleep backoff
//!     │               └───────────────────────────┘
//!     │
//!     └─> response_completed / response_failed telemetry (once)
//! ```
//!
//! Every attempt carries the [`RequestContext`] correlation headers, so retries
//! of one logical request share a trace id.
//!
//! # Examples
//!
//! ```rust,no_run
//! use open_responder::{Request, Responder, ResponderOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let responder = Responder::new(
//!         ResponderOptions::builder()
//!             .base_url("http://localhost:1234/v1")
//!             .max_retries(2)
//!             .build()?,
//!     )?;
//!
//!     let request = Request::builder()
//!         .model("qwen2.5-32b-instruct")
//!         .instructions("Answer in one sentence.")
//!         .user("What is Rust?")
//!         .build()?;
//!
//!     let response = responder.respond(&request).await?;
//!     println!("{}", response.output_text());
//!     Ok(())
//! }
//! ```

use crate::classify::{
    classify_status, classify_transport, extract_error_message, extract_request_id,
    parse_retry_after,
};
use crate::config::ResponderOptions;
use crate::context::RequestContext;
use crate::hooks::{ResponseCompletedEvent, ResponseFailedEvent, ResponseStartedEvent};
use crate::retry::retry_with_policy;
use crate::stream::ResponseStream;
use crate::structured::parse_strict;
use crate::types::{ParsedResponse, Request, Response};
use crate::{Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};

const USER_AGENT: &str = concat!("open-responder-sdk/", env!("CARGO_PKG_VERSION"));

/// One physical HTTP exchange with the responses endpoint
#[derive(Debug)]
pub(crate) struct HttpExchange {
    http: reqwest::Client,
    options: ResponderOptions,
}

impl HttpExchange {
    fn new(options: ResponderOptions) -> Result<Self> {
        // No whole-request timeout on the client: it would also bound stream
        // bodies. Buffered calls set it per request.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(options.connect_timeout))
            .default_headers(options.default_headers.clone())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                Error::config(format!("Failed to build HTTP client: {}", e)).with_source(e)
            })?;

        Ok(Self { http, options })
    }

    pub(crate) fn options(&self) -> &ResponderOptions {
        &self.options
    }

    /// Send one attempt. Non-2xx statuses come back as classified errors.
    pub(crate) async fn send(
        &self,
        body: Vec<u8>,
        context: &RequestContext,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .post(self.options.responses_url())
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if stream {
            request = request.header(ACCEPT, "text/event-stream");
        } else {
            request = request
                .header(ACCEPT, "application/json")
                .timeout(Duration::from_secs(self.options.timeout));
        }

        if let Some(api_key) = &self.options.api_key {
            request = request.bearer_auth(api_key);
        }

        for (name, value) in context.headers() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let request_id = extract_request_id(response.headers());
        let retry_after = parse_retry_after(response.headers());
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Failed to read error response body: {}", e);
                String::new()
            }
        };

        let message = extract_error_message(&body);
        let body = (!body.is_empty()).then_some(body);
        Err(classify_status(status.as_u16(), message, request_id, body).with_retry_after(retry_after))
    }
}

async fn decode_response(response: reqwest::Response) -> Result<Response> {
    let request_id = extract_request_id(response.headers());
    let bytes = response.bytes().await.map_err(classify_transport)?;

    serde_json::from_slice::<Response>(&bytes).map_err(|e| {
        Error::parsing(format!("Response body could not be parsed: {}", e))
            .with_request_id(request_id)
            .with_response_body(Some(String::from_utf8_lossy(&bytes).into_owned()))
            .with_source(e)
    })
}

/// Client for a Responses-compatible endpoint
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct Responder {
    exchange: Arc<HttpExchange>,
}

impl Responder {
    /// Build a responder. Fails with a configuration error if the HTTP client
    /// cannot be constructed.
    pub fn new(options: ResponderOptions) -> Result<Self> {
        Ok(Self {
            exchange: Arc::new(HttpExchange::new(options)?),
        })
    }

    pub fn options(&self) -> &ResponderOptions {
        self.exchange.options()
    }

    /// Send `request` and wait for the whole response.
    pub async fn respond(&self, request: &Request) -> Result<Response> {
        self.respond_with_context(request, &RequestContext::new())
            .await
    }

    /// Like [`respond`](Self::respond), correlated with `context`.
    pub async fn respond_with_context(
        &self,
        request: &Request,
        context: &RequestContext,
    ) -> Result<Response> {
        let hooks = &self.options().hooks;
        let started = Instant::now();

        hooks
            .emit_response_started(ResponseStartedEvent {
                context: context.clone(),
                model: request.model().to_string(),
                streaming: false,
            })
            .await;

        let (result, attempts) = match request.to_body(false) {
            Ok(body) => {
                let exchange = self.exchange.as_ref();
                let outcome = retry_with_policy(&self.options().retry_policy, |attempt| {
                    let body = body.clone();
                    async move {
                        log::debug!(
                            "Sending request for model {} (attempt {}, trace {})",
                            request.model(),
                            attempt,
                            context.trace_id()
                        );
                        let response = exchange.send(body, context, false).await?;
                        decode_response(response).await
                    }
                })
                .await;
                (outcome.result, outcome.attempts)
            }
            Err(e) => (Err(e), 0),
        };

        let latency = started.elapsed();
        match &result {
            Ok(response) => {
                log::debug!(
                    "Response {} {:?} after {} attempt(s) in {:?}",
                    response.id,
                    response.status,
                    attempts,
                    latency
                );
                hooks
                    .emit_response_completed(ResponseCompletedEvent {
                        context: context.clone(),
                        model: request.model().to_string(),
                        streaming: false,
                        response_id: response.id.clone(),
                        status: response.status,
                        usage: response.usage,
                        latency,
                        attempts,
                    })
                    .await;
            }
            Err(err) => {
                hooks
                    .emit_response_failed(ResponseFailedEvent {
                        context: context.clone(),
                        model: request.model().to_string(),
                        streaming: false,
                        kind: err.kind(),
                        status: err.status(),
                        message: err.message().to_string(),
                        latency,
                        attempts,
                    })
                    .await;
            }
        }

        result
    }

    /// Send a request with a structured output shape and strictly parse the result.
    ///
    /// Fails before sending anything when the request declares no output shape.
    pub async fn respond_parsed<T: DeserializeOwned>(
        &self,
        request: &Request,
    ) -> Result<ParsedResponse<T>> {
        if !request.has_output_shape() {
            return Err(Error::illegal_state(
                "parsed output requires a request with a structured output format",
            ));
        }
        let response = self.respond(request).await?;
        let parsed = parse_strict::<T>(&response)?;
        Ok(ParsedResponse::new(response, parsed))
    }

    /// One-shot convenience: send `input` as a user message and return the text.
    pub async fn respond_text(&self, model: &str, input: &str) -> Result<String> {
        let request = Request::builder().model(model).user(input).build()?;
        Ok(self.respond(&request).await?.output_text())
    }

    /// Prepare a stream for `request`. Nothing is sent until it is started.
    pub fn stream(&self, request: Request) -> ResponseStream {
        self.stream_with_context(request, RequestContext::new())
    }

    pub fn stream_with_context(&self, request: Request, context: RequestContext) -> ResponseStream {
        ResponseStream::http(Arc::clone(&self.exchange), request, context)
    }

    /// Prepare a stream whose final text is strictly parsed into `T`.
    pub fn stream_parsed<T>(&self, request: Request) -> Result<ResponseStream<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.stream_parsed_with_context(request, RequestContext::new())
    }

    pub fn stream_parsed_with_context<T>(
        &self,
        request: Request,
        context: RequestContext,
    ) -> Result<ResponseStream<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        ResponseStream::http_parsed(Arc::clone(&self.exchange), request, context)
    }
}
