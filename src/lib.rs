//! # Open Responder SDK
//!
//! A client-side engine for Responses-style generation APIs (OpenAI Responses
//! and compatible servers such as LM Studio, Ollama or OpenRouter).
//!
//! ## Overview
//!
//! The SDK turns one logical request into either a buffered [`Response`] or a
//! live [`ResponseStream`], and takes care of everything in between:
//!
//! - **Retry with classification**: transient failures (429, 5xx, dropped
//!   connections) are retried with exponential backoff; permanent ones fail
//!   immediately with a typed [`ErrorKind`], a suggestion and diagnostics
//! - **Streaming**: Server-Sent Events are decoded into a closed set of
//!   [`StreamingEvent`] variants and reassembled into a final response
//! - **Structured output**: declare an output type, get best-effort partial
//!   values while it streams and a strictly parsed value at the end
//! - **Tool calls**: register tools and they run as soon as the model finishes
//!   their arguments, mid-stream
//! - **Cancellation**: idempotent, cooperative and safe against in-flight I/O
//! - **Hooks and telemetry**: intercept tool calls and observe every request
//!   exactly once at start and end
//!
//! ## Two Exchange Modes
//!
//! ### 1. Buffered (`Responder::respond`)
//!
//! ```rust,no_run
//! use open_responder::{Request, Responder, ResponderOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let responder = Responder::new(
//!         ResponderOptions::builder()
//!             .base_url("http://localhost:1234/v1")
//!             .build()?,
//!     )?;
//!
//!     let request = Request::builder()
//!         .model("qwen2.5-32b-instruct")
//!         .user("What's the capital of France?")
//!         .build()?;
//!
//!     let response = responder.respond(&request).await?;
//!     println!("{}", response.output_text());
//!     Ok(())
//! }
//! ```
//!
//! ### 2. Streaming (`Responder::stream`)
//!
//! ```rust,no_run
//! use open_responder::{Request, Responder, ResponderOptions, ToolRegistry, tool};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let responder = Responder::new(
//!         ResponderOptions::builder()
//!             .base_url("http://localhost:1234/v1")
//!             .build()?,
//!     )?;
//!
//!     let weather = tool("get_weather", "Current weather for a city")
//!         .param("location", "string")
//!         .build(|args| async move { Ok(json!({"location": args["location"], "celsius": 21})) });
//!     let registry = ToolRegistry::new().add(weather);
//!
//!     let request = Request::builder()
//!         .model("qwen2.5-32b-instruct")
//!         .user("What's the weather in Tokyo?")
//!         .tools(registry.definitions())
//!         .build()?;
//!
//!     let outcome = responder
//!         .stream(request)
//!         .with_tool_registry(registry)
//!         .on_text_delta(|delta| print!("{}", delta))
//!         .on_tool_result(|result| println!("\n[{} -> {}]", result.name, result.output))
//!         .outcome()
//!         .await?;
//!
//!     println!("\n{} tool call(s)", outcome.tool_outputs.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **retry**: [`RetryPolicy`] and the generic [`retry_with_policy`] loop
//! - **classify**: maps HTTP statuses and transport errors to [`ErrorKind`]s
//! - **client**: [`Responder`], the buffered executor and stream factory
//! - **events**: the [`StreamingEvent`] union and its discriminator table
//! - **sse**: [`EventStreamParser`], SSE framing to decoded events
//! - **aggregator**: [`StreamAggregator`], per-item accumulation and terminal handling
//! - **structured**: partial JSON completion and strict parsing
//! - **tools**: [`Tool`], [`ToolRegistry`] and tool call execution
//! - **stream**: [`ResponseStream`], callbacks, lifecycle and cancellation
//! - **hooks**, **context**, **config**, **error**, **types**

mod aggregator;

/// Failure classification for HTTP statuses and transport errors.
mod classify;

/// Responder: buffered exchanges and stream construction.
mod client;

/// Provider presets, environment resolution and responder options.
mod config;

/// Explicit per-request trace context.
mod context;

mod error;

/// Tool interception hooks and telemetry observers.
mod hooks;

mod sse;

/// Responses as a live, cancellable stream with callbacks.
mod stream;

/// Partial and strict parsing of structured output.
mod structured;

/// Function tools, registries and tool call execution.
mod tools;

/// Requests, responses and their wire types.
mod types;

/// Streaming event catalog. Public so callers can match on payload types.
pub mod events;

/// Retry utilities with exponential backoff.
/// Public as a module so the retry loop can be reused for other operations.
pub mod retry;

// --- Core Client API ---

pub use client::Responder;
pub use stream::{CancelHandle, ResponseStream, StreamOutcome, StreamState};

// --- Configuration ---

pub use config::{
    API_KEY_ENV, BASE_URL_ENV, MODEL_ENV, Provider, ResponderOptions, ResponderOptionsBuilder,
    get_api_key, get_base_url, get_model,
};
pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_with_policy};

// --- Context ---

pub use context::{RequestContext, generate_span_id, generate_trace_id};

// --- Error Handling ---

pub use classify::{classify_status, classify_transport, parse_retry_after};
pub use error::{Error, ErrorKind, Result};

// --- Streaming ---

pub use aggregator::{CompletedItem, Notification, StreamAggregator};
pub use events::{StreamingEvent, decode_event};
pub use sse::{EventStream, EventStreamParser, UnknownEventPolicy, from_events, with_idle_timeout};
pub use structured::{
    StructuredOutputParser, complete_partial_json, parse_partial, parse_partial_map, parse_strict,
};

// --- Lifecycle Hooks ---

pub use hooks::{
    HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, ResponseCompletedEvent,
    ResponseFailedEvent, ResponseStartedEvent,
};

// --- Tool System ---

pub use tools::{
    FunctionTool, Tool, ToolBuilder, ToolExecutor, ToolOutput, ToolRegistry, execute_tool_call,
    parse_arguments, tool,
};

// --- Core Types ---

pub use types::{
    ContentPart, IncompleteDetails, InputItem, MessageRole, OutputFormat, OutputItem,
    ParsedResponse, ReasoningText, Request, RequestBuilder, Response, ResponseError,
    ResponseStatus, TextConfig, ToolCall, ToolDefinition, Usage,
};

/// Convenience module containing the most commonly used types and functions.
/// Import with `use open_responder::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Error, ErrorKind, HookDecision, Hooks, InputItem, OutputFormat, Request, RequestContext,
        Responder, ResponderOptions, Response, ResponseStream, Result, RetryPolicy,
        StreamingEvent, Tool, ToolCall, ToolOutput, ToolRegistry, tool,
    };
}
