//! Lifecycle hooks
//!
//! Hooks let applications observe and steer what the engine does without
//! wrapping it. There are two families:
//!
//! - **Tool hooks** run around every tool invocation during a stream.
//!   [`PreToolUseEvent`] handlers can block a call or rewrite its arguments;
//!   [`PostToolUseEvent`] handlers can replace the result fed back to the model.
//!   Handlers run in registration order and the first one returning
//!   `Some(decision)` wins.
//! - **Telemetry hooks** observe each logical request exactly once at start and
//!   once at its end (completed or failed), regardless of how many physical
//!   attempts were made.
//!
//! All handlers are async closures stored behind `Arc`, so a [`Hooks`] value is
//! cheap to clone into every stream.
//!
//! # Examples
//!
//! ```rust
//! use open_responder::{HookDecision, Hooks};
//!
//! let hooks = Hooks::new()
//!     .add_pre_tool_use(|event| async move {
//!         if event.tool_name == "delete_everything" {
//!             return Some(HookDecision::block("not allowed"));
//!         }
//!         None
//!     })
//!     .on_response_completed(|event| async move {
//!         log::info!("{} finished in {:?}", event.response_id, event.latency);
//!     });
//! ```

use crate::ErrorKind;
use crate::context::RequestContext;
use crate::types::{ResponseStatus, Usage};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Fired before a tool runs
#[derive(Debug, Clone)]
pub struct PreToolUseEvent {
    pub tool_name: String,
    pub tool_input: Value,
    pub call_id: String,
}

impl PreToolUseEvent {
    pub fn new(tool_name: impl Into<String>, tool_input: Value, call_id: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_input,
            call_id: call_id.into(),
        }
    }
}

/// Fired after a tool returned successfully
#[derive(Debug, Clone)]
pub struct PostToolUseEvent {
    pub tool_name: String,
    pub tool_input: Value,
    pub call_id: String,
    pub tool_result: Value,
}

impl PostToolUseEvent {
    pub fn new(
        tool_name: impl Into<String>,
        tool_input: Value,
        call_id: impl Into<String>,
        tool_result: Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_input,
            call_id: call_id.into(),
            tool_result,
        }
    }
}

/// What a tool hook wants to happen
#[derive(Debug, Clone, Default)]
pub struct HookDecision {
    continue_execution: bool,
    modified_input: Option<Value>,
    modified_output: Option<Value>,
    reason: Option<String>,
}

impl HookDecision {
    pub fn continue_() -> Self {
        Self {
            continue_execution: true,
            ..Self::default()
        }
    }

    /// Stop the tool call. The reason becomes the tool error message.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            continue_execution: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Run the tool with different arguments (pre-tool hooks)
    pub fn modify_input(input: Value, reason: impl Into<String>) -> Self {
        Self {
            continue_execution: true,
            modified_input: Some(input),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Feed a different result back to the model (post-tool hooks)
    pub fn modify_output(output: Value, reason: impl Into<String>) -> Self {
        Self {
            continue_execution: true,
            modified_output: Some(output),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn continue_execution(&self) -> bool {
        self.continue_execution
    }

    pub fn modified_input(&self) -> Option<&Value> {
        self.modified_input.as_ref()
    }

    pub fn modified_output(&self) -> Option<&Value> {
        self.modified_output.as_ref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// A logical request is about to be sent
#[derive(Debug, Clone)]
pub struct ResponseStartedEvent {
    pub context: RequestContext,
    pub model: String,
    pub streaming: bool,
}

/// A logical request finished successfully
#[derive(Debug, Clone)]
pub struct ResponseCompletedEvent {
    pub context: RequestContext,
    pub model: String,
    pub streaming: bool,
    pub response_id: String,
    pub status: ResponseStatus,
    pub usage: Option<Usage>,
    pub latency: Duration,
    pub attempts: u32,
}

/// A logical request failed or was cancelled
#[derive(Debug, Clone)]
pub struct ResponseFailedEvent {
    pub context: RequestContext,
    pub model: String,
    pub streaming: bool,
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
    pub latency: Duration,
    pub attempts: u32,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type PreToolUseHandler =
    Arc<dyn Fn(PreToolUseEvent) -> BoxFuture<Option<HookDecision>> + Send + Sync>;

pub type PostToolUseHandler =
    Arc<dyn Fn(PostToolUseEvent) -> BoxFuture<Option<HookDecision>> + Send + Sync>;

pub type ResponseStartedHandler = Arc<dyn Fn(ResponseStartedEvent) -> BoxFuture<()> + Send + Sync>;

pub type ResponseCompletedHandler =
    Arc<dyn Fn(ResponseCompletedEvent) -> BoxFuture<()> + Send + Sync>;

pub type ResponseFailedHandler = Arc<dyn Fn(ResponseFailedEvent) -> BoxFuture<()> + Send + Sync>;

/// Registered hook handlers
#[derive(Clone, Default)]
pub struct Hooks {
    pub pre_tool_use: Vec<PreToolUseHandler>,
    pub post_tool_use: Vec<PostToolUseHandler>,
    pub response_started: Vec<ResponseStartedHandler>,
    pub response_completed: Vec<ResponseCompletedHandler>,
    pub response_failed: Vec<ResponseFailedHandler>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre_tool_use<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PreToolUseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.pre_tool_use
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn add_post_tool_use<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PostToolUseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.post_tool_use
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn on_response_started<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ResponseStartedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.response_started
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn on_response_completed<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ResponseCompletedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.response_completed
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn on_response_failed<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ResponseFailedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.response_failed
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pre_tool_use.is_empty()
            && self.post_tool_use.is_empty()
            && self.response_started.is_empty()
            && self.response_completed.is_empty()
            && self.response_failed.is_empty()
    }

    /// First non-`None` decision wins.
    pub async fn execute_pre_tool_use(&self, event: PreToolUseEvent) -> Option<HookDecision> {
        for handler in &self.pre_tool_use {
            let decision = handler(event.clone()).await;
            if decision.is_some() {
                return decision;
            }
        }
        None
    }

    /// First non-`None` decision wins.
    pub async fn execute_post_tool_use(&self, event: PostToolUseEvent) -> Option<HookDecision> {
        for handler in &self.post_tool_use {
            let decision = handler(event.clone()).await;
            if decision.is_some() {
                return decision;
            }
        }
        None
    }

    pub async fn emit_response_started(&self, event: ResponseStartedEvent) {
        for handler in &self.response_started {
            handler(event.clone()).await;
        }
    }

    pub async fn emit_response_completed(&self, event: ResponseCompletedEvent) {
        for handler in &self.response_completed {
            handler(event.clone()).await;
        }
    }

    pub async fn emit_response_failed(&self, event: ResponseFailedEvent) {
        for handler in &self.response_failed {
            handler(event.clone()).await;
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_tool_use", &format!("{} handlers", self.pre_tool_use.len()))
            .field("post_tool_use", &format!("{} handlers", self.post_tool_use.len()))
            .field(
                "response_started",
                &format!("{} handlers", self.response_started.len()),
            )
            .field(
                "response_completed",
                &format!("{} handlers", self.response_completed.len()),
            )
            .field(
                "response_failed",
                &format!("{} handlers", self.response_failed.len()),
            )
            .finish()
    }
}
