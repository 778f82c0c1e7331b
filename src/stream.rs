//! Live response streams
//!
//! A [`ResponseStream`] is created by [`Responder::stream`](crate::Responder::stream)
//! and moves through `Created -> Running -> {Completed | Failed | Cancelled}`
//! exactly once. Callbacks are registered with consuming builder methods before
//! [`start`](ResponseStream::start); after that the stream is driven by one
//! spawned task that owns both the network read loop and callback dispatch, so
//! callbacks for one stream never run concurrently and always fire in event
//! order.
//!
//! Tool calls are executed inline on that task when a registry is attached: the
//! read loop pauses while the tool runs. A failing tool is reported through
//! [`on_tool_error`](ResponseStream::on_tool_error) and does not end the stream.
//!
//! # Cancellation
//!
//! [`cancel`](ResponseStream::cancel) (or a [`CancelHandle`] from another task)
//! is idempotent. Once it is observed no further callback fires, the HTTP
//! connection is dropped and the result resolves to
//! [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled). Dropping a running
//! stream cancels it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use open_responder::{Request, Responder, ResponderOptions};
//! use std::io::Write;
//!
//! # async fn example() -> open_responder::Result<()> {
//! let responder = Responder::new(
//!     ResponderOptions::builder()
//!         .base_url("https://api.openai.com/v1")
//!         .api_key("sk-...")
//!         .build()?,
//! )?;
//!
//! let request = Request::builder().model("gpt-4o-mini").user("Say hello").build()?;
//!
//! let text = responder
//!     .stream(request)
//!     .on_text_delta(|delta| {
//!         print!("{}", delta);
//!         let _ = std::io::stdout().flush();
//!     })
//!     .text()
//!     .await?;
//! # let _ = text;
//! # Ok(())
//! # }
//! ```

use crate::aggregator::{CompletedItem, Notification, StreamAggregator};
use crate::client::HttpExchange;
use crate::config::ResponderOptions;
use crate::context::RequestContext;
use crate::events::StreamingEvent;
use crate::hooks::{Hooks, ResponseCompletedEvent, ResponseFailedEvent, ResponseStartedEvent};
use crate::retry::{RetryPolicy, retry_with_policy};
use crate::sse::{EventStream, EventStreamParser, UnknownEventPolicy, with_idle_timeout};
use crate::structured::{StructuredOutputParser, parse_partial_map, parse_strict};
use crate::tools::{ToolExecutor, ToolOutput, ToolRegistry};
use crate::types::{OutputItem, ParsedResponse, Request, Response, ToolCall};
use crate::{Error, ErrorKind, Result};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, oneshot};

/// Lifecycle state of a [`ResponseStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Created = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Created,
            1 => StreamState::Running,
            2 => StreamState::Completed,
            3 => StreamState::Failed,
            _ => StreamState::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Failed | StreamState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Created => "CREATED",
            StreamState::Running => "RUNNING",
            StreamState::Completed => "COMPLETED",
            StreamState::Failed => "FAILED",
            StreamState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between a stream, its cancel handles and its driver task
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    cancel: Notify,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(StreamState::Created as u8),
            cancel: Notify::new(),
        }
    }

    fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: StreamState, to: StreamState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true only for the call that actually cancelled.
    fn cancel(&self) -> bool {
        loop {
            let current = self.state();
            if current.is_terminal() {
                return false;
            }
            if self.transition(current, StreamState::Cancelled) {
                self.cancel.notify_one();
                log::debug!("Stream cancelled while {}", current);
                return true;
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.state() == StreamState::Cancelled
    }

    async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            self.cancel.notified().await;
        }
    }
}

/// Cancels a stream from anywhere
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Cancel the stream. Has no effect once it reached a terminal state.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

/// Everything a finished stream produced
#[derive(Debug)]
pub struct StreamOutcome<T = ()> {
    pub response: Response,
    /// Assistant output text
    pub text: String,
    /// Results of tools executed during the stream, in call order
    pub tool_outputs: Vec<ToolOutput>,
    /// Strictly parsed output, for streams created with a parsed type
    pub parsed: Option<T>,
}

impl<T> StreamOutcome<T> {
    /// Tool results as output items, ready to be fed into the next turn
    pub fn tool_output_items(&self) -> Vec<OutputItem> {
        self.tool_outputs.iter().map(ToolOutput::to_output_item).collect()
    }
}

/// Settings a stream inherits from its responder
#[derive(Debug, Clone, Default)]
pub(crate) struct StreamSettings {
    retry_policy: RetryPolicy,
    unknown_events: UnknownEventPolicy,
    idle_timeout: Option<Duration>,
    hooks: Hooks,
}

impl StreamSettings {
    pub(crate) fn from_options(options: &ResponderOptions) -> Self {
        Self {
            retry_policy: options.retry_policy.clone(),
            unknown_events: options.unknown_events,
            idle_timeout: options.stream_idle_timeout,
            hooks: options.hooks.clone(),
        }
    }
}

enum Source {
    Http(Arc<HttpExchange>),
    Events(EventStream),
}

type Listener<A> = Box<dyn FnMut(&A) + Send>;

struct Callbacks<T> {
    text_delta: Vec<Listener<str>>,
    event: Vec<Listener<StreamingEvent>>,
    complete: Vec<Listener<Response>>,
    error: Vec<Listener<Error>>,
    tool_call: Vec<Listener<ToolCall>>,
    tool_result: Vec<Listener<ToolOutput>>,
    tool_error: Vec<Box<dyn FnMut(&ToolCall, &Error) + Send>>,
    item_complete: Vec<Listener<CompletedItem>>,
    // Fed every output text delta; each owns its own partial parser.
    partial: Vec<Listener<str>>,
    parsed_complete: Vec<Listener<T>>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            text_delta: Vec::new(),
            event: Vec::new(),
            complete: Vec::new(),
            error: Vec::new(),
            tool_call: Vec::new(),
            tool_result: Vec::new(),
            tool_error: Vec::new(),
            item_complete: Vec::new(),
            partial: Vec::new(),
            parsed_complete: Vec::new(),
        }
    }
}

fn dispatch<A: ?Sized>(listeners: &mut [Box<dyn FnMut(&A) + Send>], value: &A) {
    for listener in listeners.iter_mut() {
        listener(value);
    }
}

/// A streaming response exchange
pub struct ResponseStream<T = ()> {
    request: Request,
    context: RequestContext,
    settings: StreamSettings,
    source: Option<Source>,
    callbacks: Option<Callbacks<T>>,
    registry: Option<Arc<ToolRegistry>>,
    parse_output: bool,
    structured_callbacks: bool,
    shared: Arc<Shared>,
    result: Option<oneshot::Receiver<Result<StreamOutcome<T>>>>,
}

impl<T> std::fmt::Debug for ResponseStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("model", &self.request.model())
            .field("trace_id", &self.context.trace_id())
            .field("state", &self.shared.state())
            .field("parse_output", &self.parse_output)
            .field("tools", &self.registry)
            .finish()
    }
}

impl ResponseStream<()> {
    /// Drive a stream from already decoded events, e.g. a recorded session.
    pub fn from_event_stream(request: Request, events: EventStream) -> Self {
        Self::with_source(
            request,
            RequestContext::new(),
            StreamSettings::default(),
            Source::Events(events),
            false,
        )
    }

    pub(crate) fn http(
        exchange: Arc<HttpExchange>,
        request: Request,
        context: RequestContext,
    ) -> Self {
        let settings = StreamSettings::from_options(exchange.options());
        Self::with_source(request, context, settings, Source::Http(exchange), false)
    }
}

impl<T> ResponseStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Like [`from_event_stream`](ResponseStream::from_event_stream), with the
    /// final text strictly parsed into `T`.
    pub fn from_event_stream_parsed(request: Request, events: EventStream) -> Result<Self> {
        require_output_shape(&request)?;
        Ok(Self::with_source(
            request,
            RequestContext::new(),
            StreamSettings::default(),
            Source::Events(events),
            true,
        ))
    }

    pub(crate) fn http_parsed(
        exchange: Arc<HttpExchange>,
        request: Request,
        context: RequestContext,
    ) -> Result<Self> {
        require_output_shape(&request)?;
        let settings = StreamSettings::from_options(exchange.options());
        Ok(Self::with_source(
            request,
            context,
            settings,
            Source::Http(exchange),
            true,
        ))
    }

    fn with_source(
        request: Request,
        context: RequestContext,
        settings: StreamSettings,
        source: Source,
        parse_output: bool,
    ) -> Self {
        Self {
            request,
            context,
            settings,
            source: Some(source),
            callbacks: Some(Callbacks::default()),
            registry: None,
            parse_output,
            structured_callbacks: false,
            shared: Arc::new(Shared::new()),
            result: None,
        }
    }

    fn register(mut self, add: impl FnOnce(&mut Callbacks<T>)) -> Self {
        match self.callbacks.as_mut() {
            Some(callbacks) => add(callbacks),
            None => log::warn!("Callback registered after the stream started; it will never fire"),
        }
        self
    }

    /// Called with every output text delta
    pub fn on_text_delta(self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.register(|c| c.text_delta.push(Box::new(callback)))
    }

    /// Called with every decoded event, including unknown ones
    pub fn on_event(self, callback: impl FnMut(&StreamingEvent) + Send + 'static) -> Self {
        self.register(|c| c.event.push(Box::new(callback)))
    }

    pub fn on_complete(self, callback: impl FnMut(&Response) + Send + 'static) -> Self {
        self.register(|c| c.complete.push(Box::new(callback)))
    }

    /// Called once with the failure that ended the stream. Not called on cancellation.
    pub fn on_error(self, callback: impl FnMut(&Error) + Send + 'static) -> Self {
        self.register(|c| c.error.push(Box::new(callback)))
    }

    /// Called when a function call's arguments are final
    pub fn on_tool_call(self, callback: impl FnMut(&ToolCall) + Send + 'static) -> Self {
        self.register(|c| c.tool_call.push(Box::new(callback)))
    }

    pub fn on_tool_result(self, callback: impl FnMut(&ToolOutput) + Send + 'static) -> Self {
        self.register(|c| c.tool_result.push(Box::new(callback)))
    }

    pub fn on_tool_error(self, callback: impl FnMut(&ToolCall, &Error) + Send + 'static) -> Self {
        self.register(|c| c.tool_error.push(Box::new(callback)))
    }

    pub fn on_item_complete(self, callback: impl FnMut(&CompletedItem) + Send + 'static) -> Self {
        self.register(|c| c.item_complete.push(Box::new(callback)))
    }

    /// Called with a best-effort parse of the output text after every delta
    /// that yields one. Requires a request with an output shape.
    pub fn on_partial_parsed<P>(mut self, mut callback: impl FnMut(P) + Send + 'static) -> Self
    where
        P: DeserializeOwned + 'static,
    {
        self.structured_callbacks = true;
        let mut parser = StructuredOutputParser::<P>::new();
        self.register(move |c| {
            c.partial.push(Box::new(move |delta: &str| {
                if let Some(partial) = parser.push(delta) {
                    callback(partial);
                }
            }))
        })
    }

    /// Like [`on_partial_parsed`](Self::on_partial_parsed) with a generic map view.
    pub fn on_partial_json(
        mut self,
        mut callback: impl FnMut(&Map<String, Value>) + Send + 'static,
    ) -> Self {
        self.structured_callbacks = true;
        let mut buffer = String::new();
        self.register(move |c| {
            c.partial.push(Box::new(move |delta: &str| {
                buffer.push_str(delta);
                if let Some(map) = parse_partial_map(&buffer) {
                    callback(&map);
                }
            }))
        })
    }

    /// Called with the strictly parsed value once the stream completes.
    pub fn on_parsed_complete(mut self, callback: impl FnMut(&T) + Send + 'static) -> Self {
        self.structured_callbacks = true;
        self.register(|c| c.parsed_complete.push(Box::new(callback)))
    }

    /// Execute function calls against `registry` as they complete
    pub fn with_tool_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel the stream. Idempotent; no effect after a terminal state.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Spawn the driver task on the current Tokio runtime.
    ///
    /// Fails with [`ErrorKind::IllegalState`] when the stream was already
    /// started or has reached a terminal state, and with
    /// [`ErrorKind::Configuration`] when structured callbacks are registered on
    /// a request without an output shape.
    pub fn start(&mut self) -> Result<()> {
        let state = self.shared.state();
        if state != StreamState::Created {
            return Err(Error::illegal_state(format!(
                "stream cannot be started in state {}",
                state
            )));
        }
        if (self.structured_callbacks || self.parse_output) && !self.request.has_output_shape() {
            return Err(Error::config(
                "structured output callbacks require a request with an output shape",
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::illegal_state("streams must be started inside a Tokio runtime").with_source(e)
        })?;

        if !self.shared.transition(StreamState::Created, StreamState::Running) {
            return Err(Error::illegal_state(format!(
                "stream cannot be started in state {}",
                self.shared.state()
            )));
        }

        let (source, callbacks) = match (self.source.take(), self.callbacks.take()) {
            (Some(source), Some(callbacks)) => (source, callbacks),
            _ => return Err(Error::illegal_state("stream was already started")),
        };

        let executor = self
            .registry
            .clone()
            .map(|registry| ToolExecutor::new(registry, self.settings.hooks.clone()));

        let driver = Driver {
            request: self.request.clone(),
            context: self.context.clone(),
            settings: self.settings.clone(),
            source: Some(source),
            callbacks,
            executor,
            parse_output: self.parse_output,
            shared: Arc::clone(&self.shared),
            parser: EventStreamParser::new(self.settings.unknown_events),
            attempts: 0,
        };

        let (tx, rx) = oneshot::channel();
        self.result = Some(rx);
        log::debug!(
            "Starting stream for model {} (trace {})",
            self.request.model(),
            self.context.trace_id()
        );
        runtime.spawn(driver.run(tx));
        Ok(())
    }

    /// Wait for the stream to finish, starting it first if needed.
    pub async fn outcome(mut self) -> Result<StreamOutcome<T>> {
        if self.result.is_none() {
            match self.shared.state() {
                StreamState::Created => self.start()?,
                StreamState::Cancelled => return Err(Error::cancelled()),
                state => {
                    return Err(Error::illegal_state(format!(
                        "stream result is no longer available in state {}",
                        state
                    )));
                }
            }
        }

        let receiver = self
            .result
            .take()
            .ok_or_else(|| Error::illegal_state("stream result is no longer available"))?;

        match receiver.await {
            Ok(result) => result,
            // The driver only goes away without answering when its task was torn down.
            Err(_) if self.shared.is_cancelled() => Err(Error::cancelled()),
            Err(_) => Err(Error::illegal_state("stream task ended without a result")),
        }
    }

    /// The final response
    pub async fn get(self) -> Result<Response> {
        Ok(self.outcome().await?.response)
    }

    /// The final assistant text
    pub async fn text(self) -> Result<String> {
        Ok(self.outcome().await?.text)
    }

    /// The final response with its strictly parsed output.
    ///
    /// Fails immediately with [`ErrorKind::IllegalState`] when the stream was
    /// not created with a parsed type.
    pub async fn parsed(self) -> Result<ParsedResponse<T>> {
        if !self.parse_output || !self.request.has_output_shape() {
            return Err(Error::illegal_state(
                "parsed output requires a request with an output shape; use stream_parsed",
            ));
        }
        let outcome = self.outcome().await?;
        let parsed = outcome
            .parsed
            .ok_or_else(|| Error::illegal_state("stream completed without a parsed value"))?;
        Ok(ParsedResponse::new(outcome.response, parsed))
    }
}

impl<T> Drop for ResponseStream<T> {
    fn drop(&mut self) {
        if self.shared.state() == StreamState::Running && self.shared.cancel() {
            log::debug!("Running stream dropped; cancelled");
        }
    }
}

fn require_output_shape(request: &Request) -> Result<()> {
    if request.has_output_shape() {
        Ok(())
    } else {
        Err(Error::illegal_state(
            "parsed output requires a request with a structured output format",
        ))
    }
}

/// Owns one running stream: network reads, aggregation and callback dispatch
struct Driver<T> {
    request: Request,
    context: RequestContext,
    settings: StreamSettings,
    source: Option<Source>,
    callbacks: Callbacks<T>,
    executor: Option<ToolExecutor>,
    parse_output: bool,
    shared: Arc<Shared>,
    parser: EventStreamParser,
    attempts: u32,
}

impl<T> Driver<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn run(mut self, tx: oneshot::Sender<Result<StreamOutcome<T>>>) {
        let started = Instant::now();
        let hooks = self.settings.hooks.clone();

        hooks
            .emit_response_started(ResponseStartedEvent {
                context: self.context.clone(),
                model: self.request.model().to_string(),
                streaming: true,
            })
            .await;

        let result = match self.drive().await {
            Ok(outcome) => {
                if self.shared.transition(StreamState::Running, StreamState::Completed) {
                    dispatch(&mut self.callbacks.complete, &outcome.response);
                    if let Some(parsed) = &outcome.parsed {
                        dispatch(&mut self.callbacks.parsed_complete, parsed);
                    }
                    Ok(outcome)
                } else {
                    Err(Error::cancelled())
                }
            }
            Err(err) if err.kind() == ErrorKind::Cancelled => Err(err),
            Err(err) => {
                if self.shared.transition(StreamState::Running, StreamState::Failed) {
                    log::warn!("Stream failed: {}", err);
                    dispatch(&mut self.callbacks.error, &err);
                    Err(err)
                } else {
                    Err(Error::cancelled())
                }
            }
        };

        let latency = started.elapsed();
        match &result {
            Ok(outcome) => {
                hooks
                    .emit_response_completed(ResponseCompletedEvent {
                        context: self.context.clone(),
                        model: self.request.model().to_string(),
                        streaming: true,
                        response_id: outcome.response.id.clone(),
                        status: outcome.response.status,
                        usage: outcome.response.usage,
                        latency,
                        attempts: self.attempts,
                    })
                    .await;
            }
            Err(err) => {
                hooks
                    .emit_response_failed(ResponseFailedEvent {
                        context: self.context.clone(),
                        model: self.request.model().to_string(),
                        streaming: true,
                        kind: err.kind(),
                        status: err.status(),
                        message: err.message().to_string(),
                        latency,
                        attempts: self.attempts,
                    })
                    .await;
            }
        }

        if tx.send(result).is_err() {
            log::debug!("Stream result dropped; nobody is waiting for it");
        }
    }

    /// Open the event stream, retrying the initial exchange under the policy.
    async fn connect(&mut self) -> Result<EventStream> {
        let exchange = match self.source.take() {
            Some(Source::Events(events)) => {
                self.attempts = 1;
                return Ok(events);
            }
            Some(Source::Http(exchange)) => exchange,
            None => return Err(Error::illegal_state("stream source already consumed")),
        };

        let body = self.request.to_body(true)?;
        let context = &self.context;
        let policy = &self.settings.retry_policy;
        let shared = &self.shared;

        let outcome = tokio::select! {
            biased;
            _ = shared.cancelled() => return Err(Error::cancelled()),
            outcome = retry_with_policy(policy, |attempt| {
                let exchange = Arc::clone(&exchange);
                let body = body.clone();
                async move {
                    log::debug!("Opening stream, attempt {}", attempt);
                    exchange.send(body, context, true).await
                }
            }) => outcome,
        };

        self.attempts = outcome.attempts;
        let response = outcome.result?;

        let events = self.parser.parse(response.bytes_stream());
        Ok(match self.settings.idle_timeout {
            Some(idle) => with_idle_timeout(events, idle),
            None => events,
        })
    }

    async fn drive(&mut self) -> Result<StreamOutcome<T>> {
        let mut events = self.connect().await?;
        let mut aggregator = StreamAggregator::new();
        let mut tool_outputs = Vec::new();
        let mut completed: Option<Response> = None;

        while completed.is_none() {
            let next = tokio::select! {
                biased;
                _ = self.shared.cancelled() => return Err(Error::cancelled()),
                next = events.next() => next,
            };

            let Some(item) = next else { break };
            let event = item.map_err(|err| self.enrich(err, &aggregator))?;

            self.ensure_running()?;
            log::trace!("Stream event {} #{}", event.event_type(), event.sequence_number());
            dispatch(&mut self.callbacks.event, &event);

            let notifications = aggregator
                .apply(&event)
                .map_err(|err| self.enrich(err, &aggregator))?;

            for notification in notifications {
                self.ensure_running()?;
                match notification {
                    Notification::TextDelta { delta, .. } => {
                        dispatch(&mut self.callbacks.text_delta, delta.as_str());
                        dispatch(&mut self.callbacks.partial, delta.as_str());
                    }
                    Notification::RefusalDelta { .. }
                    | Notification::ReasoningDelta { .. }
                    | Notification::ArgumentsDelta { .. } => {}
                    Notification::ItemCompleted(item) => {
                        dispatch(&mut self.callbacks.item_complete, &item);
                    }
                    Notification::ToolCallReady(call) => {
                        dispatch(&mut self.callbacks.tool_call, &call);
                        if let Some(output) = self.run_tool(&call).await {
                            tool_outputs.push(output);
                        }
                    }
                    Notification::Completed(response) => {
                        completed = Some(*response);
                    }
                    Notification::Failed(err) => {
                        return Err(self.enrich(err, &aggregator));
                    }
                }
            }
        }

        let response = match completed {
            Some(response) => response,
            None => {
                let err = aggregator.finish().unwrap_or_else(|| {
                    Error::connection_dropped("stream ended before a terminal event")
                });
                return Err(self.enrich(err, &aggregator));
            }
        };

        let parsed = if self.parse_output {
            Some(parse_strict::<T>(&response)?)
        } else {
            None
        };

        let text = response
            .output_text_opt()
            .unwrap_or_else(|| aggregator.text().to_string());

        Ok(StreamOutcome {
            response,
            text,
            tool_outputs,
            parsed,
        })
    }

    async fn run_tool(&mut self, call: &ToolCall) -> Option<ToolOutput> {
        let executor = self.executor.as_ref()?;
        match executor.execute(call).await {
            Ok(output) => {
                if !self.shared.is_cancelled() {
                    dispatch(&mut self.callbacks.tool_result, &output);
                }
                Some(output)
            }
            Err(err) => {
                log::warn!("Tool call {} failed: {}", call.call_id, err);
                if !self.shared.is_cancelled() {
                    for listener in self.callbacks.tool_error.iter_mut() {
                        listener(call, &err);
                    }
                }
                None
            }
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shared.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }

    /// Attach stream diagnostics to a failure.
    fn enrich(&self, err: Error, aggregator: &StreamAggregator) -> Error {
        let err = if err.partial_output().is_none() {
            err.with_partial_output(aggregator.text().to_string())
        } else {
            err
        };
        err.with_bytes_received(self.parser.bytes_received())
    }
}
