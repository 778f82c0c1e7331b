//! Streaming event catalog
//!
//! Every data frame of a Responses stream is a JSON object whose `type` field
//! names the event. [`decode_event`] looks the discriminator up in a single
//! table mapping type strings to decoders; discriminators missing from the table
//! become [`StreamingEvent::Unknown`] so that new server events never break an
//! existing client.

use crate::types::{ContentPart, OutputItem, Response};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `response.created`, `response.in_progress`, `response.completed`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseLifecycleEvent {
    pub sequence_number: u64,
    pub response: Response,
}

/// `response.output_item.added` / `response.output_item.done`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItemEvent {
    pub sequence_number: u64,
    pub output_index: u32,
    pub item: OutputItem,
}

/// `response.content_part.added` / `response.content_part.done`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPartEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub content_index: u32,
    pub part: ContentPart,
}

/// Incremental text for output text, refusals and reasoning text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDeltaEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub content_index: u32,
    pub delta: String,
}

/// Final text for output text and reasoning text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDoneEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub content_index: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefusalDoneEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub content_index: u32,
    pub refusal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationAddedEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub content_index: u32,
    #[serde(default)]
    pub annotation_index: u32,
    pub annotation: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSummaryPartEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    pub part: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSummaryDeltaEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSummaryDoneEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    pub text: String,
}

/// Incremental argument or input text for function, MCP and custom tool calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentsDeltaEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub delta: String,
}

/// `response.function_call_arguments.done`
///
/// `name` is not always sent; the aggregator fills it in from the matching
/// `output_item.added` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallArgumentsDoneEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub arguments: String,
}

/// `response.mcp_call_arguments.done`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentsDoneEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub arguments: String,
}

/// `response.code_interpreter_call_code.done`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeDoneEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub code: String,
}

/// `response.custom_tool_call_input.done`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomToolInputDoneEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub input: String,
}

/// Progress of a hosted tool call (search, code interpreter, image generation, MCP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallProgressEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub item_id: String,
    pub output_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialImageEvent {
    pub sequence_number: u64,
    pub item_id: String,
    pub output_index: u32,
    pub partial_image_index: u32,
    pub partial_image_b64: String,
}

/// Top-level `error` event. Terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub sequence_number: u64,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub param: Option<String>,
}

/// An event whose discriminator is not in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownEvent {
    pub event_type: String,
    pub sequence_number: u64,
    pub payload: Value,
}

type Decoder = fn(Value) -> serde_json::Result<StreamingEvent>;

macro_rules! streaming_events {
    ($( $(#[$meta:meta])* $variant:ident($payload:ty) => $tag:literal, )+) => {
        /// A decoded streaming event
        #[derive(Debug, Clone, PartialEq)]
        pub enum StreamingEvent {
            $( $(#[$meta])* $variant($payload), )+
            /// Discriminator not in the catalog; payload kept verbatim
            Unknown(UnknownEvent),
        }

        static EVENT_DECODERS: &[(&str, Decoder)] = &[
            $(
                (
                    $tag,
                    (|value: Value| -> serde_json::Result<StreamingEvent> {
                        Ok(StreamingEvent::$variant(serde_json::from_value(value)?))
                    }) as Decoder,
                ),
            )+
        ];

        impl StreamingEvent {
            /// The wire discriminator of this event
            pub fn event_type(&self) -> &str {
                match self {
                    $( StreamingEvent::$variant(_) => $tag, )+
                    StreamingEvent::Unknown(event) => &event.event_type,
                }
            }

            pub fn sequence_number(&self) -> u64 {
                match self {
                    $( StreamingEvent::$variant(event) => event.sequence_number, )+
                    StreamingEvent::Unknown(event) => event.sequence_number,
                }
            }
        }
    };
}

streaming_events! {
    Created(ResponseLifecycleEvent) => "response.created",
    Queued(ResponseLifecycleEvent) => "response.queued",
    InProgress(ResponseLifecycleEvent) => "response.in_progress",
    Completed(ResponseLifecycleEvent) => "response.completed",
    Failed(ResponseLifecycleEvent) => "response.failed",
    Incomplete(ResponseLifecycleEvent) => "response.incomplete",

    OutputItemAdded(OutputItemEvent) => "response.output_item.added",
    OutputItemDone(OutputItemEvent) => "response.output_item.done",
    ContentPartAdded(ContentPartEvent) => "response.content_part.added",
    ContentPartDone(ContentPartEvent) => "response.content_part.done",

    OutputTextDelta(TextDeltaEvent) => "response.output_text.delta",
    OutputTextDone(TextDoneEvent) => "response.output_text.done",
    OutputTextAnnotationAdded(AnnotationAddedEvent) => "response.output_text.annotation.added",
    RefusalDelta(TextDeltaEvent) => "response.refusal.delta",
    RefusalDone(RefusalDoneEvent) => "response.refusal.done",

    FunctionCallArgumentsDelta(ArgumentsDeltaEvent) => "response.function_call_arguments.delta",
    FunctionCallArgumentsDone(FunctionCallArgumentsDoneEvent) => "response.function_call_arguments.done",
    CustomToolCallInputDelta(ArgumentsDeltaEvent) => "response.custom_tool_call_input.delta",
    CustomToolCallInputDone(CustomToolInputDoneEvent) => "response.custom_tool_call_input.done",

    ReasoningSummaryPartAdded(ReasoningSummaryPartEvent) => "response.reasoning_summary_part.added",
    ReasoningSummaryPartDone(ReasoningSummaryPartEvent) => "response.reasoning_summary_part.done",
    ReasoningSummaryTextDelta(ReasoningSummaryDeltaEvent) => "response.reasoning_summary_text.delta",
    ReasoningSummaryTextDone(ReasoningSummaryDoneEvent) => "response.reasoning_summary_text.done",
    ReasoningTextDelta(TextDeltaEvent) => "response.reasoning_text.delta",
    ReasoningTextDone(TextDoneEvent) => "response.reasoning_text.done",

    FileSearchCallInProgress(ToolCallProgressEvent) => "response.file_search_call.in_progress",
    FileSearchCallSearching(ToolCallProgressEvent) => "response.file_search_call.searching",
    FileSearchCallCompleted(ToolCallProgressEvent) => "response.file_search_call.completed",
    WebSearchCallInProgress(ToolCallProgressEvent) => "response.web_search_call.in_progress",
    WebSearchCallSearching(ToolCallProgressEvent) => "response.web_search_call.searching",
    WebSearchCallCompleted(ToolCallProgressEvent) => "response.web_search_call.completed",
    CodeInterpreterCallInProgress(ToolCallProgressEvent) => "response.code_interpreter_call.in_progress",
    CodeInterpreterCallInterpreting(ToolCallProgressEvent) => "response.code_interpreter_call.interpreting",
    CodeInterpreterCallCompleted(ToolCallProgressEvent) => "response.code_interpreter_call.completed",
    CodeInterpreterCallCodeDelta(ArgumentsDeltaEvent) => "response.code_interpreter_call_code.delta",
    CodeInterpreterCallCodeDone(CodeDoneEvent) => "response.code_interpreter_call_code.done",
    ImageGenerationCallInProgress(ToolCallProgressEvent) => "response.image_generation_call.in_progress",
    ImageGenerationCallGenerating(ToolCallProgressEvent) => "response.image_generation_call.generating",
    ImageGenerationCallPartialImage(PartialImageEvent) => "response.image_generation_call.partial_image",
    ImageGenerationCallCompleted(ToolCallProgressEvent) => "response.image_generation_call.completed",
    McpCallInProgress(ToolCallProgressEvent) => "response.mcp_call.in_progress",
    McpCallCompleted(ToolCallProgressEvent) => "response.mcp_call.completed",
    McpCallFailed(ToolCallProgressEvent) => "response.mcp_call.failed",
    McpCallArgumentsDelta(ArgumentsDeltaEvent) => "response.mcp_call_arguments.delta",
    McpCallArgumentsDone(ArgumentsDoneEvent) => "response.mcp_call_arguments.done",
    McpListToolsInProgress(ToolCallProgressEvent) => "response.mcp_list_tools.in_progress",
    McpListToolsCompleted(ToolCallProgressEvent) => "response.mcp_list_tools.completed",
    McpListToolsFailed(ToolCallProgressEvent) => "response.mcp_list_tools.failed",

    Error(ErrorEvent) => "error",
}

static DECODER_TABLE: LazyLock<HashMap<&'static str, Decoder>> =
    LazyLock::new(|| EVENT_DECODERS.iter().copied().collect());

impl StreamingEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamingEvent::Completed(_)
                | StreamingEvent::Failed(_)
                | StreamingEvent::Incomplete(_)
                | StreamingEvent::Error(_)
        )
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, StreamingEvent::Unknown(_))
    }
}

/// Whether `event_type` is part of the event catalog.
pub fn is_known_event_type(event_type: &str) -> bool {
    DECODER_TABLE.contains_key(event_type)
}

/// All discriminators in the event catalog.
pub fn known_event_types() -> impl Iterator<Item = &'static str> {
    EVENT_DECODERS.iter().map(|(tag, _)| *tag)
}

/// Decode one data frame payload into a [`StreamingEvent`].
///
/// A payload that is not a JSON object or lacks a string `type` is a parse
/// failure. A known discriminator whose payload does not match its schema is a
/// parse failure. An unknown discriminator is not.
pub fn decode_event(data: &str) -> Result<StreamingEvent> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| Error::parsing(format!("Invalid JSON in stream event: {}", e)).with_source(e))?;

    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::parsing("Stream event has no 'type' discriminator"))?
        .to_string();

    match DECODER_TABLE.get(event_type.as_str()) {
        Some(decode) => decode(value).map_err(|e| {
            Error::parsing(format!("Malformed '{}' event: {}", event_type, e)).with_source(e)
        }),
        None => Ok(StreamingEvent::Unknown(UnknownEvent {
            sequence_number: value
                .get("sequence_number")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
            event_type,
            payload: value,
        })),
    }
}
