//! Core wire types for the Open Responder SDK
//!
//! [`Request`] is what callers build and hand to a
//! [`Responder`](crate::Responder); [`Response`] is what comes back, either
//! decoded directly from a buffered exchange or assembled from a stream.

use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Developer,
    #[default]
    User,
    Assistant,
}

/// One item of request input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: MessageRole,
        content: String,
    },
    /// A function call emitted by an earlier response, replayed as history.
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// The result of running a tool, fed back to the model.
    FunctionCallOutput { call_id: String, output: String },
}

impl InputItem {
    pub fn message(role: MessageRole, content: impl Into<String>) -> Self {
        InputItem::Message {
            role,
            content: content.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::message(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::message(MessageRole::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::message(MessageRole::System, text)
    }

    pub fn developer(text: impl Into<String>) -> Self {
        Self::message(MessageRole::Developer, text)
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        InputItem::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

/// Function tool definition advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            name: name.into(),
            description: description.into(),
            parameters,
            strict: None,
        }
    }
}

/// Declared shape of the model's text output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    JsonObject,
    JsonSchema {
        name: String,
        schema: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        strict: bool,
    },
}

impl OutputFormat {
    /// Strict JSON schema output with the given schema.
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        OutputFormat::JsonSchema {
            name: name.into(),
            schema,
            description: None,
            strict: true,
        }
    }

    /// Strict JSON schema output derived from a Rust type.
    pub fn for_type<T: JsonSchema>() -> Result<Self> {
        let root = schemars::schema_for!(T);
        let schema = serde_json::to_value(&root)?;
        Ok(Self::json_schema(T::schema_name(), schema))
    }

    /// Whether this format declares a structured output shape.
    pub fn is_structured(&self) -> bool {
        !matches!(self, OutputFormat::Text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextConfig {
    pub format: OutputFormat,
}

/// A request to the Responses endpoint. Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Request {
    model: String,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
    stream: bool,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn input(&self) -> &[InputItem] {
        &self.input
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn output_format(&self) -> Option<&OutputFormat> {
        self.text.as_ref().map(|t| &t.format)
    }

    /// Whether the request declared a structured output shape.
    pub fn has_output_shape(&self) -> bool {
        self.output_format().is_some_and(OutputFormat::is_structured)
    }

    pub fn is_stream(&self) -> bool {
        self.stream
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Serialize the request body for the wire with the given transfer mode.
    pub(crate) fn to_body(&self, stream: bool) -> Result<Vec<u8>> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("stream".to_string(), Value::Bool(stream));
        }
        Ok(serde_json::to_vec(&value)?)
    }
}

/// Builder for [`Request`]
#[derive(Debug, Default, Clone)]
pub struct RequestBuilder {
    model: Option<String>,
    input: Vec<InputItem>,
    instructions: Option<String>,
    tools: Vec<ToolDefinition>,
    tool_choice: Option<String>,
    parallel_tool_calls: Option<bool>,
    output_format: Option<OutputFormat>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_output_tokens: Option<u32>,
    previous_response_id: Option<String>,
    metadata: BTreeMap<String, String>,
    stream: bool,
}

impl RequestBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Append a user message
    pub fn user(mut self, text: impl Into<String>) -> Self {
        self.input.push(InputItem::user(text));
        self
    }

    /// Append a message with an explicit role
    pub fn message(mut self, role: MessageRole, text: impl Into<String>) -> Self {
        self.input.push(InputItem::message(role, text));
        self
    }

    pub fn input_item(mut self, item: InputItem) -> Self {
        self.input.push(item);
        self
    }

    /// Append an ordered list of input items, e.g. conversation history
    pub fn input(mut self, items: impl IntoIterator<Item = InputItem>) -> Self {
        self.input.extend(items);
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn tool(mut self, definition: ToolDefinition) -> Self {
        self.tools.push(definition);
        self
    }

    pub fn tools(mut self, definitions: impl IntoIterator<Item = ToolDefinition>) -> Self {
        self.tools.extend(definitions);
        self
    }

    /// `"auto"`, `"none"` or `"required"`
    pub fn tool_choice(mut self, choice: impl Into<String>) -> Self {
        self.tool_choice = Some(choice.into());
        self
    }

    pub fn parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = Some(parallel);
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Declare a strict JSON schema output derived from `T`
    pub fn output_type<T: JsonSchema>(self) -> Result<Self> {
        Ok(self.output_format(OutputFormat::for_type::<T>()?))
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn build(self) -> Result<Request> {
        let model = self
            .model
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| Error::config("model is required"))?;

        if self.input.is_empty() && self.previous_response_id.is_none() {
            return Err(Error::config("request input must not be empty"));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(Error::config(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
        }

        let mut names = std::collections::HashSet::new();
        for tool in &self.tools {
            if !names.insert(tool.name.as_str()) {
                return Err(Error::config(format!("duplicate tool name '{}'", tool.name)));
            }
        }

        Ok(Request {
            model,
            input: self.input,
            instructions: self.instructions,
            tools: self.tools,
            tool_choice: self.tool_choice,
            parallel_tool_calls: self.parallel_tool_calls,
            text: self.output_format.map(|format| TextConfig { format }),
            temperature: self.temperature,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
            previous_response_id: self.previous_response_id,
            metadata: self.metadata,
            stream: self.stream,
        })
    }
}

/// Generation status of a response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    #[default]
    InProgress,
    Completed,
    Failed,
    Incomplete,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// Token usage counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Error object attached to a failed response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

/// One content part of an output message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Value>,
    },
    Refusal {
        refusal: String,
    },
    #[serde(other)]
    Other,
}

/// Text fragment inside a reasoning item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningText {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

/// One item of response output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default)]
        id: String,
        #[serde(default)]
        role: MessageRole,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
        #[serde(default)]
        status: Option<String>,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
    Reasoning {
        #[serde(default)]
        id: String,
        #[serde(default)]
        summary: Vec<ReasoningText>,
        #[serde(default)]
        content: Vec<ReasoningText>,
    },
    /// Hosted tool calls and item types this crate does not model
    #[serde(other)]
    Other,
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Output item id (`fc_...`), when known
    pub item_id: Option<String>,
    /// Call id (`call_...`) the result must be correlated with
    pub call_id: String,
    pub name: String,
    /// Raw argument JSON as produced by the model
    pub arguments: String,
}

/// The response object returned by the Responses endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
}

impl Response {
    /// Concatenated assistant text, or `None` when the response carries no text part.
    pub fn output_text_opt(&self) -> Option<String> {
        let mut text: Option<String> = None;
        for item in &self.output {
            if let OutputItem::Message { content, .. } = item {
                for part in content {
                    if let ContentPart::OutputText { text: piece, .. } = part {
                        text.get_or_insert_with(String::new).push_str(piece);
                    }
                }
            }
        }
        text
    }

    /// Concatenated assistant text; empty when there is none.
    pub fn output_text(&self) -> String {
        self.output_text_opt().unwrap_or_default()
    }

    /// First refusal message, if the model refused.
    pub fn refusal(&self) -> Option<&str> {
        self.output.iter().find_map(|item| match item {
            OutputItem::Message { content, .. } => content.iter().find_map(|part| match part {
                ContentPart::Refusal { refusal } => Some(refusal.as_str()),
                _ => None,
            }),
            _ => None,
        })
    }

    /// Function calls requested by the model, in output order.
    pub fn function_calls(&self) -> Vec<ToolCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                    ..
                } => Some(ToolCall {
                    item_id: id.clone(),
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.status == ResponseStatus::Completed
    }
}

/// A response together with its strictly parsed structured output.
///
/// Only produced for requests that declared an output shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse<T> {
    response: Response,
    parsed: T,
}

impl<T> ParsedResponse<T> {
    pub(crate) fn new(response: Response, parsed: T) -> Self {
        Self { response, parsed }
    }

    pub fn parsed(&self) -> &T {
        &self.parsed
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_parsed(self) -> T {
        self.parsed
    }

    pub fn into_parts(self) -> (Response, T) {
        (self.response, self.parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = Request::builder()
            .model("gpt-4o-mini")
            .instructions("Be brief")
            .user("Hello")
            .temperature(0.5)
            .max_output_tokens(100)
            .metadata("team", "search")
            .build()
            .unwrap();

        assert_eq!(request.model(), "gpt-4o-mini");
        assert_eq!(request.input().len(), 1);
        assert_eq!(request.instructions(), Some("Be brief"));
        assert!(!request.has_output_shape());
        assert!(!request.is_stream());
    }

    #[test]
    fn test_request_builder_missing_model() {
        let err = Request::builder().user("hi").build().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(Request::builder().model("  ").user("hi").build().is_err());
    }

    #[test]
    fn test_request_builder_requires_input() {
        assert!(Request::builder().model("m").build().is_err());
        assert!(
            Request::builder()
                .model("m")
                .previous_response_id("resp_1")
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_request_builder_rejects_bad_temperature() {
        assert!(Request::builder().model("m").user("x").temperature(3.0).build().is_err());
    }

    #[test]
    fn test_request_builder_rejects_duplicate_tools() {
        let def = ToolDefinition::function("add", "Add", json!({"type": "object"}));
        let result = Request::builder()
            .model("m")
            .user("x")
            .tool(def.clone())
            .tool(def)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_request_wire_body() {
        let request = Request::builder()
            .model("m")
            .user("Hello")
            .tool(ToolDefinition::function(
                "get_weather",
                "Get weather",
                json!({"type": "object", "properties": {"location": {"type": "string"}}}),
            ))
            .output_format(OutputFormat::json_schema("person", json!({"type": "object"})))
            .build()
            .unwrap();

        let body: Value = serde_json::from_slice(&request.to_body(true).unwrap()).unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["stream"], true);
        assert_eq!(body["input"][0]["type"], "message");
        assert_eq!(body["input"][0]["role"], "user");
        assert_eq!(body["input"][0]["content"], "Hello");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["name"], "get_weather");
        assert_eq!(body["text"]["format"]["type"], "json_schema");
        assert_eq!(body["text"]["format"]["strict"], true);
        assert!(body.get("temperature").is_none());

        let buffered: Value = serde_json::from_slice(&request.to_body(false).unwrap()).unwrap();
        assert_eq!(buffered["stream"], false);
    }

    #[test]
    fn test_function_call_output_input_item() {
        let item = InputItem::function_call_output("call_1", "{\"temp\":22}");
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "function_call_output");
        assert_eq!(value["call_id"], "call_1");
    }

    #[derive(JsonSchema, Deserialize)]
    #[allow(dead_code)]
    struct Person {
        name: String,
        age: u32,
    }

    #[test]
    fn test_output_format_for_type() {
        let format = OutputFormat::for_type::<Person>().unwrap();
        match &format {
            OutputFormat::JsonSchema { name, schema, strict, .. } => {
                assert_eq!(name, "Person");
                assert!(strict);
                assert!(schema["properties"]["name"].is_object());
            }
            other => panic!("unexpected format {:?}", other),
        }
        assert!(format.is_structured());
        assert!(!OutputFormat::Text.is_structured());
    }

    #[test]
    fn test_response_deserialize_and_accessors() {
        let response: Response = serde_json::from_value(json!({
            "id": "resp_1",
            "object": "response",
            "status": "completed",
            "model": "m",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {"type": "message", "id": "msg_1", "role": "assistant", "content": [
                    {"type": "output_text", "text": "Hello ", "annotations": []},
                    {"type": "output_text", "text": "World"}
                ]},
                {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "get_weather", "arguments": "{\"location\":\"Tokyo\"}"},
                {"type": "web_search_call", "id": "ws_1", "status": "completed"}
            ],
            "usage": {"input_tokens": 5, "output_tokens": 7, "total_tokens": 12}
        }))
        .unwrap();

        assert!(response.is_completed());
        assert_eq!(response.output_text(), "Hello World");
        assert_eq!(response.output.len(), 4);
        assert_eq!(response.output[3], OutputItem::Other);

        let calls = response.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "call_1");
        assert_eq!(calls[0].item_id.as_deref(), Some("fc_1"));
        assert_eq!(response.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn test_response_without_text() {
        let response: Response =
            serde_json::from_value(json!({"id": "resp_2", "status": "completed", "output": []}))
                .unwrap();
        assert_eq!(response.output_text_opt(), None);
        assert_eq!(response.output_text(), "");
    }

    #[test]
    fn test_response_refusal() {
        let response: Response = serde_json::from_value(json!({
            "id": "resp_3",
            "status": "completed",
            "output": [{"type": "message", "id": "m", "role": "assistant", "content": [
                {"type": "refusal", "refusal": "I can't help with that"}
            ]}]
        }))
        .unwrap();
        assert_eq!(response.refusal(), Some("I can't help with that"));
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let response: Response =
            serde_json::from_value(json!({"id": "r", "status": "paused"})).unwrap();
        assert_eq!(response.status, ResponseStatus::Unknown);
    }
}
