//! # Function tools
//!
//! Tools are application functions the model may call while it generates. A
//! [`Tool`] bundles a name, a description, a JSON schema for its arguments and
//! an async handler. Tools are collected in a [`ToolRegistry`]; the registry's
//! [`definitions`](ToolRegistry::definitions) go into the request and a
//! [`ToolExecutor`] runs the calls the model makes.
//!
//! ## Tool lifecycle
//!
//! ```text
//! 1. Definition:   Tool::new / tool(..).param(..).build(..) / Tool::typed / FunctionTool
//! 2. Registration: ToolRegistry::new().add(tool)
//! 3. Advertising:  Request::builder().tools(registry.definitions())
//! 4. Invocation:   the stream reports a finished function call
//! 5. Execution:    ToolExecutor looks the tool up, runs hooks and the handler
//! 6. Feedback:     ToolOutput::to_input_item() goes into the follow-up request
//! ```
//!
//! ## Schema notation
//!
//! Schemas may be written in a compact notation and are normalised to JSON
//! Schema:
//!
//! - **Simple notation**: `{"location": "string", "units": "string"}`
//! - **Typed properties**: `{"limit": {"type": "integer", "optional": true}}`
//! - **Full JSON Schema**: passed through unchanged
//!
//! ## Examples
//!
//! ```rust,no_run
//! use open_responder::{tool, ToolRegistry};
//! use serde_json::json;
//!
//! let weather = tool("get_weather", "Get current weather for a location")
//!     .param("location", "string")
//!     .build(|args| async move {
//!         let location = args["location"].as_str().unwrap_or("Unknown");
//!         Ok(json!({"location": location, "temperature": 22}))
//!     });
//!
//! let registry = ToolRegistry::new().add(weather);
//! assert!(registry.contains("get_weather"));
//! ```

use crate::hooks::{Hooks, PostToolUseEvent, PreToolUseEvent};
use crate::types::{InputItem, OutputItem, ToolCall, ToolDefinition};
use crate::{Error, ErrorKind, Result};
use async_trait::async_trait;
use futures::FutureExt;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

/// Type-erased async tool handler.
///
/// ```text
/// Arc<                                      // shared between registry clones
///   dyn Fn(Value)                           // JSON arguments in
///     -> Pin<Box<                           // boxed so handlers of different
///       dyn Future<Output = Result<Value>>  //   concrete types share one type
///         + Send>>
///     + Send + Sync>
/// ```
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// A callable function tool
///
/// Cloning is cheap: the handler is reference counted.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    strict: Option<bool>,
    handler: ToolHandler,
}

impl Tool {
    /// Create a tool from a JSON-in, JSON-out async handler.
    ///
    /// `input_schema` may use the compact notation described in the module docs.
    ///
    /// ```rust,no_run
    /// use open_responder::Tool;
    /// use serde_json::json;
    ///
    /// let search = Tool::new(
    ///     "search",
    ///     "Search the knowledge base",
    ///     json!({
    ///         "query": {"type": "string", "description": "Search query"},
    ///         "max_results": {"type": "integer", "optional": true}
    ///     }),
    ///     |args| async move { Ok(json!({"results": [], "query": args["query"]})) },
    /// );
    /// ```
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: convert_schema(input_schema),
            strict: None,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Create a tool whose arguments are decoded into `I` before the handler runs.
    ///
    /// The argument schema is derived from `I`. Arguments that do not match fail
    /// the call with [`ErrorKind::ToolExecutionFailed`].
    ///
    /// ```rust,no_run
    /// use open_responder::Tool;
    /// use schemars::JsonSchema;
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Deserialize, JsonSchema)]
    /// struct WeatherArgs {
    ///     location: String,
    /// }
    ///
    /// #[derive(Serialize)]
    /// struct Weather {
    ///     temperature: f64,
    /// }
    ///
    /// let weather = Tool::typed("get_weather", "Current weather", |args: WeatherArgs| async move {
    ///     let _ = args.location;
    ///     Ok(Weather { temperature: 21.5 })
    /// });
    /// ```
    pub fn typed<I, O, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let name = name.into();
        let handler = Arc::new(handler);
        let tool_name = name.clone();

        Tool::new(name, description, schema_for_input::<I>(), move |args| {
            let handler = Arc::clone(&handler);
            let tool_name = tool_name.clone();
            async move {
                let input: I = serde_json::from_value(args).map_err(|e| {
                    Error::tool(format!("Invalid arguments for tool '{}': {}", tool_name, e))
                        .with_tool_name(tool_name.as_str())
                })?;
                let output = handler(input).await?;
                Ok(serde_json::to_value(output)?)
            }
        })
    }

    /// Wrap a [`FunctionTool`] implementation.
    pub fn from_function_tool<T: FunctionTool + 'static>(tool: T) -> Self {
        let name = tool.name().to_string();
        let description = tool.description().to_string();
        let schema = tool.parameters();
        let strict = tool.strict();
        let tool = Arc::new(tool);

        let mut wrapped = Tool::new(name, description, schema, move |args| {
            let tool = Arc::clone(&tool);
            async move { tool.call(args).await }
        });
        wrapped.strict = strict;
        wrapped
    }

    /// Ask the provider to enforce the schema strictly.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Run the handler
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments).await
    }

    /// The definition advertised in requests
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            strict: self.strict,
            ..ToolDefinition::function(&self.name, &self.description, self.input_schema.clone())
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("strict", &self.strict)
            .finish()
    }
}

/// Trait-based alternative to closure tools, for tools that carry state
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use open_responder::{FunctionTool, Result, Tool};
/// use serde_json::{json, Value};
///
/// struct Clock;
///
/// #[async_trait]
/// impl FunctionTool for Clock {
///     fn name(&self) -> &str { "now" }
///     fn description(&self) -> &str { "Current UNIX time" }
///     fn parameters(&self) -> Value { json!({}) }
///     async fn call(&self, _arguments: Value) -> Result<Value> {
///         Ok(json!({"unix": 0}))
///     }
/// }
///
/// let tool = Tool::from_function_tool(Clock);
/// ```
#[async_trait]
pub trait FunctionTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Argument schema, in any notation accepted by [`Tool::new`]
    fn parameters(&self) -> Value;

    fn strict(&self) -> Option<bool> {
        None
    }

    async fn call(&self, arguments: Value) -> Result<Value>;
}

fn schema_for_input<I: JsonSchema>() -> Value {
    let root = schemars::schema_for!(I);
    match serde_json::to_value(&root) {
        Ok(Value::Object(mut schema)) => {
            schema.remove("$schema");
            schema.remove("title");
            if !schema.contains_key("properties") {
                schema.insert("properties".to_string(), Value::Object(Default::default()));
            }
            Value::Object(schema)
        }
        _ => serde_json::json!({"type": "object", "properties": {}}),
    }
}

/// Normalise the compact schema notation to JSON Schema.
fn convert_schema(schema: Value) -> Value {
    let Value::Object(obj) = schema else {
        return serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        });
    };

    if obj.contains_key("type") && obj.contains_key("properties") {
        return Value::Object(obj);
    }

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        match param_type {
            Value::String(type_str) => {
                properties.insert(param_name.clone(), type_to_json_schema(&type_str));
                required.push(param_name);
            }
            Value::Object(mut prop) => {
                // `optional` and per-property `required` are notation, not JSON Schema.
                let is_optional = prop
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let is_required = prop.remove("required").and_then(|v| v.as_bool());
                let has_default = prop.contains_key("default");

                properties.insert(param_name.clone(), Value::Object(prop));

                match is_required {
                    Some(true) => required.push(param_name),
                    Some(false) => {}
                    None if !is_optional && !has_default => required.push(param_name),
                    None => {}
                }
            }
            _ => {}
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        // unknown type names fall back to string
        _ => "string",
    };

    serde_json::json!({ "type": json_type })
}

/// Incremental tool construction, see [`tool`]
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
    strict: Option<bool>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
            strict: None,
        }
    }

    /// Replace the whole schema
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add one required parameter with a simple type name
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        if let Value::Object(obj) = &mut self.schema {
            obj.insert(name.to_string(), Value::String(type_str.to_string()));
        }
        self
    }

    /// Add an optional parameter
    pub fn optional_param(mut self, name: &str, type_str: &str, description: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        if let Value::Object(obj) = &mut self.schema {
            obj.insert(
                name.to_string(),
                serde_json::json!({
                    "type": type_to_json_schema(type_str)["type"],
                    "description": description,
                    "optional": true
                }),
            );
        }
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut tool = Tool::new(self.name, self.description, self.schema, handler);
        tool.strict = self.strict;
        tool
    }
}

/// Start building a tool.
///
/// ```rust,no_run
/// use open_responder::{tool, Error};
/// use serde_json::json;
///
/// let divide = tool("divide", "Divide two numbers")
///     .param("a", "number")
///     .param("b", "number")
///     .build(|args| async move {
///         let a = args["a"].as_f64().ok_or_else(|| Error::tool("Invalid 'a' parameter"))?;
///         let b = args["b"].as_f64().ok_or_else(|| Error::tool("Invalid 'b' parameter"))?;
///         if b == 0.0 {
///             return Err(Error::tool("Division by zero"));
///         }
///         Ok(json!({"result": a / b}))
///     });
/// ```
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Tools available to the model, by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool with the same name
    pub fn add(mut self, tool: Tool) -> Self {
        self.register(tool);
        self
    }

    pub fn register(&mut self, tool: Tool) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            log::warn!("Replacing already registered tool '{}'", tool.name());
            *existing = Arc::new(tool);
        } else {
            self.tools.push(Arc::new(tool));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Definitions for every registered tool, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Result of one executed tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub call_id: String,
    pub name: String,
    pub output: Value,
}

impl ToolOutput {
    /// The output as sent on the wire. Strings are sent verbatim, everything
    /// else as JSON.
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Feed this result back to the model in a follow-up request
    pub fn to_input_item(&self) -> InputItem {
        InputItem::function_call_output(&self.call_id, self.output_text())
    }

    pub fn to_output_item(&self) -> OutputItem {
        OutputItem::FunctionCallOutput {
            call_id: self.call_id.clone(),
            output: self.output_text(),
        }
    }
}

/// Decode raw argument JSON. Empty arguments mean an empty object.
pub fn parse_arguments(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
        .map_err(|e| Error::tool(format!("Tool arguments are not valid JSON: {}", e)).with_source(e))
}

/// Execute one tool call against `registry`.
///
/// Unknown tools, undecodable arguments, blocking hooks and handler errors all
/// fail with [`ErrorKind::ToolExecutionFailed`] naming the tool.
pub async fn execute_tool_call(
    registry: &ToolRegistry,
    hooks: &Hooks,
    call: &ToolCall,
) -> Result<ToolOutput> {
    let name = call.name.as_str();
    let tool = registry.get(name).ok_or_else(|| {
        Error::tool(format!("Tool '{}' is not registered", name)).with_tool_name(name)
    })?;

    let mut input = parse_arguments(&call.arguments).map_err(|e| e.with_tool_name(name))?;

    if let Some(decision) = hooks
        .execute_pre_tool_use(PreToolUseEvent::new(name, input.clone(), &call.call_id))
        .await
    {
        if !decision.continue_execution() {
            return Err(Error::tool(format!(
                "Tool '{}' was blocked: {}",
                name,
                decision.reason().unwrap_or("blocked by hook")
            ))
            .with_tool_name(name));
        }
        if let Some(modified) = decision.modified_input() {
            input = modified.clone();
        }
    }

    log::debug!("Executing tool '{}' (call {})", name, call.call_id);

    let result = AssertUnwindSafe(tool.execute(input.clone()))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(Error::tool(panic_message(panic.as_ref()))));

    let mut output = result.map_err(|e| {
        if e.kind() == ErrorKind::ToolExecutionFailed {
            e.with_tool_name(name)
        } else {
            Error::tool(format!("Tool '{}' failed: {}", name, e))
                .with_tool_name(name)
                .with_source(e)
        }
    })?;

    if let Some(decision) = hooks
        .execute_post_tool_use(PostToolUseEvent::new(
            name,
            input,
            &call.call_id,
            output.clone(),
        ))
        .await
    {
        if let Some(modified) = decision.modified_output() {
            output = modified.clone();
        }
    }

    Ok(ToolOutput {
        call_id: call.call_id.clone(),
        name: name.to_string(),
        output,
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Tool handler panicked: {}", detail)
}

/// Runs tool calls against a registry, with hooks
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    hooks: Hooks,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, hooks: Hooks) -> Self {
        Self { registry, hooks }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one call, see [`execute_tool_call`].
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutput> {
        execute_tool_call(&self.registry, &self.hooks, call).await
    }

    /// Execute calls in order, e.g. those of a buffered response.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<Result<ToolOutput>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }
}
