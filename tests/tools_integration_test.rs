//! Integration tests for tool calls raised during a streamed response
//!
//! Tools run as soon as their arguments are final, pass through the
//! configured hooks, and report results or failures through callbacks.

use open_responder::{
    ErrorKind, FunctionTool, HookDecision, Hooks, OutputItem, Request, Responder,
    ResponderOptions, Result, Tool, ToolRegistry, tool,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sse_response(events: &[Value]) -> ResponseTemplate {
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {}\n\n", event));
    }
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// One function call for `name`, arguments streamed in two pieces.
fn function_call_events(name: &str, arguments: &str) -> Vec<Value> {
    let (head, tail) = arguments.split_at(arguments.len() / 2);
    let item = json!({
        "type": "function_call",
        "id": "fc_1",
        "call_id": "call_1",
        "name": name,
        "arguments": arguments,
        "status": "completed"
    });
    vec![
        json!({
            "type": "response.created",
            "sequence_number": 0,
            "response": {"id": "resp_t1", "status": "in_progress"}
        }),
        json!({
            "type": "response.output_item.added",
            "sequence_number": 1,
            "output_index": 0,
            "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": name, "arguments": ""}
        }),
        json!({
            "type": "response.function_call_arguments.delta",
            "sequence_number": 2,
            "item_id": "fc_1",
            "output_index": 0,
            "delta": head
        }),
        json!({
            "type": "response.function_call_arguments.delta",
            "sequence_number": 3,
            "item_id": "fc_1",
            "output_index": 0,
            "delta": tail
        }),
        json!({
            "type": "response.function_call_arguments.done",
            "sequence_number": 4,
            "item_id": "fc_1",
            "output_index": 0,
            "arguments": arguments
        }),
        json!({
            "type": "response.output_item.done",
            "sequence_number": 5,
            "output_index": 0,
            "item": item
        }),
        json!({
            "type": "response.completed",
            "sequence_number": 6,
            "response": {"id": "resp_t1", "status": "completed", "output": [item]}
        }),
    ]
}

async fn server_with(events: Vec<Value>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(sse_response(&events))
        .mount(&server)
        .await;
    server
}

fn weather_tool(calls: Arc<Mutex<Vec<String>>>) -> Tool {
    tool("get_weather", "Get the current weather for a location")
        .param("location", "string")
        .build(move |args| {
            let calls = calls.clone();
            async move {
                let location = args["location"].as_str().unwrap_or_default().to_string();
                calls.lock().unwrap().push(location.clone());
                Ok(json!({"location": location, "temperature": 22, "unit": "celsius"}))
            }
        })
}

fn request_with(registry: &ToolRegistry) -> Request {
    Request::builder()
        .model("test-model")
        .user("What's the weather in Tokyo?")
        .tools(registry.definitions())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_tool_call_runs_mid_stream() {
    init_logging();
    let server = server_with(function_call_events("get_weather", r#"{"location":"Tokyo"}"#)).await;
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = ToolRegistry::new().add(weather_tool(calls.clone()));
    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url(server.uri())
            .build()
            .unwrap(),
    )
    .unwrap();

    let announced = Arc::new(Mutex::new(Vec::new()));
    let results = Arc::new(Mutex::new(Vec::new()));
    let (a, r) = (announced.clone(), results.clone());

    let outcome = responder
        .stream(request_with(&registry))
        .with_tool_registry(registry)
        .on_tool_call(move |call| a.lock().unwrap().push(call.arguments.clone()))
        .on_tool_result(move |result| r.lock().unwrap().push(result.output.clone()))
        .outcome()
        .await
        .unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["Tokyo"]);
    assert_eq!(*announced.lock().unwrap(), vec![r#"{"location":"Tokyo"}"#]);
    assert_eq!(results.lock().unwrap()[0]["temperature"], 22);
    assert_eq!(outcome.response.function_calls().len(), 1);

    let items = outcome.tool_output_items();
    assert_eq!(items.len(), 1);
    match &items[0] {
        OutputItem::FunctionCallOutput { call_id, output } => {
            assert_eq!(call_id, "call_1");
            let output: Value = serde_json::from_str(output).unwrap();
            assert_eq!(output["location"], "Tokyo");
        }
        other => panic!("unexpected item {:?}", other),
    }

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["tools"][0]["name"], "get_weather");
    assert_eq!(body["tools"][0]["type"], "function");
}

#[tokio::test]
async fn test_unknown_tool_reports_error_and_stream_completes() {
    init_logging();
    let server = server_with(function_call_events("get_stock_price", r#"{"symbol":"ACME"}"#)).await;
    let registry = ToolRegistry::new().add(weather_tool(Arc::new(Mutex::new(Vec::new()))));
    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url(server.uri())
            .build()
            .unwrap(),
    )
    .unwrap();

    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = failures.clone();

    let outcome = responder
        .stream(request_with(&registry))
        .with_tool_registry(registry)
        .on_tool_error(move |call, err| {
            f.lock()
                .unwrap()
                .push((call.name.clone(), err.kind(), err.tool_name().map(str::to_string)))
        })
        .outcome()
        .await
        .unwrap();

    assert!(outcome.tool_outputs.is_empty());
    assert_eq!(
        *failures.lock().unwrap(),
        vec![(
            "get_stock_price".to_string(),
            ErrorKind::ToolExecutionFailed,
            Some("get_stock_price".to_string())
        )]
    );
}

#[tokio::test]
async fn test_pre_tool_hook_blocks_and_post_hook_rewrites() {
    init_logging();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = ToolRegistry::new().add(weather_tool(calls.clone()));

    // Blocked call never reaches the handler
    let server = server_with(function_call_events("get_weather", r#"{"location":"Atlantis"}"#)).await;
    let blocking = Hooks::new().add_pre_tool_use(|event| async move {
        if event.tool_input["location"] == "Atlantis" {
            Some(HookDecision::block("location is fictional"))
        } else {
            None
        }
    });
    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url(server.uri())
            .hooks(blocking)
            .build()
            .unwrap(),
    )
    .unwrap();

    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = failures.clone();
    responder
        .stream(request_with(&registry))
        .with_tool_registry(registry.clone())
        .on_tool_error(move |_, err| f.lock().unwrap().push(err.message().to_string()))
        .outcome()
        .await
        .unwrap();

    assert!(calls.lock().unwrap().is_empty());
    assert!(failures.lock().unwrap()[0].contains("location is fictional"));

    // Post hook replaces the output the caller sees
    let server = server_with(function_call_events("get_weather", r#"{"location":"Tokyo"}"#)).await;
    let rewriting = Hooks::new().add_post_tool_use(|event| async move {
        let mut output = event.tool_result.clone();
        output["source"] = json!("hook");
        Some(HookDecision::modify_output(output, "tagged"))
    });
    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url(server.uri())
            .hooks(rewriting)
            .build()
            .unwrap(),
    )
    .unwrap();

    let outcome = responder
        .stream(request_with(&registry))
        .with_tool_registry(registry)
        .outcome()
        .await
        .unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["Tokyo"]);
    assert_eq!(outcome.tool_outputs[0].output["source"], "hook");
    assert_eq!(outcome.tool_outputs[0].output["location"], "Tokyo");
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AddInput {
    a: i64,
    b: i64,
}

struct Adder;

#[async_trait::async_trait]
impl FunctionTool for Adder {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add two integers"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let input: AddInput = serde_json::from_value(arguments)?;
        Ok(json!(input.a + input.b))
    }
}

#[tokio::test]
async fn test_typed_and_trait_tools() {
    init_logging();
    let typed = Tool::typed("add_typed", "Add two integers", |input: AddInput| async move {
        Ok(input.a + input.b)
    });
    let registry = ToolRegistry::new()
        .add(typed)
        .add(Tool::from_function_tool(Adder));

    let server = server_with(function_call_events("add", r#"{"a":2,"b":40}"#)).await;
    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url(server.uri())
            .build()
            .unwrap(),
    )
    .unwrap();

    let outcome = responder
        .stream(request_with(&registry))
        .with_tool_registry(registry.clone())
        .outcome()
        .await
        .unwrap();
    assert_eq!(outcome.tool_outputs[0].output, json!(42));
    assert_eq!(outcome.tool_outputs[0].output_text(), "42");

    let definitions = registry.definitions();
    let typed_schema = &definitions
        .iter()
        .find(|d| d.name == "add_typed")
        .unwrap()
        .parameters;
    assert_eq!(typed_schema["properties"]["a"]["type"], "integer");
    assert!(typed_schema.get("$schema").is_none());
}

#[tokio::test]
async fn test_panicking_tool_is_reported_and_stream_completes() {
    init_logging();
    let mut events = function_call_events("explode", "{}");
    // Replace the final completed event with trailing text before completing
    events.pop();
    events.push(json!({
        "type": "response.output_text.delta",
        "sequence_number": 6,
        "item_id": "msg_1",
        "output_index": 1,
        "content_index": 0,
        "delta": "after"
    }));
    events.push(json!({
        "type": "response.output_text.done",
        "sequence_number": 7,
        "item_id": "msg_1",
        "output_index": 1,
        "content_index": 0,
        "text": "after"
    }));
    events.push(json!({
        "type": "response.completed",
        "sequence_number": 8,
        "response": {"id": "resp_t1", "status": "completed", "output": []}
    }));
    let server = server_with(events).await;

    let registry = ToolRegistry::new().add(tool("explode", "Always panics").build(|_| async {
        let empty: Vec<Value> = Vec::new();
        Ok(empty[0].clone())
    }));
    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url(server.uri())
            .build()
            .unwrap(),
    )
    .unwrap();

    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = failures.clone();
    let outcome = responder
        .stream(request_with(&registry))
        .with_tool_registry(registry)
        .on_tool_error(move |call, err| f.lock().unwrap().push((call.name.clone(), err.kind())))
        .outcome()
        .await
        .unwrap();

    assert_eq!(outcome.text, "after");
    assert!(outcome.tool_outputs.is_empty());
    assert_eq!(
        *failures.lock().unwrap(),
        vec![("explode".to_string(), ErrorKind::ToolExecutionFailed)]
    );
}
