//! Weather with Tools Example
//!
//! Tools run mid-stream as soon as the model finishes their arguments. Their
//! results are folded into the next turn until the model answers in text.

use open_responder::{
    HookDecision, Hooks, Provider, Request, Responder, ResponderOptions, ToolOutput, ToolRegistry,
    get_base_url, tool,
};
use serde_json::json;
use std::io::Write;

const MAX_TURNS: usize = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let weather = tool("get_weather", "Get the current weather for a city")
        .param("location", "string")
        .optional_param("unit", "string", "celsius or fahrenheit")
        .build(|args| async move {
            let location = args["location"].as_str().unwrap_or("unknown");
            let unit = args["unit"].as_str().unwrap_or("celsius");
            // Canned data; a real tool would call a weather service
            let temperature = match location {
                "Tokyo" => 22,
                "Paris" => 17,
                _ => 20,
            };
            Ok(json!({"location": location, "temperature": temperature, "unit": unit}))
        });
    let registry = ToolRegistry::new().add(weather);

    // Refuse lookups for places that do not exist
    let hooks = Hooks::new().add_pre_tool_use(|event| async move {
        if event.tool_input["location"] == "Atlantis" {
            return Some(HookDecision::block("Atlantis is not a real city"));
        }
        None
    });

    let responder = Responder::new(
        ResponderOptions::builder()
            .base_url(get_base_url(Some(Provider::LmStudio), None))
            .hooks(hooks)
            .build()?,
    )?;

    let mut request = Request::builder()
        .model("qwen2.5-7b-instruct")
        .instructions("Use the get_weather tool to answer weather questions.")
        .user("What's the weather like in Tokyo and Paris right now?")
        .tools(registry.definitions())
        .build()?;

    for turn in 1..=MAX_TURNS {
        println!("--- turn {} ---", turn);

        let outcome = responder
            .stream(request.clone())
            .with_tool_registry(registry.clone())
            .on_text_delta(|delta| {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            })
            .on_tool_call(|call| println!("Tool called: {} {}", call.name, call.arguments))
            .on_tool_result(|result| println!("Tool result: {}", result.output_text()))
            .on_tool_error(|call, err| println!("Tool {} failed: {}", call.name, err))
            .outcome()
            .await?;

        if outcome.tool_outputs.is_empty() {
            println!("\n\nDone after {} turn(s)", turn);
            return Ok(());
        }

        // Feed the tool results back, chained to the previous response
        request = Request::builder()
            .model(request.model())
            .previous_response_id(outcome.response.id.clone())
            .input(outcome.tool_outputs.iter().map(ToolOutput::to_input_item))
            .tools(registry.definitions())
            .build()?;
    }

    println!("\nStopped after {} turns", MAX_TURNS);
    Ok(())
}
