//! Simple streaming example
//!
//! Streams a short answer from a local server and prints text as it arrives.
//! Set OPEN_RESPONDER_BASE_URL / OPEN_RESPONDER_MODEL to point elsewhere.

use open_responder::{
    Provider, Request, Responder, ResponderOptions, StreamingEvent, get_base_url, get_model,
};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Configure the responder
    let options = ResponderOptions::builder()
        .base_url(get_base_url(Some(Provider::LmStudio), None))
        .max_retries(2)
        .build()?;
    let responder = Responder::new(options)?;

    let model = get_model(Some("qwen2.5-7b-instruct"), true).unwrap_or_default();
    let request = Request::builder()
        .model(model)
        .instructions("You are a helpful assistant. Be brief.")
        .user("What's the capital of France?")
        .temperature(0.7)
        .max_output_tokens(200)
        .build()?;

    println!("Sending request to model...\n");
    print!("Response: ");

    let outcome = responder
        .stream(request)
        .on_text_delta(|delta| {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        })
        .on_event(|event| {
            if let StreamingEvent::Unknown(unknown) = event {
                eprintln!("\n(ignored event {})", unknown.event_type);
            }
        })
        .outcome()
        .await?;

    println!("\n");
    if let Some(usage) = outcome.response.usage {
        println!(
            "Tokens: {} in, {} out",
            usage.input_tokens, usage.output_tokens
        );
    }
    println!("Response {} finished with status {:?}", outcome.response.id, outcome.response.status);

    Ok(())
}
