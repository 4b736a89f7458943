use std::error::Error;

use agent_orchestra_rs::{
    AgentExt, AgentRunResponseUpdate, AgentToolOptions, CannedChatClient, ChatClientAgentExt,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let translator = CannedChatClient::new("Bonjour le monde")
        .with_stream_chunks(["Bonjour ", "le ", "monde"])
        .create_agent()
        .name("French translator")
        .description("Translates text to French.")
        .build()?;

    let tool = translator.as_tool(
        AgentToolOptions::default()
            .arg_name("text")
            .arg_description("Text to translate")
            .stream_callback(|update: &AgentRunResponseUpdate| {
                println!("  partial: {update}");
            }),
    )?;

    println!("tool {} takes {}", tool.name(), tool.json_schema());
    let result = tool.invoke(json!({"text": "Hello world"})).await?;
    println!("result: {result}");
    Ok(())
}
