use std::error::Error;

use agent_orchestra_rs::{CannedChatClient, ChatClientAgentExt, ChatMessage};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, JsonSchema)]
struct Language {
    name: String,
    year_created: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let agent = CannedChatClient::new(r#"{"name": "Rust", "year_created": 2015}"#)
        .create_agent()
        .instructions("Answer with JSON only.")
        .build()?;

    let language = agent
        .run_typed::<Language>(
            vec![ChatMessage::user("Which systems language reached 1.0 in 2015?")],
            None,
        )
        .await?;
    println!("parsed: {language:?}");
    Ok(())
}
