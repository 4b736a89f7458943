use std::error::Error;
use std::io::Write;

use agent_orchestra_rs::{ChatClient, ChatMessage, ChatOptions, OpenAIChatClient, OpenAISettings};
use futures_util::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Needs OPENAI_API_KEY and OPENAI_CHAT_MODEL_ID, optionally from a .env file.
    let settings = OpenAISettings::from_env_file(".env")?;
    let client = OpenAIChatClient::from_settings(settings)?;

    let messages = vec![ChatMessage::user("Tell me a joke about a pirate.")];
    let response = client
        .get_response(&messages, &ChatOptions::default())
        .await?;
    println!("{}", response.text());

    let mut stream = client.get_streaming_response(
        vec![ChatMessage::user("Now one about a parrot.")],
        ChatOptions::default(),
    );
    while let Some(update) = stream.next().await {
        print!("{}", update?);
        std::io::stdout().flush()?;
    }
    println!();
    Ok(())
}
