use std::error::Error;

use agent_orchestra_rs::{CannedChatClient, ChatClient, ChatMessage, ChatOptions};
use futures_util::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client = CannedChatClient::new("It is sunny in Seattle.")
        .with_stream_chunks(["It is ", "sunny ", "in Seattle."]);
    let messages = vec![ChatMessage::user("What's the weather like in Seattle?")];

    let response = client
        .get_response(&messages, &ChatOptions::default())
        .await?;
    println!("response: {}", response.text());

    print!("streamed: ");
    let mut stream = client.get_streaming_response(messages, ChatOptions::default());
    while let Some(update) = stream.next().await {
        print!("{}", update?);
    }
    println!();

    println!("{}", client.describe());
    Ok(())
}
