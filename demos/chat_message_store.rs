use std::error::Error;

use agent_orchestra_rs::{
    AgentExt, AgentThread, CannedChatClient, ChatClientAgentExt, ChatMessageStore,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let agent = CannedChatClient::new("Noted.")
        .create_agent()
        .name("Notes")
        .build()?;

    // Keep only the four most recent messages.
    let thread = AgentThread::with_message_store(ChatMessageStore::new().max_messages(4));
    for note in ["buy milk", "call Ana", "book flights"] {
        agent.run_text(note, Some(&thread)).await?;
    }

    for message in thread.messages() {
        println!("{}: {}", message.role.as_str(), message.text());
    }

    let saved = thread.serialize()?;
    println!("{}", serde_json::to_string_pretty(&saved)?);
    let restored = AgentThread::deserialize(saved)?;
    println!("restored {} messages", restored.messages().len());
    Ok(())
}
