use std::error::Error;

use agent_orchestra_rs::{Agent, AgentExt, AgentThread, CannedChatClient, ChatClientAgentExt};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client = CannedChatClient::new("I remember.");
    let agent = client.create_agent().name("Memory").build()?;

    let thread = agent.get_new_thread();
    agent.run_text("My name is Sam.", Some(&thread)).await?;
    agent.run_text("What is my name?", Some(&thread)).await?;
    println!("local thread holds {} messages", thread.messages().len());

    // A service-managed thread stores nothing locally. Each run sends the
    // thread's conversation id and adopts the response id it gets back.
    let remote = AgentThread::with_service_thread_id("thread_abc123");
    agent.run_text("Hello", Some(&remote)).await?;
    println!(
        "service thread now {:?}, {} local messages",
        remote.service_thread_id(),
        remote.messages().len()
    );
    Ok(())
}
