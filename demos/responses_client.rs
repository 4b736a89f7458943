use std::error::Error;

use agent_orchestra_rs::{Agent, AgentExt, ChatClientAgentExt, OpenAIResponsesClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let model_id =
        std::env::var("OPENAI_RESPONSES_MODEL_ID").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let agent = OpenAIResponsesClient::from_env(model_id)?
        .create_agent()
        .instructions("You answer in one sentence.")
        .build()?;

    let thread = agent.get_new_thread();
    let first = agent.run_text("Name a prime number above 100.", Some(&thread)).await?;
    println!("{first}");
    let second = agent.run_text("And the next one?", Some(&thread)).await?;
    println!("{second}");
    Ok(())
}
