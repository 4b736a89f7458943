use std::error::Error;

use agent_orchestra_rs::tools::math;
use agent_orchestra_rs::{AgentExt, ChatClientAgentExt, OpenAIChatClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let model_id =
        std::env::var("OPENAI_CHAT_MODEL_ID").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let agent = OpenAIChatClient::from_env(model_id)?
        .create_agent()
        .name("Calculator")
        .instructions("Use the tools for arithmetic.")
        .tools(math::all_tools()?)
        .build()?;

    let response = agent
        .run_text("What is the square of 12, plus 7?", None)
        .await?;
    for message in &response.messages {
        println!("{:?}: {:?}", message.role, message.contents);
    }
    println!("{response}");
    Ok(())
}
