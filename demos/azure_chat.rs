use std::error::Error;

use agent_orchestra_rs::{
    AgentExt, AzureOpenAISettings, ChatClientAgentExt, OpenAIChatClient,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Needs AZURE_OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT and
    // AZURE_OPENAI_CHAT_DEPLOYMENT_NAME.
    let settings = AzureOpenAISettings::from_env_file(".env")?;
    let agent = OpenAIChatClient::azure(settings)?
        .create_agent()
        .name("Joker")
        .instructions("You are good at telling jokes.")
        .build()?;

    let response = agent.run_text("Tell me a joke about a pirate.", None).await?;
    println!("{response}");
    Ok(())
}
