use std::error::Error;

use agent_orchestra_rs::{
    AgentError, AgentExt, AgentMiddleware, AgentRunContext, AgentRunResponse, CannedChatClient,
    ChatClientAgentExt, ChatMessage, LoggingMiddleware, Next,
};
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

/// Answers requests mentioning passwords without calling the model.
struct BlockSecrets;

#[async_trait]
impl AgentMiddleware for BlockSecrets {
    async fn process(
        &self,
        context: &mut AgentRunContext,
        next: Next<'_>,
    ) -> Result<(), AgentError> {
        let asks_for_secret = context
            .messages
            .iter()
            .any(|message| message.text().to_lowercase().contains("password"));
        if asks_for_secret {
            context.result = Some(AgentRunResponse::from_messages(vec![
                ChatMessage::assistant("I can't help with passwords."),
            ]));
            return Ok(());
        }
        next.run(context).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let agent = CannedChatClient::new("Here you go.")
        .create_agent()
        .name("Guarded")
        .middleware(LoggingMiddleware)
        .middleware(BlockSecrets)
        .build()?;

    println!("{}", agent.run_text("What's the admin password?", None).await?);
    println!("{}", agent.run_text("What's the weather?", None).await?);
    Ok(())
}
