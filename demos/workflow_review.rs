use std::error::Error;
use std::sync::Arc;

use agent_orchestra_rs::samples::{SecondApprover, Worker};
use agent_orchestra_rs::{
    Agent, ChatClient, ChatMessage, Executor, OpenAIChatClient, WorkflowBuilder,
};
use futures_util::StreamExt;
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
    let client: Arc<dyn ChatClient> = Arc::new(OpenAIChatClient::from_env(model_id)?);

    let worker: Arc<dyn Executor> = Arc::new(Worker::new("worker", client));
    let reviewer: Arc<dyn Executor> = Arc::new(SecondApprover::new("reviewer"));
    let workflow = WorkflowBuilder::new()
        .name("reviewed writer")
        .add_edge(&worker, &reviewer)
        .add_edge(&reviewer, &worker)
        .set_start_executor(&worker)
        .build()?;

    let agent = workflow.as_agent();
    let mut stream = agent.run_stream(
        vec![ChatMessage::user("Write a two-line poem about rivers.")],
        None,
    );
    while let Some(update) = stream.next().await {
        println!("{}", update?);
    }
    Ok(())
}
