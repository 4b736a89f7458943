use std::error::Error;
use std::sync::Arc;

use agent_orchestra_rs::{
    Executor, Message, TypeKey, WorkflowBuilder, WorkflowContext, WorkflowError, WorkflowEvent,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tracing_subscriber::EnvFilter;

struct UpperCase;

#[async_trait]
impl Executor for UpperCase {
    fn id(&self) -> &str {
        "upper_case"
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<String>()]
    }

    fn output_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<String>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let text = message.require::<String>(self.id())?;
        ctx.send_message(text.to_uppercase());
        Ok(())
    }
}

struct WordCount;

#[async_trait]
impl Executor for WordCount {
    fn id(&self) -> &str {
        "word_count"
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<String>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let text = message.require::<String>(self.id())?;
        let words = text.split_whitespace().count();
        ctx.shared_state().set("words", &words)?;
        ctx.add_custom_event("counted", json!({ "words": words }));
        ctx.yield_output(format!("{text} ({words} words)"));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let upper: Arc<dyn Executor> = Arc::new(UpperCase);
    let count: Arc<dyn Executor> = Arc::new(WordCount);
    let workflow = WorkflowBuilder::new()
        .name("shout")
        .add_edge(&upper, &count)
        .set_start_executor(&upper)
        .build()?;

    let mut events = workflow.run_stream("hello workflow world".to_string());
    while let Some(event) = events.next().await {
        let event = event?;
        if let WorkflowEvent::Output { data, .. } = &event {
            println!("output: {:?}", data.downcast_ref::<String>());
        } else {
            println!("event: {event}");
        }
    }
    println!(
        "shared state words = {:?}",
        workflow.shared_state().get::<usize>("words")?
    );
    Ok(())
}
