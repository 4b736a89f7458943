use std::error::Error;

use agent_orchestra_rs::{
    Agent, AgentError, AgentExt, AgentRunResponse, AgentRunResponseUpdate, AgentThread,
    ChatMessage,
};
use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tracing_subscriber::EnvFilter;

/// Echoes the last user message back, word by word when streaming.
struct EchoAgent {
    id: String,
}

impl EchoAgent {
    fn reply(messages: &[ChatMessage]) -> String {
        let last = messages.last().map(ChatMessage::text).unwrap_or_default();
        format!("Echo: {last}")
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        Some("Echo")
    }

    async fn run(
        &self,
        messages: Vec<ChatMessage>,
        thread: Option<&AgentThread>,
    ) -> Result<AgentRunResponse, AgentError> {
        let reply = ChatMessage::assistant(Self::reply(&messages)).author("Echo");
        if let Some(thread) = thread {
            thread.on_new_messages(&messages);
            thread.on_new_messages(std::slice::from_ref(&reply));
        }
        Ok(AgentRunResponse::from_messages(vec![reply]))
    }

    fn run_stream<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        thread: Option<&'a AgentThread>,
    ) -> BoxStream<'a, Result<AgentRunResponseUpdate, AgentError>> {
        Box::pin(stream! {
            let reply = Self::reply(&messages);
            for (index, word) in reply.split_inclusive(' ').enumerate() {
                if index > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                yield Ok::<_, AgentError>(AgentRunResponseUpdate::text_delta(word));
            }
            if let Some(thread) = thread {
                thread.on_new_messages(&messages);
                thread.on_new_messages(&[ChatMessage::assistant(reply)]);
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let agent = EchoAgent {
        id: "echo-1".to_string(),
    };
    println!("{}", agent.run_text("hello there", None).await?);

    let mut stream = agent.run_stream(vec![ChatMessage::user("streaming works too")], None);
    while let Some(update) = stream.next().await {
        print!("{}", update?);
    }
    println!();
    Ok(())
}
