use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agent::{AgentRunResponse, ChatAgent, RunOptions};
use crate::error::AgentError;
use crate::llm::ChatMessage;
use crate::thread::AgentThread;

/// State of one `run` call as seen by middleware.
///
/// Middleware may rewrite `messages` or `options` before calling
/// [`Next::run`], and inspect or replace `result` afterwards.
#[derive(Debug)]
pub struct AgentRunContext {
    pub agent_name: String,
    pub messages: Vec<ChatMessage>,
    pub thread: Option<AgentThread>,
    pub options: RunOptions,
    pub result: Option<AgentRunResponse>,
    pub metadata: Map<String, Value>,
}

impl AgentRunContext {
    pub fn new(
        agent_name: impl Into<String>,
        messages: Vec<ChatMessage>,
        thread: Option<AgentThread>,
        options: RunOptions,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            messages,
            thread,
            options,
            result: None,
            metadata: Map::new(),
        }
    }
}

#[async_trait]
pub trait AgentMiddleware: Send + Sync {
    /// Wraps the rest of the pipeline. Not calling `next.run` short-circuits
    /// the run; the middleware must then set `context.result` itself.
    async fn process(&self, context: &mut AgentRunContext, next: Next<'_>)
    -> Result<(), AgentError>;
}

/// The remainder of the middleware chain, ending in the agent itself.
pub struct Next<'a> {
    agent: &'a ChatAgent,
    remaining: &'a [Arc<dyn AgentMiddleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(agent: &'a ChatAgent, remaining: &'a [Arc<dyn AgentMiddleware>]) -> Self {
        Self { agent, remaining }
    }

    pub async fn run(self, context: &mut AgentRunContext) -> Result<(), AgentError> {
        match self.remaining.split_first() {
            Some((middleware, rest)) => {
                middleware
                    .process(context, Next::new(self.agent, rest))
                    .await
            }
            None => {
                let response = self
                    .agent
                    .invoke(&context.messages, context.thread.as_ref(), &context.options)
                    .await?;
                context.result = Some(response);
                Ok(())
            }
        }
    }
}

/// Logs the start and end of every run.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl AgentMiddleware for LoggingMiddleware {
    async fn process(
        &self,
        context: &mut AgentRunContext,
        next: Next<'_>,
    ) -> Result<(), AgentError> {
        tracing::info!(
            agent = %context.agent_name,
            messages = context.messages.len(),
            "agent run starting"
        );
        let started = Instant::now();

        let outcome = next.run(context).await;

        match &outcome {
            Ok(()) => tracing::info!(
                agent = %context.agent_name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "agent run finished"
            ),
            Err(err) => tracing::warn!(
                agent = %context.agent_name,
                error = %err,
                "agent run failed"
            ),
        }
        outcome
    }
}
