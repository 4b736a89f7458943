use std::collections::HashSet;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use num_bigint::BigInt;

use crate::agent::{Agent, AgentRunResponse, AgentRunResponseUpdate};
use crate::error::{AgentError, WorkflowError};
use crate::llm::{ChatMessage, Content, Role};
use crate::thread::AgentThread;
use crate::workflow::{Executor, Message, TypeKey, Workflow, WorkflowContext, WorkflowEvent};

/// Runs an [`Agent`] as a workflow node.
///
/// Accepts `Vec<ChatMessage>`, `ChatMessage` or `String` and sends the
/// response messages downstream as `Vec<ChatMessage>`. When streaming is
/// enabled each update is also recorded as an `AgentRunUpdate` event.
pub struct AgentExecutor {
    id: String,
    agent: Arc<dyn Agent>,
    thread: Option<AgentThread>,
    streaming: bool,
}

impl AgentExecutor {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            id: agent.display_name().to_string(),
            agent,
            thread: None,
            streaming: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Keeps the conversation across invocations of this executor.
    pub fn with_thread(mut self, thread: AgentThread) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    fn input_messages(&self, message: &Message) -> Result<Vec<ChatMessage>, WorkflowError> {
        if let Some(messages) = message.downcast_ref::<Vec<ChatMessage>>() {
            return Ok(messages.clone());
        }
        if let Some(single) = message.downcast_ref::<ChatMessage>() {
            return Ok(vec![single.clone()]);
        }
        let text = message.require::<String>(&self.id)?;
        Ok(vec![ChatMessage::user(text.clone())])
    }

    fn failed(&self, err: AgentError) -> WorkflowError {
        WorkflowError::ExecutorFailed {
            executor: self.id.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Executor for AgentExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![
            TypeKey::of::<Vec<ChatMessage>>(),
            TypeKey::of::<ChatMessage>(),
            TypeKey::of::<String>(),
        ]
    }

    fn output_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<Vec<ChatMessage>>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let messages = self.input_messages(&message)?;
        let thread = self.thread.as_ref();

        let response = if self.streaming {
            let mut updates = Vec::new();
            let mut stream = self.agent.run_stream(messages, thread);
            while let Some(update) = stream.next().await {
                let update = update.map_err(|err| self.failed(err))?;
                ctx.add_event(WorkflowEvent::AgentRunUpdate {
                    executor_id: self.id.clone(),
                    update: update.clone(),
                });
                updates.push(update);
            }
            AgentRunResponse::from_updates(updates)
        } else {
            self.agent
                .run(messages, thread)
                .await
                .map_err(|err| self.failed(err))?
        };

        tracing::debug!(executor = %self.id, messages = response.messages.len(), "agent responded");
        ctx.send_message(response.messages);
        Ok(())
    }
}

/// A [`Workflow`] presented as an [`Agent`].
///
/// The conversation (thread history plus new messages) is sent to the start
/// executor as `Vec<ChatMessage>`. Agent-run update events become the
/// agent's response, as do textual outputs of executors that did not stream.
pub struct WorkflowAgent {
    id: String,
    name: Option<String>,
    description: Option<String>,
    workflow: Workflow,
}

impl WorkflowAgent {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: workflow.name().map(str::to_string),
            description: None,
            workflow,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }
}

#[async_trait]
impl Agent for WorkflowAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    async fn run(
        &self,
        messages: Vec<ChatMessage>,
        thread: Option<&AgentThread>,
    ) -> Result<AgentRunResponse, AgentError> {
        let mut stream = self.run_stream(messages, thread);
        let mut updates = Vec::new();
        while let Some(update) = stream.next().await {
            updates.push(update?);
        }
        Ok(AgentRunResponse::from_updates(updates))
    }

    fn run_stream<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        thread: Option<&'a AgentThread>,
    ) -> BoxStream<'a, Result<AgentRunResponseUpdate, AgentError>> {
        Box::pin(try_stream! {
            let accepts_conversation = self
                .workflow
                .start_executor()
                .input_types()
                .contains(&TypeKey::of::<Vec<ChatMessage>>());
            if !accepts_conversation {
                Err::<(), _>(AgentError::Config(format!(
                    "start executor '{}' does not accept Vec<ChatMessage>",
                    self.workflow.start_executor().id()
                )))?;
            }

            let mut input = thread.map(AgentThread::messages).unwrap_or_default();
            input.extend(messages.iter().cloned());

            let mut events = self.workflow.run_stream(input);
            let mut produced = Vec::new();
            let mut streamed = HashSet::new();
            while let Some(event) = events.next().await {
                let event = event.map_err(|err| AgentError::Workflow(err.to_string()))?;
                let updates = match event {
                    WorkflowEvent::AgentRunUpdate { executor_id, update } => {
                        streamed.insert(executor_id);
                        vec![update]
                    }
                    // Executors that streamed updates already surfaced their text.
                    WorkflowEvent::Output { executor_id, data }
                        if !streamed.contains(&executor_id) =>
                    {
                        output_updates(&executor_id, &data)
                    }
                    _ => Vec::new(),
                };
                for update in updates {
                    produced.push(update.clone());
                    yield update;
                }
            }

            if let Some(thread) = thread {
                thread.on_new_messages(&messages);
                thread.on_new_messages(&AgentRunResponse::from_updates(produced).messages);
            }
        })
    }
}

/// Textual outputs become assistant updates; other payload types are not
/// representable as chat and are skipped.
fn output_updates(executor_id: &str, data: &Message) -> Vec<AgentRunResponseUpdate> {
    let messages = if let Some(messages) = data.downcast_ref::<Vec<ChatMessage>>() {
        messages.clone()
    } else if let Some(message) = data.downcast_ref::<ChatMessage>() {
        vec![message.clone()]
    } else if let Some(response) = data.downcast_ref::<AgentRunResponse>() {
        response.messages.clone()
    } else if let Some(text) = data.downcast_ref::<String>() {
        vec![ChatMessage::assistant(text.clone())]
    } else if let Some(number) = data.downcast_ref::<i64>() {
        vec![ChatMessage::assistant(number.to_string())]
    } else if let Some(number) = data.downcast_ref::<BigInt>() {
        vec![ChatMessage::assistant(number.to_string())]
    } else {
        return Vec::new();
    };

    messages
        .into_iter()
        .filter(|message| message.role == Role::Assistant)
        .map(|message| {
            let mut update = AgentRunResponseUpdate::from_message(message);
            if update.author_name.is_none() {
                update.author_name = Some(executor_id.to_string());
            }
            update.message_id = Some(uuid::Uuid::new_v4().to_string());
            update
        })
        .filter(|update| {
            update
                .contents
                .iter()
                .any(|content| matches!(content, Content::Text { .. }))
        })
        .collect()
}
