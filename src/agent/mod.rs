mod middleware;
mod response;
mod tool;

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AgentError, SchemaError};
use crate::llm::{
    ChatClient, ChatMessage, ChatOptions, ChatResponse, Content, ResponseFormat, Role, ToolCall,
    ToolChoice, Usage,
};
use crate::thread::AgentThread;
use crate::tools::{FunctionTool, result_text};

pub use middleware::{AgentMiddleware, AgentRunContext, LoggingMiddleware, Next};
pub use response::{AgentRunResponse, AgentRunResponseUpdate};
pub use tool::{AgentToolOptions, UpdateCallback};

const DEFAULT_MAX_ITERATIONS: u32 = 24;

/// A conversational agent. Conversation state lives in the [`AgentThread`]
/// passed to each call, so one agent can serve many threads.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> Option<&str> {
        None
    }

    fn display_name(&self) -> &str {
        self.name().unwrap_or_else(|| self.id())
    }

    async fn run(
        &self,
        messages: Vec<ChatMessage>,
        thread: Option<&AgentThread>,
    ) -> Result<AgentRunResponse, AgentError>;

    fn run_stream<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        thread: Option<&'a AgentThread>,
    ) -> BoxStream<'a, Result<AgentRunResponseUpdate, AgentError>>;

    fn get_new_thread(&self) -> AgentThread {
        AgentThread::new()
    }
}

#[async_trait]
pub trait AgentExt: Agent {
    /// Runs with a single user message.
    async fn run_text(
        &self,
        text: impl Into<String> + Send,
        thread: Option<&AgentThread>,
    ) -> Result<AgentRunResponse, AgentError> {
        self.run(vec![ChatMessage::user(text)], thread).await
    }

    /// Exposes the agent as a function tool taking one string argument.
    fn as_tool(self, options: AgentToolOptions) -> Result<FunctionTool, SchemaError>
    where
        Self: Sized + 'static,
    {
        tool::agent_tool(self, options)
    }
}

impl<T: Agent + ?Sized> AgentExt for T {}

/// Per-run overrides of the agent's defaults.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub response_format: Option<ResponseFormat>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub additional_instructions: Option<String>,
}

impl RunOptions {
    pub fn with_response_format(response_format: ResponseFormat) -> Self {
        Self {
            response_format: Some(response_format),
            ..Self::default()
        }
    }
}

pub struct ChatAgentBuilder {
    client: Option<Arc<dyn ChatClient>>,
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    instructions: Option<String>,
    model_id: Option<String>,
    tools: Vec<FunctionTool>,
    max_iterations: u32,
    middleware: Vec<Arc<dyn AgentMiddleware>>,
    options: RunOptions,
}

impl Default for ChatAgentBuilder {
    fn default() -> Self {
        Self {
            client: None,
            id: None,
            name: None,
            description: None,
            instructions: None,
            model_id: None,
            tools: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            middleware: Vec::new(),
            options: RunOptions::default(),
        }
    }
}

impl ChatAgentBuilder {
    pub fn client<C>(self, client: C) -> Self
    where
        C: ChatClient + 'static,
    {
        self.shared_client(Arc::new(client))
    }

    pub fn shared_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn tool(mut self, tool: FunctionTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<FunctionTool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: AgentMiddleware + 'static,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn response_format(mut self, response_format: ResponseFormat) -> Self {
        self.options.response_format = Some(response_format);
        self
    }

    pub fn tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.options.tool_choice = Some(tool_choice);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn build(self) -> Result<ChatAgent, AgentError> {
        let Some(client) = self.client else {
            return Err(AgentError::Config(
                "chat client must be configured via ChatAgentBuilder::client(...)".to_string(),
            ));
        };

        let mut tool_map = HashMap::new();
        for tool in &self.tools {
            if tool_map
                .insert(tool.name().to_string(), tool.clone())
                .is_some()
            {
                return Err(AgentError::Config(format!(
                    "duplicate tool registered: {}",
                    tool.name()
                )));
            }
        }

        Ok(ChatAgent {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: self.name,
            description: self.description,
            instructions: self.instructions,
            model_id: self.model_id,
            client,
            tools: self.tools,
            tool_map,
            max_iterations: self.max_iterations,
            middleware: self.middleware,
            default_options: self.options,
        })
    }
}

/// Builds agents directly from a client: `client.create_agent().name(..).build()`.
pub trait ChatClientAgentExt: ChatClient + Sized + 'static {
    fn create_agent(self) -> ChatAgentBuilder {
        ChatAgent::builder().client(self)
    }
}

impl<C: ChatClient + 'static> ChatClientAgentExt for C {}

/// Agent backed by a [`ChatClient`], with a tool-calling loop.
pub struct ChatAgent {
    id: String,
    name: Option<String>,
    description: Option<String>,
    instructions: Option<String>,
    model_id: Option<String>,
    client: Arc<dyn ChatClient>,
    tools: Vec<FunctionTool>,
    tool_map: HashMap<String, FunctionTool>,
    max_iterations: u32,
    middleware: Vec<Arc<dyn AgentMiddleware>>,
    default_options: RunOptions,
}

impl ChatAgent {
    pub fn builder() -> ChatAgentBuilder {
        ChatAgentBuilder::default()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn tools(&self) -> &[FunctionTool] {
        &self.tools
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    /// Runs through the middleware chain with per-run options, then records
    /// the input and generated messages on the thread.
    pub async fn run_with(
        &self,
        messages: Vec<ChatMessage>,
        thread: Option<&AgentThread>,
        options: RunOptions,
    ) -> Result<AgentRunResponse, AgentError> {
        let mut context =
            AgentRunContext::new(self.display_name(), messages, thread.cloned(), options);
        Next::new(self, &self.middleware).run(&mut context).await?;

        let response = context.result.take().ok_or(AgentError::MissingResponse)?;
        if let Some(thread) = thread {
            record_run(
                thread,
                &context.messages,
                &response.messages,
                response.response_id.as_deref(),
            )?;
        }
        Ok(response)
    }

    /// Requests structured output shaped like `T` and parses it.
    pub async fn run_typed<T>(
        &self,
        messages: Vec<ChatMessage>,
        thread: Option<&AgentThread>,
    ) -> Result<T, AgentError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let options = RunOptions::with_response_format(ResponseFormat::for_type::<T>());
        self.run_with(messages, thread, options)
            .await?
            .try_parse_value()
    }

    pub fn run_stream_with<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        thread: Option<&'a AgentThread>,
        options: RunOptions,
    ) -> BoxStream<'a, Result<AgentRunResponseUpdate, AgentError>> {
        Box::pin(try_stream! {
            let chat_options = self.chat_options(&options, thread);
            let mut conversation = history(thread);
            conversation.extend(messages.iter().cloned());
            let mut generated = Vec::new();
            let mut response_id = None;

            for iteration in 0..self.max_iterations {
                tracing::debug!(agent = %self.display_name(), iteration, "streaming completion");

                let mut updates = Vec::new();
                let mut stream = self
                    .client
                    .get_streaming_response(conversation.clone(), chat_options.clone());
                while let Some(update) = stream.next().await {
                    let update = update?;
                    updates.push(update.clone());
                    yield AgentRunResponseUpdate::from_chat_update(update, self.name());
                }

                let completion = ChatResponse::from_updates(updates);
                if completion.response_id.is_some() {
                    response_id = completion.response_id.clone();
                }
                let tool_calls = completion.tool_calls();
                let produced = self.attribute(completion.messages);
                conversation.extend(produced.iter().cloned());
                generated.extend(produced);

                if tool_calls.is_empty() {
                    if let Some(thread) = thread {
                        record_run(thread, &messages, &generated, response_id.as_deref())?;
                    }
                    return;
                }

                let results = self.execute_tool_calls(&tool_calls).await;
                yield AgentRunResponseUpdate::from_message(results.clone());
                conversation.push(results.clone());
                generated.push(results);
            }

            Err::<(), AgentError>(AgentError::MaxIterationsReached {
                max_iterations: self.max_iterations,
            })?;
        })
    }

    /// The tool loop without middleware or thread bookkeeping.
    pub(crate) async fn invoke(
        &self,
        messages: &[ChatMessage],
        thread: Option<&AgentThread>,
        options: &RunOptions,
    ) -> Result<AgentRunResponse, AgentError> {
        let chat_options = self.chat_options(options, thread);
        let mut conversation = history(thread);
        conversation.extend_from_slice(messages);

        let mut response = AgentRunResponse::default();

        for iteration in 0..self.max_iterations {
            tracing::debug!(agent = %self.display_name(), iteration, "requesting completion");

            let completion = self
                .client
                .get_response(&conversation, &chat_options)
                .await?;

            if completion.response_id.is_some() {
                response.response_id = completion.response_id.clone();
            }
            if let Some(usage) = completion.usage {
                response.usage.get_or_insert_with(Usage::default).add(usage);
            }

            let tool_calls = completion.tool_calls();
            let produced = self.attribute(completion.messages);
            conversation.extend(produced.iter().cloned());
            response.messages.extend(produced);

            if tool_calls.is_empty() {
                if chat_options.response_format.is_some() {
                    response.value = structured_value(&response.messages);
                }
                return Ok(response);
            }

            let results = self.execute_tool_calls(&tool_calls).await;
            conversation.push(results.clone());
            response.messages.push(results);
        }

        Err(AgentError::MaxIterationsReached {
            max_iterations: self.max_iterations,
        })
    }

    fn chat_options(&self, options: &RunOptions, thread: Option<&AgentThread>) -> ChatOptions {
        let tools = self
            .tools
            .iter()
            .map(FunctionTool::definition)
            .collect::<Vec<_>>();

        let tool_choice = options
            .tool_choice
            .clone()
            .or_else(|| self.default_options.tool_choice.clone())
            .or_else(|| (!tools.is_empty()).then_some(ToolChoice::Auto));

        let instructions = match (&self.instructions, &options.additional_instructions) {
            (Some(base), Some(extra)) => Some(format!("{base}\n{extra}")),
            (Some(base), None) => Some(base.clone()),
            (None, extra) => extra.clone(),
        };

        ChatOptions {
            model_id: self.model_id.clone(),
            instructions,
            tools,
            tool_choice,
            response_format: options
                .response_format
                .clone()
                .or_else(|| self.default_options.response_format.clone()),
            temperature: options.temperature.or(self.default_options.temperature),
            max_tokens: options.max_tokens.or(self.default_options.max_tokens),
            conversation_id: thread.and_then(AgentThread::service_thread_id),
        }
    }

    fn attribute(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        messages
            .into_iter()
            .map(|mut message| {
                if message.author_name.is_none() {
                    message.author_name = self.name.clone();
                }
                message
            })
            .collect()
    }

    async fn execute_tool_calls(&self, tool_calls: &[ToolCall]) -> ChatMessage {
        let mut contents = Vec::with_capacity(tool_calls.len());
        for tool_call in tool_calls {
            contents.push(self.execute_tool_call(tool_call).await);
        }
        ChatMessage::with_contents(Role::Tool, contents)
    }

    async fn execute_tool_call(&self, tool_call: &ToolCall) -> Content {
        let (result, is_error) = match self.tool_map.get(&tool_call.name) {
            None => (format!("Unknown tool '{}'.", tool_call.name), true),
            Some(tool) => {
                tracing::debug!(tool = %tool_call.name, call_id = %tool_call.id, "invoking tool");
                match tool.invoke(tool_call.arguments.clone()).await {
                    Ok(value) => (result_text(&value), false),
                    Err(err) => {
                        tracing::warn!(tool = %tool_call.name, error = %err, "tool call failed");
                        (err.to_string(), true)
                    }
                }
            }
        };

        Content::FunctionResult {
            call_id: tool_call.id.clone(),
            name: tool_call.name.clone(),
            result,
            is_error,
        }
    }
}

#[async_trait]
impl Agent for ChatAgent {
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
        self.run_with(messages, thread, RunOptions::default()).await
    }

    fn run_stream<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        thread: Option<&'a AgentThread>,
    ) -> BoxStream<'a, Result<AgentRunResponseUpdate, AgentError>> {
        self.run_stream_with(messages, thread, RunOptions::default())
    }
}

fn history(thread: Option<&AgentThread>) -> Vec<ChatMessage> {
    thread.map(AgentThread::messages).unwrap_or_default()
}

/// Records a finished run. A service-managed thread moves on to the
/// conversation state the service returned.
fn record_run(
    thread: &AgentThread,
    input: &[ChatMessage],
    generated: &[ChatMessage],
    response_id: Option<&str>,
) -> Result<(), AgentError> {
    thread.on_new_messages(input);
    thread.on_new_messages(generated);
    if let Some(response_id) = response_id.filter(|_| thread.is_service_managed()) {
        thread.set_service_thread_id(response_id)?;
    }
    Ok(())
}

fn structured_value(messages: &[ChatMessage]) -> Option<Value> {
    let text = messages
        .iter()
        .rev()
        .find(|message| message.role == Role::Assistant)?
        .text();
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(error = %err, "structured response is not valid JSON");
            None
        }
    }
}
