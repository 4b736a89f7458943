//! Chat clients, tool-calling agents and message-passing workflows.
//!
//! - `ChatClient` abstraction with OpenAI chat-completions, Azure OpenAI and
//!   Responses API adapters
//! - `ChatAgent` tool loop with middleware, threads and structured output
//! - `FunctionTool` with JSON-schema argument validation
//! - `Workflow` superstep runner over typed executors, runnable as an agent
//! - sample executors under [`samples`]

pub mod agent;
pub mod error;
pub mod llm;
pub mod samples;
pub mod thread;
pub mod tools;
pub mod workflow;

pub use agent::{
    Agent, AgentExt, AgentMiddleware, AgentRunContext, AgentRunResponse, AgentRunResponseUpdate,
    AgentToolOptions, ChatAgent, ChatAgentBuilder, ChatClientAgentExt, LoggingMiddleware, Next,
    RunOptions,
};
pub use error::{
    AgentError, ProviderError, SchemaError, SettingsError, ThreadError, ToolError, WorkflowError,
};
pub use llm::{
    AzureOpenAISettings, CannedChatClient, ChatClient, ChatMessage, ChatOptions, ChatResponse,
    ChatResponseUpdate, Content, OpenAIChatClient, OpenAIChatConfig, OpenAIResponsesClient,
    OpenAIResponsesConfig, OpenAISettings, ResponseFormat, Role, ToolChoice, Usage,
};
pub use thread::{AgentThread, ChatMessageStore};
pub use tools::{ApprovalMode, FunctionTool};
pub use workflow::{
    AgentExecutor, Executor, Message, SharedState, TypeKey, Workflow, WorkflowAgent,
    WorkflowBuilder, WorkflowContext, WorkflowEvent, WorkflowRunResult,
};
