use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool {0} requires approval before it can run")]
    ApprovalRequired(String),
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("setting {0} is not set")]
    Missing(&'static str),
    #[error("failed to read env file {path}: {message}")]
    EnvFile { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread is bound to service thread {0} and keeps no local messages")]
    ServiceManaged(String),
    #[error("thread state is invalid: {0}")]
    InvalidState(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Thread(#[from] ThreadError),
    #[error("max iterations reached ({max_iterations})")]
    MaxIterationsReached { max_iterations: u32 },
    #[error("agent run produced no response")]
    MissingResponse,
    #[error("agent run produced no structured value")]
    MissingValue,
    #[error("structured value does not match the requested type: {0}")]
    InvalidValue(String),
    #[error("agent configuration error: {0}")]
    Config(String),
    #[error("workflow failed: {0}")]
    Workflow(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow configuration error: {0}")]
    Config(String),
    #[error("executor '{executor}' cannot handle message of type {type_name}")]
    UnhandledMessage {
        executor: String,
        type_name: &'static str,
    },
    #[error("executor '{0}' is not part of the workflow")]
    UnknownExecutor(String),
    #[error("executor '{executor}' failed: {message}")]
    ExecutorFailed { executor: String, message: String },
    #[error("unknown request id in review: {0}")]
    UnknownRequest(String),
    #[error("workflow did not converge within {max_supersteps} supersteps")]
    DidNotConverge { max_supersteps: u32 },
    #[error("shared state value for '{key}' is invalid: {message}")]
    SharedState { key: String, message: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}
