use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Map, Value, json};

use crate::agent::{Agent, AgentRunResponse, AgentRunResponseUpdate};
use crate::error::{SchemaError, ToolError};
use crate::llm::ChatMessage;
use crate::tools::{FunctionTool, result_text};

pub type UpdateCallback = dyn Fn(&AgentRunResponseUpdate) + Send + Sync;

/// How an agent is presented when wrapped as a tool.
#[derive(Clone)]
pub struct AgentToolOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    pub arg_name: String,
    pub arg_description: Option<String>,
    /// When set, the agent runs in streaming mode and every update is passed
    /// here before the final text is returned to the caller.
    pub stream_callback: Option<Arc<UpdateCallback>>,
}

impl Default for AgentToolOptions {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            arg_name: "task".to_string(),
            arg_description: None,
            stream_callback: None,
        }
    }
}

impl fmt::Debug for AgentToolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentToolOptions")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("arg_name", &self.arg_name)
            .field("arg_description", &self.arg_description)
            .field("stream_callback", &self.stream_callback.is_some())
            .finish()
    }
}

impl AgentToolOptions {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn arg_name(mut self, arg_name: impl Into<String>) -> Self {
        self.arg_name = arg_name.into();
        self
    }

    pub fn arg_description(mut self, arg_description: impl Into<String>) -> Self {
        self.arg_description = Some(arg_description.into());
        self
    }

    pub fn stream_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AgentRunResponseUpdate) + Send + Sync + 'static,
    {
        self.stream_callback = Some(Arc::new(callback));
        self
    }
}

pub(crate) fn agent_tool<A>(
    agent: A,
    options: AgentToolOptions,
) -> Result<FunctionTool, SchemaError>
where
    A: Agent + 'static,
{
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| tool_name(agent.display_name()));
    let description = options
        .description
        .clone()
        .or_else(|| agent.description().map(str::to_string))
        .unwrap_or_default();
    let arg_description = options
        .arg_description
        .clone()
        .unwrap_or_else(|| format!("Task for {name}"));

    let mut properties = Map::new();
    properties.insert(
        options.arg_name.clone(),
        json!({"type": "string", "description": arg_description}),
    );
    let schema = json!({
        "type": "object",
        "properties": properties,
        "required": [options.arg_name],
        "additionalProperties": false
    });

    let agent = Arc::new(agent);
    let arg_name = options.arg_name;
    let callback = options.stream_callback;

    Ok(FunctionTool::new(name, description)
        .with_schema(schema)?
        .with_handler(move |args| {
            let agent = Arc::clone(&agent);
            let callback = callback.clone();
            let task = args
                .get(arg_name.as_str())
                .map(result_text)
                .unwrap_or_default();

            async move {
                let messages = vec![ChatMessage::user(task)];
                let response = match callback {
                    Some(callback) => {
                        let mut updates = Vec::new();
                        let mut stream = agent.run_stream(messages, None);
                        while let Some(update) = stream.next().await {
                            let update =
                                update.map_err(|err| ToolError::Execution(err.to_string()))?;
                            callback(&update);
                            updates.push(update);
                        }
                        AgentRunResponse::from_updates(updates)
                    }
                    None => agent
                        .run(messages, None)
                        .await
                        .map_err(|err| ToolError::Execution(err.to_string()))?,
                };
                Ok(Value::String(response.text()))
            }
        }))
}

/// Tool names may not contain whitespace.
fn tool_name(display_name: &str) -> String {
    display_name.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_replace_whitespace() {
        assert_eq!(tool_name("Weather agent"), "Weather_agent");
        assert_eq!(tool_name("joker"), "joker");
    }
}
