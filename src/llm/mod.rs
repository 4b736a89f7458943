mod canned;
mod http;
mod openai;
mod responses;
mod settings;

use std::fmt;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ProviderError;

pub use canned::CannedChatClient;
pub use openai::{OpenAIChatClient, OpenAIChatConfig, OpenAIEndpoint};
pub use responses::{OpenAIResponsesClient, OpenAIResponsesConfig};
pub use settings::{AzureOpenAISettings, OpenAISettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of a message payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
    FunctionResult {
        call_id: String,
        name: String,
        result: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            Content::FunctionCall { .. } | Content::FunctionResult { .. } => None,
        }
    }
}

/// A single conversation message. Once built it is only ever cloned, never edited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_properties: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self::with_contents(role, vec![Content::text(text)])
    }

    pub fn with_contents(role: Role, contents: Vec<Content>) -> Self {
        Self {
            role,
            contents,
            author_name: None,
            message_id: None,
            additional_properties: Map::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn author(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = Some(author_name.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additional_properties.insert(key.into(), value);
        self
    }

    /// Text contents joined by a single space.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.contents
            .iter()
            .filter_map(|content| match content {
                Content::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => Some(ToolCall {
                    id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                Content::Text { .. } | Content::FunctionResult { .. } => None,
            })
            .collect()
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    Required,
    None,
    Tool(String),
}

/// JSON-schema response format used for structured output.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: Value,
    pub strict: bool,
}

impl ResponseFormat {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: false,
        }
    }

    pub fn for_type<T: JsonSchema>() -> Self {
        let schema = Value::from(schemars::schema_for!(T));
        Self::new(T::schema_name(), schema)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChatOptions {
    pub model_id: Option<String>,
    pub instructions: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Server-side conversation to continue. Clients that keep no state on
    /// the server ignore it.
    pub conversation_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatResponse {
    pub messages: Vec<ChatMessage>,
    pub response_id: Option<String>,
    pub model_id: Option<String>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            messages: vec![message],
            ..Self::default()
        }
    }

    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.messages
            .iter()
            .flat_map(ChatMessage::tool_calls)
            .collect()
    }

    /// Folds streamed fragments back into one assistant message.
    pub fn from_updates(updates: impl IntoIterator<Item = ChatResponseUpdate>) -> Self {
        let mut response = ChatResponse::default();
        let mut contents: Vec<Content> = Vec::new();
        let mut role = Role::Assistant;

        for update in updates {
            if let Some(update_role) = update.role {
                role = update_role;
            }
            if update.response_id.is_some() {
                response.response_id = update.response_id;
            }
            if update.model_id.is_some() {
                response.model_id = update.model_id;
            }
            if update.finish_reason.is_some() {
                response.finish_reason = update.finish_reason;
            }
            if let Some(usage) = update.usage {
                response.usage.get_or_insert_with(Usage::default).add(usage);
            }
            for content in update.contents {
                if let (Some(Content::Text { text }), Content::Text { text: delta }) =
                    (contents.last_mut(), &content)
                {
                    text.push_str(delta);
                    continue;
                }
                contents.push(content);
            }
        }

        if !contents.is_empty() {
            response
                .messages
                .push(ChatMessage::with_contents(role, contents));
        }
        response
    }

    pub fn into_updates(self) -> Vec<ChatResponseUpdate> {
        let ChatResponse {
            messages,
            response_id,
            model_id,
            usage,
            finish_reason,
        } = self;

        let mut updates = messages
            .into_iter()
            .map(|message| ChatResponseUpdate {
                role: Some(message.role),
                contents: message.contents,
                author_name: message.author_name,
                response_id: response_id.clone(),
                message_id: message.message_id,
                model_id: model_id.clone(),
                usage: None,
                finish_reason: None,
            })
            .collect::<Vec<_>>();

        if let Some(last) = updates.last_mut() {
            last.usage = usage;
            last.finish_reason = finish_reason;
        }
        updates
    }
}

impl fmt::Display for ChatResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatResponseUpdate {
    pub role: Option<Role>,
    pub contents: Vec<Content>,
    pub author_name: Option<String>,
    pub response_id: Option<String>,
    pub message_id: Option<String>,
    pub model_id: Option<String>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

impl ChatResponseUpdate {
    pub fn text_delta(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Assistant),
            contents: vec![Content::text(text)],
            ..Self::default()
        }
    }

    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(Content::as_text)
            .collect::<String>()
    }
}

impl fmt::Display for ChatResponseUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    fn model_id(&self) -> Option<&str> {
        None
    }

    async fn get_response(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError>;

    /// Streams the response. Clients without native streaming replay the
    /// batch response as one update per message.
    fn get_streaming_response<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> BoxStream<'a, Result<ChatResponseUpdate, ProviderError>> {
        Box::pin(try_stream! {
            let response = self.get_response(&messages, &options).await?;
            for update in response.into_updates() {
                yield update;
            }
        })
    }

    /// Client description without credentials.
    fn describe(&self) -> Value {
        json!({
            "type": std::any::type_name::<Self>(),
            "model_id": self.model_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_joins_text_contents_only() {
        let message = ChatMessage::with_contents(
            Role::Assistant,
            vec![
                Content::text("hello"),
                Content::FunctionCall {
                    call_id: "call_1".to_string(),
                    name: "lookup".to_string(),
                    arguments: json!({}),
                },
                Content::text("world"),
            ],
        );

        assert_eq!(message.text(), "hello world");
        assert_eq!(message.tool_calls().len(), 1);
    }

    #[test]
    fn message_serializes_role_and_tagged_contents() {
        let message = ChatMessage::user("X=2").property("content", json!("X=2"));
        let value = serde_json::to_value(&message).expect("serializes");

        assert_eq!(value["role"], "user");
        assert_eq!(value["contents"][0]["type"], "text");
        assert_eq!(value["additional_properties"]["content"], "X=2");
        assert!(value.get("author_name").is_none());
    }

    #[test]
    fn updates_fold_into_single_message() {
        let mut last = ChatResponseUpdate::text_delta(" And that is 1+1.");
        last.usage = Some(Usage {
            input_tokens: 3,
            output_tokens: 5,
        });
        last.response_id = Some("resp_1".to_string());

        let response = ChatResponse::from_updates(vec![ChatResponseUpdate::text_delta("2"), last]);

        assert_eq!(response.messages.len(), 1);
        assert_eq!(response.text(), "2 And that is 1+1.");
        assert_eq!(response.response_id.as_deref(), Some("resp_1"));
        assert_eq!(response.usage.map(|usage| usage.total_tokens()), Some(8));
    }

    #[test]
    fn response_format_from_type_uses_schema_name() {
        #[derive(JsonSchema)]
        #[allow(dead_code)]
        struct Language {
            language: String,
            difficulty: String,
        }

        let format = ResponseFormat::for_type::<Language>();
        assert_eq!(format.name, "Language");
        assert_eq!(format.schema["type"], "object");
        assert!(format.schema["properties"].get("difficulty").is_some());
    }
}
