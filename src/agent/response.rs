use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AgentError;
use crate::llm::{ChatMessage, ChatResponseUpdate, Content, Role, Usage};

/// Everything one agent run produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentRunResponse {
    /// Messages generated during the run, tool results included.
    pub messages: Vec<ChatMessage>,
    pub response_id: Option<String>,
    pub usage: Option<Usage>,
    /// Parsed JSON body when the run asked for structured output.
    pub value: Option<Value>,
}

impl AgentRunResponse {
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Concatenated text of every message.
    pub fn text(&self) -> String {
        self.messages.iter().map(ChatMessage::text).collect()
    }

    pub fn try_parse_value<T: DeserializeOwned>(&self) -> Result<T, AgentError> {
        let value = self.value.clone().ok_or(AgentError::MissingValue)?;
        serde_json::from_value(value).map_err(|err| AgentError::InvalidValue(err.to_string()))
    }

    /// Groups streamed updates into messages. A new message starts whenever
    /// the role or message id changes; adjacent text fragments are joined.
    pub fn from_updates(updates: impl IntoIterator<Item = AgentRunResponseUpdate>) -> Self {
        let mut response = AgentRunResponse::default();

        for update in updates {
            if update.response_id.is_some() {
                response.response_id = update.response_id.clone();
            }
            if let Some(usage) = update.usage {
                response.usage.get_or_insert_with(Usage::default).add(usage);
            }

            let role = update.role.unwrap_or(Role::Assistant);
            let continues_last = response.messages.last().is_some_and(|last| {
                last.role == role
                    && (update.message_id.is_none() || last.message_id == update.message_id)
            });

            if !continues_last {
                let mut message = ChatMessage::with_contents(role, Vec::new());
                message.author_name = update.author_name.clone();
                message.message_id = update.message_id.clone();
                response.messages.push(message);
            }

            let Some(message) = response.messages.last_mut() else {
                continue;
            };
            for content in update.contents {
                if let (Some(Content::Text { text }), Content::Text { text: delta }) =
                    (message.contents.last_mut(), &content)
                {
                    text.push_str(delta);
                    continue;
                }
                message.contents.push(content);
            }
        }

        response
    }
}

impl fmt::Display for AgentRunResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// One streamed fragment of an agent run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentRunResponseUpdate {
    pub role: Option<Role>,
    pub contents: Vec<Content>,
    pub author_name: Option<String>,
    pub response_id: Option<String>,
    pub message_id: Option<String>,
    pub usage: Option<Usage>,
}

impl AgentRunResponseUpdate {
    pub fn text_delta(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Assistant),
            contents: vec![Content::text(text)],
            ..Self::default()
        }
    }

    pub fn from_chat_update(update: ChatResponseUpdate, author_name: Option<&str>) -> Self {
        Self {
            role: update.role,
            contents: update.contents,
            author_name: update
                .author_name
                .or_else(|| author_name.map(str::to_string)),
            response_id: update.response_id,
            message_id: update.message_id,
            usage: update.usage,
        }
    }

    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            role: Some(message.role),
            contents: message.contents,
            author_name: message.author_name,
            response_id: None,
            message_id: message.message_id,
            usage: None,
        }
    }

    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(Content::as_text)
            .collect::<String>()
    }
}

impl fmt::Display for AgentRunResponseUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn updates_group_by_role() {
        let tool_result = AgentRunResponseUpdate {
            role: Some(Role::Tool),
            contents: vec![Content::FunctionResult {
                call_id: "call_1".to_string(),
                name: "get_square".to_string(),
                result: "The square of 5 is 25.".to_string(),
                is_error: false,
            }],
            ..AgentRunResponseUpdate::default()
        };

        let response = AgentRunResponse::from_updates([
            tool_result,
            AgentRunResponseUpdate::text_delta("The answer"),
            AgentRunResponseUpdate::text_delta(" is 25."),
        ]);

        assert_eq!(response.messages.len(), 2);
        assert_eq!(response.messages[1].role, Role::Assistant);
        assert_eq!(response.text(), "The answer is 25.");
    }

    #[test]
    fn structured_value_parses_into_type() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Language {
            language: String,
            difficulty: String,
        }

        let response = AgentRunResponse {
            value: Some(json!({"language": "Rust", "difficulty": "hard"})),
            ..AgentRunResponse::default()
        };

        let parsed = response.try_parse_value::<Language>().expect("parses");
        assert_eq!(parsed.language, "Rust");

        let missing = AgentRunResponse::default().try_parse_value::<Language>();
        assert!(matches!(missing, Err(AgentError::MissingValue)));
    }
}
