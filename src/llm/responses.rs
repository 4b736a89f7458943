use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ProviderError, SettingsError};
use crate::llm::http::{extract_api_error, json_event_stream};
use crate::llm::{
    ChatClient, ChatMessage, ChatOptions, ChatResponse, ChatResponseUpdate, Content,
    OpenAISettings, Role, ToolChoice, Usage,
};

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAIResponsesConfig {
    pub api_key: String,
    pub model_id: String,
    pub base_url: Option<String>,
    pub organization: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl OpenAIResponsesConfig {
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: None,
            organization: None,
            temperature: None,
            max_output_tokens: None,
        }
    }
}

/// Client for the OpenAI Responses API (`/responses`).
#[derive(Debug, Clone)]
pub struct OpenAIResponsesClient {
    client: Client,
    config: OpenAIResponsesConfig,
}

impl OpenAIResponsesClient {
    pub fn new(config: OpenAIResponsesConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_env(model_id: impl Into<String>) -> Result<Self, ProviderError> {
        let settings =
            OpenAISettings::from_env().map_err(|err| ProviderError::Request(err.to_string()))?;
        let mut config = OpenAIResponsesConfig::new(settings.api_key, model_id);
        config.base_url = settings.base_url;
        config.organization = settings.org_id;
        Self::new(config)
    }

    /// Uses `OPENAI_RESPONSES_MODEL_ID` as the model.
    pub fn from_settings(settings: OpenAISettings) -> Result<Self, ProviderError> {
        let model_id = settings
            .responses_model_id
            .ok_or(SettingsError::Missing("OPENAI_RESPONSES_MODEL_ID"))
            .map_err(|err| ProviderError::Request(err.to_string()))?;
        let mut config = OpenAIResponsesConfig::new(settings.api_key, model_id);
        config.base_url = settings.base_url;
        config.organization = settings.org_id;
        Self::new(config)
    }

    fn endpoint_url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/responses")
    }

    async fn send(&self, request: &ResponsesRequest) -> Result<reqwest::Response, ProviderError> {
        tracing::debug!(model = %request.model, stream = request.stream, "sending responses request");

        let mut builder = self
            .client
            .post(self.endpoint_url())
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json");
        if let Some(organization) = &self.config.organization {
            builder = builder.header("openai-organization", organization);
        }

        let response = builder
            .json(request)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Request(
                extract_api_error(response, "openai").await,
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatClient for OpenAIResponsesClient {
    fn model_id(&self) -> Option<&str> {
        Some(&self.config.model_id)
    }

    async fn get_response(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let request = build_request(messages, options, &self.config, false);
        let response = self.send(&request).await?;

        let payload = response
            .json::<ResponseObject>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(payload)
    }

    fn get_streaming_response<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> BoxStream<'a, Result<ChatResponseUpdate, ProviderError>> {
        Box::pin(try_stream! {
            let request = build_request(&messages, &options, &self.config, true);
            let response = self.send(&request).await?;

            let events = json_event_stream::<StreamEvent>(response, "openai");
            futures_util::pin_mut!(events);

            while let Some(event) = events.next().await {
                if let Some(update) = stream_event_to_update(event?)? {
                    yield update;
                }
            }
        })
    }

    fn describe(&self) -> Value {
        json!({
            "type": "openai_responses",
            "model_id": self.config.model_id,
            "base_url": self.config.base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL),
            "temperature": self.config.temperature,
            "max_output_tokens": self.config.max_output_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionToolPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputItem {
    Message {
        role: &'static str,
        content: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Serialize)]
struct FunctionToolPayload {
    #[serde(rename = "type")]
    type_: &'static str,
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct TextPayload {
    format: TextFormatPayload,
}

#[derive(Debug, Serialize)]
struct TextFormatPayload {
    #[serde(rename = "type")]
    type_: &'static str,
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ResponseObject {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    usage: Option<WireUsage>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        id: Option<String>,
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText {
        text: String,
    },
    Refusal {
        refusal: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct WireUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Usage {
            input_tokens: usage.input_tokens.unwrap_or(0),
            output_tokens: usage.output_tokens.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        delta: String,
        item_id: Option<String>,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },
    #[serde(rename = "response.completed")]
    Completed { response: ResponseObject },
    #[serde(rename = "error")]
    Error {
        message: Option<String>,
        code: Option<String>,
    },
    #[serde(other)]
    Other,
}

fn build_request(
    messages: &[ChatMessage],
    options: &ChatOptions,
    config: &OpenAIResponsesConfig,
    stream: bool,
) -> ResponsesRequest {
    let tools = options
        .tools
        .iter()
        .map(|tool| FunctionToolPayload {
            type_: "function",
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        })
        .collect::<Vec<_>>();

    let tool_choice = if tools.is_empty() {
        None
    } else {
        options.tool_choice.clone().map(|choice| match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::Required => json!("required"),
            ToolChoice::None => json!("none"),
            ToolChoice::Tool(name) => json!({"type": "function", "name": name}),
        })
    };

    ResponsesRequest {
        model: options
            .model_id
            .clone()
            .unwrap_or_else(|| config.model_id.clone()),
        input: to_input_items(messages),
        instructions: options
            .instructions
            .clone()
            .filter(|text| !text.is_empty()),
        tools,
        tool_choice,
        text: options.response_format.as_ref().map(|format| TextPayload {
            format: TextFormatPayload {
                type_: "json_schema",
                name: format.name.clone(),
                schema: format.schema.clone(),
                strict: format.strict,
            },
        }),
        temperature: options.temperature.or(config.temperature),
        max_output_tokens: options.max_tokens.or(config.max_output_tokens),
        previous_response_id: options.conversation_id.clone(),
        stream,
    }
}

fn to_input_items(messages: &[ChatMessage]) -> Vec<InputItem> {
    let mut items = Vec::new();

    for message in messages {
        let text = message.text();
        let role = match message.role {
            Role::System => Some("system"),
            Role::User => Some("user"),
            Role::Assistant => Some("assistant"),
            Role::Tool => None,
        };
        if let Some(role) = role.filter(|_| !text.is_empty()) {
            items.push(InputItem::Message {
                role,
                content: text,
            });
        }

        for content in &message.contents {
            match content {
                Content::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => items.push(InputItem::FunctionCall {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.to_string(),
                }),
                Content::FunctionResult {
                    call_id,
                    result,
                    is_error,
                    ..
                } => items.push(InputItem::FunctionCallOutput {
                    call_id: call_id.clone(),
                    output: if *is_error {
                        format!("Error: {result}")
                    } else {
                        result.clone()
                    },
                }),
                Content::Text { .. } => {}
            }
        }
    }

    items
}

fn output_item_contents(item: OutputItem) -> Result<(Option<String>, Vec<Content>), ProviderError> {
    match item {
        OutputItem::Message { id, content } => {
            let contents = content
                .into_iter()
                .filter_map(|part| match part {
                    OutputContent::OutputText { text } => Some(Content::text(text)),
                    OutputContent::Refusal { refusal } => Some(Content::text(refusal)),
                    OutputContent::Other => None,
                })
                .collect();
            Ok((id, contents))
        }
        OutputItem::FunctionCall {
            call_id,
            name,
            arguments,
        } => {
            let arguments = if arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str::<Value>(&arguments).map_err(|err| {
                    ProviderError::Response(format!(
                        "function call arguments for '{name}' are not valid JSON: {err}"
                    ))
                })?
            };
            Ok((
                None,
                vec![Content::FunctionCall {
                    call_id,
                    name,
                    arguments,
                }],
            ))
        }
        OutputItem::Other => Ok((None, Vec::new())),
    }
}

fn normalize_response(response: ResponseObject) -> Result<ChatResponse, ProviderError> {
    if response.status.as_deref() == Some("failed") {
        return Err(ProviderError::Response(
            "openai response finished with status failed".to_string(),
        ));
    }

    let mut contents = Vec::new();
    for item in response.output {
        let (_, item_contents) = output_item_contents(item)?;
        contents.extend(item_contents);
    }

    Ok(ChatResponse {
        messages: vec![ChatMessage::with_contents(Role::Assistant, contents)],
        response_id: response.id,
        model_id: response.model,
        usage: response.usage.map(Usage::from),
        finish_reason: response.status,
    })
}

fn stream_event_to_update(event: StreamEvent) -> Result<Option<ChatResponseUpdate>, ProviderError> {
    match event {
        StreamEvent::OutputTextDelta { delta, item_id } => Ok(Some(ChatResponseUpdate {
            message_id: item_id,
            ..ChatResponseUpdate::text_delta(delta)
        })),
        StreamEvent::OutputItemDone { item } => match item {
            OutputItem::FunctionCall { .. } => {
                let (_, contents) = output_item_contents(item)?;
                Ok(Some(ChatResponseUpdate {
                    role: Some(Role::Assistant),
                    contents,
                    ..ChatResponseUpdate::default()
                }))
            }
            // Message text already arrived through the deltas.
            OutputItem::Message { .. } | OutputItem::Other => Ok(None),
        },
        StreamEvent::Completed { response } => Ok(Some(ChatResponseUpdate {
            role: Some(Role::Assistant),
            response_id: response.id,
            model_id: response.model,
            usage: response.usage.map(Usage::from),
            finish_reason: response.status,
            ..ChatResponseUpdate::default()
        })),
        StreamEvent::Error { message, code } => Err(ProviderError::Response(format!(
            "openai stream error {}: {}",
            code.unwrap_or_default(),
            message.unwrap_or_else(|| "unknown".to_string())
        ))),
        StreamEvent::Other => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm::{ResponseFormat, ToolDefinition};

    #[test]
    fn build_request_maps_messages_function_items_and_format() {
        let messages = vec![
            ChatMessage::user("get square of 5"),
            ChatMessage::with_contents(
                Role::Assistant,
                vec![Content::FunctionCall {
                    call_id: "call_1".to_string(),
                    name: "get_square".to_string(),
                    arguments: json!({"number_string": "5"}),
                }],
            ),
            ChatMessage::with_contents(
                Role::Tool,
                vec![Content::FunctionResult {
                    call_id: "call_1".to_string(),
                    name: "get_square".to_string(),
                    result: "The square of 5 is 25.".to_string(),
                    is_error: false,
                }],
            ),
        ];
        let options = ChatOptions {
            instructions: Some("call the tool".to_string()),
            tools: vec![ToolDefinition {
                name: "get_square".to_string(),
                description: "Get the square of a given number.".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
            tool_choice: Some(ToolChoice::Auto),
            response_format: Some(ResponseFormat::new("Answer", json!({"type": "object"}))),
            ..ChatOptions::default()
        };

        let request = build_request(
            &messages,
            &options,
            &OpenAIResponsesConfig::new("key", "gpt-5-nano"),
            false,
        );
        let value = serde_json::to_value(request).expect("serializes");

        assert_eq!(value["model"], "gpt-5-nano");
        assert_eq!(value["instructions"], "call the tool");
        assert_eq!(value["input"][0]["type"], "message");
        assert_eq!(value["input"][0]["role"], "user");
        assert_eq!(value["input"][1]["type"], "function_call");
        assert_eq!(value["input"][1]["arguments"], "{\"number_string\":\"5\"}");
        assert_eq!(value["input"][2]["type"], "function_call_output");
        assert_eq!(value["input"][2]["output"], "The square of 5 is 25.");
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["text"]["format"]["type"], "json_schema");
        assert!(value.get("stream").is_none());
        assert!(value.get("previous_response_id").is_none());
    }

    #[test]
    fn build_request_continues_server_side_conversation() {
        let options = ChatOptions {
            conversation_id: Some("resp_41".to_string()),
            ..ChatOptions::default()
        };

        let request = build_request(
            &[ChatMessage::user("And the next one?")],
            &options,
            &OpenAIResponsesConfig::new("key", "gpt-5-nano"),
            true,
        );
        let value = serde_json::to_value(request).expect("serializes");

        assert_eq!(value["previous_response_id"], "resp_41");
        assert_eq!(value["input"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["stream"], true);
    }

    #[test]
    fn normalize_response_reads_message_and_function_call_items() {
        let response: ResponseObject = serde_json::from_value(json!({
            "id": "resp_1",
            "model": "gpt-5-nano",
            "status": "completed",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {"type": "message", "id": "msg_1", "role": "assistant",
                 "content": [{"type": "output_text", "text": "2", "annotations": []}]},
                {"type": "function_call", "id": "fc_1", "call_id": "call_9",
                 "name": "get_square", "arguments": "{\"number_string\":\"4\"}"}
            ],
            "usage": {"input_tokens": 4, "output_tokens": 2, "total_tokens": 6}
        }))
        .expect("deserializes");

        let normalized = normalize_response(response).expect("normalizes");

        assert_eq!(normalized.text(), "2");
        assert_eq!(normalized.response_id.as_deref(), Some("resp_1"));
        assert_eq!(normalized.tool_calls()[0].id, "call_9");
        assert_eq!(normalized.usage.map(|usage| usage.total_tokens()), Some(6));
    }

    #[test]
    fn stream_events_map_to_updates() {
        let delta: StreamEvent = serde_json::from_value(json!({
            "type": "response.output_text.delta", "item_id": "msg_1", "output_index": 0,
            "content_index": 0, "delta": "Hel"
        }))
        .expect("delta");
        let update = stream_event_to_update(delta).expect("ok").expect("update");
        assert_eq!(update.text(), "Hel");

        let ignored: StreamEvent = serde_json::from_value(json!({
            "type": "response.created", "response": {}
        }))
        .expect("other");
        assert!(stream_event_to_update(ignored).expect("ok").is_none());

        let error: StreamEvent = serde_json::from_value(json!({
            "type": "error", "code": "server_error", "message": "boom"
        }))
        .expect("error");
        assert!(stream_event_to_update(error).is_err());
    }
}
