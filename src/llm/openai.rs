use std::collections::BTreeMap;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ProviderError, SettingsError};
use crate::llm::http::{extract_api_error, json_event_stream};
use crate::llm::{
    AzureOpenAISettings, ChatClient, ChatMessage, ChatOptions, ChatResponse, ChatResponseUpdate,
    Content, OpenAISettings, ResponseFormat, Role, ToolChoice, ToolDefinition, Usage,
};

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const EMPTY_USER_CONTENT_FALLBACK: &str = " ";

/// Where chat completion requests go and how they authenticate.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenAIEndpoint {
    OpenAI {
        base_url: Option<String>,
        organization: Option<String>,
    },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

#[derive(Debug, Clone)]
pub struct OpenAIChatConfig {
    pub api_key: String,
    pub model_id: String,
    pub endpoint: OpenAIEndpoint,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl OpenAIChatConfig {
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_id: model_id.into(),
            endpoint: OpenAIEndpoint::OpenAI {
                base_url: None,
                organization: None,
            },
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }

    pub fn azure(settings: AzureOpenAISettings) -> Self {
        Self {
            api_key: settings.api_key,
            model_id: settings.chat_deployment_name.clone(),
            endpoint: OpenAIEndpoint::Azure {
                endpoint: settings.endpoint,
                deployment: settings.chat_deployment_name,
                api_version: settings.api_version,
            },
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }
}

/// Client for the OpenAI Chat Completions API and Azure OpenAI deployments.
#[derive(Debug, Clone)]
pub struct OpenAIChatClient {
    client: Client,
    config: OpenAIChatConfig,
}

impl OpenAIChatClient {
    pub fn new(config: OpenAIChatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_env(model_id: impl Into<String>) -> Result<Self, ProviderError> {
        let settings = OpenAISettings::from_env().map_err(settings_error)?;
        let mut config = OpenAIChatConfig::new(settings.api_key, model_id);
        config.endpoint = OpenAIEndpoint::OpenAI {
            base_url: settings.base_url,
            organization: settings.org_id,
        };
        Self::new(config)
    }

    /// Uses `OPENAI_CHAT_MODEL_ID` as the model.
    pub fn from_settings(settings: OpenAISettings) -> Result<Self, ProviderError> {
        let model_id = settings
            .chat_model_id
            .ok_or(SettingsError::Missing("OPENAI_CHAT_MODEL_ID"))
            .map_err(settings_error)?;
        let mut config = OpenAIChatConfig::new(settings.api_key, model_id);
        config.endpoint = OpenAIEndpoint::OpenAI {
            base_url: settings.base_url,
            organization: settings.org_id,
        };
        Self::new(config)
    }

    pub fn azure(settings: AzureOpenAISettings) -> Result<Self, ProviderError> {
        Self::new(OpenAIChatConfig::azure(settings))
    }

    pub fn config(&self) -> &OpenAIChatConfig {
        &self.config
    }

    fn endpoint_url(&self) -> String {
        match &self.config.endpoint {
            OpenAIEndpoint::OpenAI { base_url, .. } => {
                let base = base_url
                    .as_deref()
                    .unwrap_or(DEFAULT_API_BASE_URL)
                    .trim_end_matches('/');
                format!("{base}/chat/completions")
            }
            OpenAIEndpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
                endpoint.trim_end_matches('/')
            ),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("content-type", "application/json");
        match &self.config.endpoint {
            OpenAIEndpoint::OpenAI { organization, .. } => {
                let request =
                    request.header("authorization", format!("Bearer {}", self.config.api_key));
                match organization {
                    Some(organization) => request.header("openai-organization", organization),
                    None => request,
                }
            }
            OpenAIEndpoint::Azure { .. } => request.header("api-key", &self.config.api_key),
        }
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response, ProviderError> {
        tracing::debug!(model = %request.model, stream = request.stream, "sending chat completion request");

        let response = self
            .authorized(self.client.post(self.endpoint_url()))
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

fn settings_error(err: SettingsError) -> ProviderError {
    ProviderError::Request(err.to_string())
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
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
            .json::<ChatCompletionResponse>()
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

            let chunks = json_event_stream::<ChatCompletionChunk>(response, "openai");
            futures_util::pin_mut!(chunks);

            let mut pending_calls = PendingToolCalls::default();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if let Some(update) = pending_calls.absorb(chunk) {
                    yield update;
                }
            }

            if let Some(update) = pending_calls.finish()? {
                yield update;
            }
        })
    }

    fn describe(&self) -> Value {
        let endpoint = match &self.config.endpoint {
            OpenAIEndpoint::OpenAI { base_url, .. } => json!({
                "kind": "openai",
                "base_url": base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL),
            }),
            OpenAIEndpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => json!({
                "kind": "azure",
                "endpoint": endpoint,
                "deployment": deployment,
                "api_version": api_version,
            }),
        };

        json!({
            "type": "openai_chat",
            "model_id": self.config.model_id,
            "endpoint": endpoint,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<RequestToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoicePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum RequestMessage {
    System {
        content: String,
    },
    User {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<WireToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct RequestToolDefinition {
    #[serde(rename = "type")]
    type_: String,
    function: RequestFunctionDefinition,
}

#[derive(Debug, Serialize)]
struct RequestFunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ToolChoicePayload {
    Mode(String),
    Specific {
        #[serde(rename = "type")]
        type_: String,
        function: ToolChoiceFunction,
    },
}

#[derive(Debug, Serialize)]
struct ToolChoiceFunction {
    name: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormatPayload {
    #[serde(rename = "type")]
    type_: String,
    json_schema: JsonSchemaPayload,
}

#[derive(Debug, Serialize)]
struct JsonSchemaPayload {
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    function: WireToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct WireToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<AssistantMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Usage {
            input_tokens: usage.prompt_tokens.unwrap_or(0),
            output_tokens: usage.completion_tokens.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    index: usize,
    id: Option<String>,
    function: Option<ChunkToolCallFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCallFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// Tool call fragments arrive spread over many chunks; they are keyed by
/// index and released as complete calls once the stream ends.
#[derive(Debug, Default)]
struct PendingToolCalls {
    calls: BTreeMap<usize, (String, String, String)>,
    response_id: Option<String>,
    model_id: Option<String>,
    finish_reason: Option<String>,
}

impl PendingToolCalls {
    fn absorb(&mut self, chunk: ChatCompletionChunk) -> Option<ChatResponseUpdate> {
        if chunk.id.is_some() {
            self.response_id = chunk.id;
        }
        if chunk.model.is_some() {
            self.model_id = chunk.model;
        }

        let mut text = String::new();
        for choice in chunk.choices {
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
            if let Some(content) = choice.delta.content {
                text.push_str(&content);
            }
            for fragment in choice.delta.tool_calls {
                let entry = self.calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    entry.0 = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        entry.1.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.2.push_str(&arguments);
                    }
                }
            }
        }

        let usage = chunk.usage.map(Usage::from);
        if text.is_empty() && usage.is_none() {
            return None;
        }

        Some(ChatResponseUpdate {
            role: Some(Role::Assistant),
            contents: if text.is_empty() {
                Vec::new()
            } else {
                vec![Content::text(text)]
            },
            response_id: self.response_id.clone(),
            model_id: self.model_id.clone(),
            usage,
            ..ChatResponseUpdate::default()
        })
    }

    fn finish(self) -> Result<Option<ChatResponseUpdate>, ProviderError> {
        if self.calls.is_empty() && self.finish_reason.is_none() {
            return Ok(None);
        }

        let mut contents = Vec::new();
        for (_, (id, name, arguments)) in self.calls {
            contents.push(Content::FunctionCall {
                arguments: parse_arguments(&name, &arguments)?,
                call_id: id,
                name,
            });
        }

        Ok(Some(ChatResponseUpdate {
            role: Some(Role::Assistant),
            contents,
            response_id: self.response_id,
            model_id: self.model_id,
            finish_reason: self.finish_reason,
            ..ChatResponseUpdate::default()
        }))
    }
}

fn build_request(
    messages: &[ChatMessage],
    options: &ChatOptions,
    config: &OpenAIChatConfig,
    stream: bool,
) -> ChatCompletionRequest {
    let mut request_messages = Vec::new();
    if let Some(instructions) = options.instructions.as_ref().filter(|text| !text.is_empty()) {
        request_messages.push(RequestMessage::System {
            content: instructions.clone(),
        });
    }
    request_messages.extend(to_request_messages(messages));
    let request_messages = ensure_non_empty_messages(request_messages);

    let tools_payload = if options.tools.is_empty() {
        None
    } else {
        Some(
            options
                .tools
                .iter()
                .map(to_tool_definition)
                .collect::<Vec<_>>(),
        )
    };

    let tool_choice_payload = if options.tools.is_empty() {
        None
    } else {
        options.tool_choice.clone().map(|choice| match choice {
            ToolChoice::Auto => ToolChoicePayload::Mode("auto".to_string()),
            ToolChoice::Required => ToolChoicePayload::Mode("required".to_string()),
            ToolChoice::None => ToolChoicePayload::Mode("none".to_string()),
            ToolChoice::Tool(name) => ToolChoicePayload::Specific {
                type_: "function".to_string(),
                function: ToolChoiceFunction { name },
            },
        })
    };

    ChatCompletionRequest {
        model: options
            .model_id
            .clone()
            .unwrap_or_else(|| config.model_id.clone()),
        messages: request_messages,
        tools: tools_payload,
        tool_choice: tool_choice_payload,
        response_format: options.response_format.as_ref().map(to_response_format),
        temperature: options.temperature.or(config.temperature),
        top_p: config.top_p,
        max_completion_tokens: options.max_tokens.or(config.max_tokens),
        stream,
        stream_options: stream.then_some(StreamOptions {
            include_usage: true,
        }),
    }
}

fn to_tool_definition(tool: &ToolDefinition) -> RequestToolDefinition {
    RequestToolDefinition {
        type_: "function".to_string(),
        function: RequestFunctionDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

fn to_response_format(format: &ResponseFormat) -> ResponseFormatPayload {
    ResponseFormatPayload {
        type_: "json_schema".to_string(),
        json_schema: JsonSchemaPayload {
            name: format.name.clone(),
            schema: format.schema.clone(),
            strict: format.strict,
        },
    }
}

fn to_request_messages(messages: &[ChatMessage]) -> Vec<RequestMessage> {
    let mut request_messages = Vec::new();

    for message in messages {
        let text = message.text();
        match message.role {
            Role::System => {
                if !text.is_empty() {
                    request_messages.push(RequestMessage::System { content: text });
                }
            }
            Role::User => {
                if !text.is_empty() {
                    request_messages.push(RequestMessage::User {
                        content: text,
                        name: message.author_name.clone(),
                    });
                }
            }
            Role::Assistant => {
                let tool_calls = message
                    .tool_calls()
                    .into_iter()
                    .map(|tool_call| WireToolCall {
                        id: tool_call.id,
                        type_: "function".to_string(),
                        function: WireToolCallFunction {
                            name: tool_call.name,
                            arguments: tool_call.arguments.to_string(),
                        },
                    })
                    .collect::<Vec<_>>();

                let content = Some(text).filter(|text| !text.is_empty());
                if content.is_some() || !tool_calls.is_empty() {
                    request_messages.push(RequestMessage::Assistant {
                        content,
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                    });
                }
            }
            Role::Tool => {}
        }

        for content in &message.contents {
            if let Content::FunctionResult {
                call_id,
                result,
                is_error,
                ..
            } = content
            {
                let rendered = if *is_error {
                    format!("Error: {result}")
                } else {
                    result.clone()
                };
                request_messages.push(RequestMessage::Tool {
                    tool_call_id: call_id.clone(),
                    content: rendered,
                });
            }
        }
    }

    request_messages
}

fn ensure_non_empty_messages(mut messages: Vec<RequestMessage>) -> Vec<RequestMessage> {
    if messages.is_empty() {
        messages.push(RequestMessage::User {
            content: EMPTY_USER_CONTENT_FALLBACK.to_string(),
            name: None,
        });
    }

    messages
}

fn parse_arguments(tool_name: &str, arguments: &str) -> Result<Value, ProviderError> {
    if arguments.trim().is_empty() {
        return Ok(json!({}));
    }

    serde_json::from_str::<Value>(arguments).map_err(|err| {
        ProviderError::Response(format!(
            "tool call arguments for '{tool_name}' are not valid JSON: {err}"
        ))
    })
}

fn normalize_response(response: ChatCompletionResponse) -> Result<ChatResponse, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Response("openai response missing choices".to_string()))?;

    let message = choice.message.ok_or_else(|| {
        ProviderError::Response("openai response missing choice message".to_string())
    })?;

    let mut contents = Vec::new();
    if let Some(text) = message.content.filter(|text| !text.is_empty()) {
        contents.push(Content::text(text));
    } else if let Some(refusal) = message.refusal.filter(|text| !text.is_empty()) {
        contents.push(Content::text(refusal));
    }

    for tool_call in message.tool_calls {
        contents.push(Content::FunctionCall {
            arguments: parse_arguments(&tool_call.function.name, &tool_call.function.arguments)?,
            call_id: tool_call.id,
            name: tool_call.function.name,
        });
    }

    Ok(ChatResponse {
        messages: vec![ChatMessage::with_contents(Role::Assistant, contents)],
        response_id: response.id,
        model_id: response.model,
        usage: response.usage.map(Usage::from),
        finish_reason: choice.finish_reason,
    })
}
