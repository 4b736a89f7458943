use async_stream::stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::error::ProviderError;
use crate::llm::{ChatClient, ChatMessage, ChatOptions, ChatResponse, ChatResponseUpdate};

/// In-process client that answers every request with the same text and
/// streams a fixed list of fragments. Requests are recorded for inspection.
#[derive(Debug)]
pub struct CannedChatClient {
    reply: String,
    stream_chunks: Vec<String>,
    response_id: String,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CannedChatClient {
    pub fn new(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self {
            stream_chunks: vec![reply.clone()],
            reply,
            response_id: "custom-response".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_stream_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stream_chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_response_id(mut self, response_id: impl Into<String>) -> Self {
        self.response_id = response_id.into();
        self
    }

    /// Every message list this client has been called with, oldest first.
    pub async fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ChatClient for CannedChatClient {
    async fn get_response(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().await.push(messages.to_vec());

        Ok(ChatResponse {
            response_id: Some(self.response_id.clone()),
            ..ChatResponse::from_message(ChatMessage::assistant(self.reply.clone()))
        })
    }

    fn get_streaming_response<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        _options: ChatOptions,
    ) -> BoxStream<'a, Result<ChatResponseUpdate, ProviderError>> {
        Box::pin(stream! {
            self.requests.lock().await.push(messages);
            for chunk in &self.stream_chunks {
                yield Ok(ChatResponseUpdate {
                    response_id: Some(self.response_id.clone()),
                    ..ChatResponseUpdate::text_delta(chunk.clone())
                });
            }
        })
    }

    fn describe(&self) -> Value {
        json!({
            "type": "canned",
            "reply": self.reply,
            "stream_chunks": self.stream_chunks,
        })
    }
}
