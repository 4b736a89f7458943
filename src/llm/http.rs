use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProviderError;

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<Value>,
}

pub(crate) async fn extract_api_error(response: reqwest::Response, provider: &str) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(parsed) = serde_json::from_str::<ApiErrorEnvelope>(&body) {
        let code = parsed
            .error
            .code
            .map(|value| match value {
                Value::String(value) => value,
                other => other.to_string(),
            })
            .unwrap_or_else(|| status.as_u16().to_string());
        let error_type = parsed
            .error
            .type_
            .unwrap_or_else(|| status.to_string().to_uppercase());
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| format!("unknown {provider} api error"));

        return format!("{provider} api error {code} {error_type}: {message}");
    }

    if body.is_empty() {
        format!("{provider} api request failed ({status})")
    } else {
        format!("{provider} api request failed ({status}): {body}")
    }
}

/// Turns an SSE response body into typed JSON events, stopping at `[DONE]`.
pub(crate) fn json_event_stream<R>(
    response: reqwest::Response,
    provider: &'static str,
) -> impl Stream<Item = Result<R, ProviderError>> + Send
where
    R: DeserializeOwned + Send + 'static,
{
    let events = response.bytes_stream().eventsource();

    events
        .take_while(|event| {
            let done = matches!(event, Ok(event) if event.data == "[DONE]");
            futures_util::future::ready(!done)
        })
        .filter_map(move |event| {
            let item = match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => Some(serde_json::from_str::<R>(&event.data).map_err(|err| {
                    ProviderError::Response(format!(
                        "{provider} stream chunk is not valid JSON: {err}"
                    ))
                })),
                Err(EventStreamError::Utf8(err)) => Some(Err(ProviderError::Response(format!(
                    "{provider} stream contained invalid UTF-8: {err}"
                )))),
                Err(EventStreamError::Parser(err)) => Some(Err(ProviderError::Response(format!(
                    "{provider} stream contained invalid event data: {err}"
                )))),
                Err(EventStreamError::Transport(err)) => {
                    Some(Err(ProviderError::Request(err.to_string())))
                }
            };
            futures_util::future::ready(item)
        })
}
