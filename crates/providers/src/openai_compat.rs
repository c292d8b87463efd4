//! OpenAI-compatible chat completions codec.
//!
//! Works with any endpoint that speaks the `/v1/chat/completions` shape:
//! OpenAI, SiliconFlow, DeepSeek, OpenRouter, Ollama, and most proxies.
//! The canonical message list is forwarded as-is.

use parlor_config::ApiSettings;
use parlor_core::error::ProviderError;
use parlor_core::message::ChatMessage;
use parlor_core::provider::{HttpMethod, WireRequest};
use serde::{Deserialize, Serialize};

pub(crate) fn build_request(messages: &[ChatMessage], settings: &ApiSettings) -> WireRequest {
    let body = ChatRequest {
        model: &settings.model,
        messages: messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };

    WireRequest {
        method: HttpMethod::Post,
        url: settings.api_url.clone(),
        headers: vec![
            ("Content-Type".into(), "application/json".into()),
            ("Authorization".into(), format!("Bearer {}", settings.api_key)),
        ],
        body: serde_json::to_value(&body).ok(),
    }
}

pub(crate) fn parse_reply(body: &str) -> Result<String, ProviderError> {
    let resp: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| ProviderError::MalformedResponse("No choices[0].message.content in response".into()))
}

/// `…/chat/completions` becomes `…/models`; other URLs are used as given.
pub(crate) fn models_request(settings: &ApiSettings) -> WireRequest {
    let url = match settings.api_url.strip_suffix("/chat/completions") {
        Some(base) => format!("{base}/models"),
        None => settings.api_url.clone(),
    };
    WireRequest {
        method: HttpMethod::Get,
        url,
        headers: vec![("Authorization".into(), format!("Bearer {}", settings.api_key))],
        body: None,
    }
}

pub(crate) fn parse_models(body: &str) -> Result<Vec<String>, ProviderError> {
    let resp: ModelsResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse model list: {e}")))?;
    Ok(resp.data.into_iter().map(|m| m.id).collect())
}

// --- API types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}
