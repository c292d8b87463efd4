//! Anthropic Messages API codec.
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Single-turn: only the latest user message is sent

use parlor_config::ApiSettings;
use parlor_core::error::ProviderError;
use parlor_core::message::ChatMessage;
use parlor_core::provider::{HttpMethod, WireRequest};
use serde::{Deserialize, Serialize};

use crate::adapter::{joined_system, last_user_content};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) fn build_request(messages: &[ChatMessage], settings: &ApiSettings) -> WireRequest {
    let body = MessagesRequest {
        model: &settings.model,
        system: joined_system(messages),
        messages: vec![AnthropicMessage {
            role: "user",
            content: last_user_content(messages),
        }],
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    };

    WireRequest {
        method: HttpMethod::Post,
        url: settings.api_url.clone(),
        headers: vec![
            ("Content-Type".into(), "application/json".into()),
            ("x-api-key".into(), settings.api_key.clone()),
            ("anthropic-version".into(), ANTHROPIC_VERSION.into()),
        ],
        body: serde_json::to_value(&body).ok(),
    }
}

pub(crate) fn parse_reply(body: &str) -> Result<String, ProviderError> {
    let resp: AnthropicResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::MalformedResponse(format!("Failed to parse Anthropic response: {e}"))
    })?;

    resp.content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| ProviderError::MalformedResponse("No content[0].text in Anthropic response".into()))
}

// --- API types ---

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: String,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ApiSettings {
        ApiSettings {
            api_url: "https://api.anthropic.com/v1/messages".into(),
            api_key: "ak".into(),
            model: "claude-sonnet".into(),
            ..ApiSettings::default()
        }
    }

    #[test]
    fn single_turn_reduction() {
        let messages = vec![
            ChatMessage::system("directive"),
            ChatMessage::system("persona"),
            ChatMessage::system("knowledge"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ];
        let req = build_request(&messages, &settings());
        let body = req.body.clone().unwrap();

        assert_eq!(body["system"], "directive\n\npersona\n\nknowledge");
        let sent = body["messages"].as_array().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["role"], "user");
        assert_eq!(sent[0]["content"], "second");
        assert_eq!(body["max_tokens"], 60000);

        assert_eq!(req.header("x-api-key"), Some("ak"));
        assert_eq!(req.header("anthropic-version"), Some("2023-06-01"));
        assert!(req.header("authorization").is_none());
    }

    #[test]
    fn parses_first_content_block() {
        let body = r#"{"content":[{"type":"text","text":" bonjour "}],"stop_reason":"end_turn"}"#;
        assert_eq!(parse_reply(body).unwrap(), "bonjour");
    }

    #[test]
    fn empty_content_is_malformed() {
        assert!(matches!(
            parse_reply(r#"{"content":[]}"#),
            Err(ProviderError::MalformedResponse(_))
        ));
    }
}
