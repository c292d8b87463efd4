//! Provider adapter: canonical message list in, reply text out.
//!
//! The adapter classifies the endpoint once per call, hands the resulting
//! [`ProviderKind`] to the matching codec for both the request and the reply,
//! and sends the request through the injected [`Transport`].

use std::sync::{Arc, Mutex};

use parlor_config::ApiSettings;
use parlor_core::error::ProviderError;
use parlor_core::message::{ChatMessage, Role};
use parlor_core::provider::{ProviderKind, Transport, WireRequest};
use tracing::{debug, warn};

use crate::token::estimate_tokens;
use crate::{anthropic, gemini, openai_compat};

/// The last outgoing request body, kept for the diagnostics view.
#[derive(Debug, Clone)]
pub struct RequestLog {
    pub provider: ProviderKind,
    /// Pretty-printed JSON body
    pub body: String,
    pub tokens: usize,
}

/// Translates between the canonical message list and vendor wire shapes.
pub struct ProviderAdapter {
    transport: Arc<dyn Transport>,
    last_request: Mutex<Option<RequestLog>>,
}

impl ProviderAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            last_request: Mutex::new(None),
        }
    }

    /// Build the vendor request for `kind`.
    pub fn build_request(kind: ProviderKind, messages: &[ChatMessage], settings: &ApiSettings) -> WireRequest {
        match kind {
            ProviderKind::ClaudeLike => anthropic::build_request(messages, settings),
            ProviderKind::GeminiLike => gemini::build_request(messages, settings),
            ProviderKind::OpenAiLike => openai_compat::build_request(messages, settings),
        }
    }

    /// Extract the reply text from a successful response body.
    pub fn parse_reply(kind: ProviderKind, body: &str) -> Result<String, ProviderError> {
        match kind {
            ProviderKind::ClaudeLike => anthropic::parse_reply(body),
            ProviderKind::GeminiLike => gemini::parse_reply(body),
            ProviderKind::OpenAiLike => openai_compat::parse_reply(body),
        }
    }

    /// Send `messages` to the configured endpoint and return the trimmed reply.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        settings: &ApiSettings,
    ) -> std::result::Result<String, ProviderError> {
        settings
            .validate_for_send()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;

        let kind = ProviderKind::identify(&settings.api_url);
        let request = Self::build_request(kind, messages, settings);
        self.record(kind, &request);

        debug!(
            provider = %kind,
            model = %settings.model,
            messages = messages.len(),
            "Sending completion request"
        );

        let response = self.transport.execute(request).await?;

        if !response.is_success() {
            warn!(provider = %kind, status = response.status, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: response.status,
                message: response.body,
            });
        }

        Self::parse_reply(kind, &response.body)
    }

    /// List model ids offered by an OpenAI-like endpoint.
    pub async fn list_models(&self, settings: &ApiSettings) -> std::result::Result<Vec<String>, ProviderError> {
        if settings.api_url.trim().is_empty() || settings.api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "model listing needs an endpoint and an API key".into(),
            ));
        }

        let response = self
            .transport
            .execute(openai_compat::models_request(settings))
            .await?;

        if !response.is_success() {
            return Err(ProviderError::ApiError {
                status_code: response.status,
                message: response.body,
            });
        }

        openai_compat::parse_models(&response.body)
    }

    /// The most recent request sent through [`complete`](Self::complete).
    pub fn last_request(&self) -> Option<RequestLog> {
        self.last_request.lock().ok().and_then(|log| log.clone())
    }

    fn record(&self, provider: ProviderKind, request: &WireRequest) {
        let body = request
            .body
            .as_ref()
            .and_then(|b| serde_json::to_string_pretty(b).ok())
            .unwrap_or_default();
        let tokens = estimate_tokens(&body);
        if let Ok(mut slot) = self.last_request.lock() {
            *slot = Some(RequestLog { provider, body, tokens });
        }
    }
}

/// All system entries joined with a blank line.
pub(crate) fn joined_system(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Content of the most recent user entry, or empty.
pub(crate) fn last_user_content(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parlor_core::provider::{HttpMethod, WireResponse};

    /// Replies with a fixed response and remembers what it was sent.
    struct CannedTransport {
        response: WireResponse,
        seen: Mutex<Vec<WireRequest>>,
    }

    impl CannedTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: WireResponse {
                    status,
                    body: body.into(),
                },
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn execute(&self, request: WireRequest) -> Result<WireResponse, ProviderError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn settings() -> ApiSettings {
        ApiSettings {
            api_key: "sk".into(),
            ..ApiSettings::default()
        }
    }

    #[tokio::test]
    async fn complete_returns_trimmed_reply() {
        let transport = CannedTransport::new(200, r#"{"choices":[{"message":{"content":" hey "}}]}"#);
        let adapter = ProviderAdapter::new(transport.clone());

        let reply = adapter
            .complete(&[ChatMessage::user("hi")], &settings())
            .await
            .unwrap();
        assert_eq!(reply, "hey");

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, HttpMethod::Post);

        let log = adapter.last_request().unwrap();
        assert_eq!(log.provider, ProviderKind::OpenAiLike);
        assert!(log.body.contains("\"messages\""));
        assert_eq!(log.tokens, estimate_tokens(&log.body));
    }

    #[tokio::test]
    async fn non_success_surfaces_status_and_body() {
        let transport = CannedTransport::new(401, "Invalid token");
        let adapter = ProviderAdapter::new(transport);

        let err = adapter
            .complete(&[ChatMessage::user("hi")], &settings())
            .await
            .unwrap_err();
        match err {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 401);
                assert_eq!(message, "Invalid token");
            }
            other => panic!("Expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_key_fails_before_network() {
        let transport = CannedTransport::new(200, "{}");
        let adapter = ProviderAdapter::new(transport.clone());

        let err = adapter
            .complete(&[ChatMessage::user("hi")], &ApiSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(transport.seen.lock().unwrap().is_empty());
        assert!(adapter.last_request().is_none());
    }

    #[tokio::test]
    async fn endpoint_decides_codec() {
        let transport = CannedTransport::new(200, r#"{"content":[{"text":"claude says"}]}"#);
        let adapter = ProviderAdapter::new(transport.clone());
        let settings = ApiSettings {
            api_url: "https://api.anthropic.com/v1/messages".into(),
            ..settings()
        };

        let reply = adapter
            .complete(
                &[ChatMessage::system("s"), ChatMessage::user("a"), ChatMessage::assistant("b"), ChatMessage::user("c")],
                &settings,
            )
            .await
            .unwrap();
        assert_eq!(reply, "claude says");

        let seen = transport.seen.lock().unwrap();
        let body = seen[0].body.as_ref().unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["system"], "s");
    }

    #[tokio::test]
    async fn lists_models() {
        let transport = CannedTransport::new(200, r#"{"object":"list","data":[{"id":"m1"},{"id":"m2"}]}"#);
        let adapter = ProviderAdapter::new(transport.clone());

        let models = adapter.list_models(&settings()).await.unwrap();
        assert_eq!(models, vec!["m1", "m2"]);
        assert!(transport.seen.lock().unwrap()[0].url.ends_with("/v1/models"));
    }

    #[test]
    fn last_user_content_empty_without_user() {
        assert_eq!(last_user_content(&[ChatMessage::system("s")]), "");
    }
}
