//! Provider classification and the network collaborator contract.
//!
//! A `ProviderKind` is derived once from the endpoint URL and threaded through
//! request building and reply parsing. The `Transport` trait is the only place
//! bytes leave the process; implementations live in `parlor-providers`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// The wire dialect an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Chat-completions style: OpenAI, SiliconFlow, DeepSeek, OpenRouter, Ollama, ...
    #[default]
    OpenAiLike,
    /// Anthropic Messages API
    ClaudeLike,
    /// Google Generative Language API
    GeminiLike,
}

impl ProviderKind {
    /// Classify an endpoint by URL. Unknown endpoints are OpenAI-like.
    pub fn identify(endpoint_url: &str) -> Self {
        if endpoint_url.contains("anthropic") {
            ProviderKind::ClaudeLike
        } else if endpoint_url.contains("googleapis") {
            ProviderKind::GeminiLike
        } else {
            ProviderKind::OpenAiLike
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiLike => "openai",
            ProviderKind::ClaudeLike => "claude",
            ProviderKind::GeminiLike => "gemini",
        }
    }

    /// Whether the wire body carries only the latest user turn.
    pub fn is_single_turn(&self) -> bool {
        !matches!(self, ProviderKind::OpenAiLike)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully built HTTP request: everything the transport needs, nothing more.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON body; `None` for GET
    pub body: Option<serde_json::Value>,
}

impl WireRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The raw outcome of a request that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The network collaborator.
///
/// Returns `Err` only when no response was obtained at all; non-2xx statuses
/// come back as a `WireResponse` for the adapter to classify.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: WireRequest) -> std::result::Result<WireResponse, ProviderError>;
}
