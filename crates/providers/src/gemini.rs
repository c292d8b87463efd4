//! Google Generative Language API codec.
//!
//! The key travels in the query string and the model in the path, unless the
//! configured URL already names the `:generateContent` method.

use parlor_config::ApiSettings;
use parlor_core::error::ProviderError;
use parlor_core::message::ChatMessage;
use parlor_core::provider::{HttpMethod, WireRequest};
use serde::{Deserialize, Serialize};

use crate::adapter::{joined_system, last_user_content};

const GENERATE_SUFFIX: &str = ":generateContent";

fn endpoint(settings: &ApiSettings) -> String {
    if settings.api_url.ends_with(GENERATE_SUFFIX) {
        settings.api_url.clone()
    } else {
        format!(
            "{}/{}{GENERATE_SUFFIX}?key={}",
            settings.api_url, settings.model, settings.api_key
        )
    }
}

pub(crate) fn build_request(messages: &[ChatMessage], settings: &ApiSettings) -> WireRequest {
    let body = GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part {
                text: last_user_content(messages).to_string(),
            }],
        }],
        system_instruction: Instruction {
            parts: vec![Part {
                text: joined_system(messages),
            }],
        },
        generation_config: GenerationConfig {
            temperature: settings.temperature,
            max_output_tokens: settings.max_tokens,
        },
    };

    WireRequest {
        method: HttpMethod::Post,
        url: endpoint(settings),
        headers: vec![("Content-Type".into(), "application/json".into())],
        body: serde_json::to_value(&body).ok(),
    }
}

pub(crate) fn parse_reply(body: &str) -> Result<String, ProviderError> {
    let resp: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::MalformedResponse(format!("Failed to parse Gemini response: {e}"))
    })?;

    resp.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| {
            ProviderError::MalformedResponse("No candidates[0].content.parts[0].text in Gemini response".into())
        })
}

// --- API types ---

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Instruction,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Instruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
