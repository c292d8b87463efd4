//! LLM vendor codecs for Parlor.
//!
//! One codec per wire dialect (OpenAI-like, Claude-like, Gemini-like). The
//! [`ProviderAdapter`] picks the codec from the endpoint URL and talks to the
//! network through a `parlor_core::Transport`.

pub mod adapter;
mod anthropic;
mod gemini;
pub mod http;
mod openai_compat;
pub mod token;

pub use adapter::{ProviderAdapter, RequestLog};
pub use http::ReqwestTransport;
pub use token::estimate_tokens;
