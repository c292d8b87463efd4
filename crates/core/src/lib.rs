//! # Parlor Core
//!
//! Domain types, collaborator traits, and error definitions for the Parlor
//! character-chat engine. Every other crate depends inward on this one.
//!
//! - Characters and their message logs
//! - Knowledge books and entries
//! - The provider tag and the network `Transport` contract
//! - The persistent `KeyValueStore` contract
//! - The event bus renderers subscribe to

pub mod character;
pub mod error;
pub mod event;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use character::Character;
pub use error::{Error, ImportError, ProviderError, Result, StoreError};
pub use event::{DomainEvent, EventBus, NoticeLevel};
pub use knowledge::{BookScope, KnowledgeBook, KnowledgeEntry};
pub use message::{ChatMessage, Message, Role};
pub use provider::{HttpMethod, ProviderKind, Transport, WireRequest, WireResponse};
pub use store::KeyValueStore;
