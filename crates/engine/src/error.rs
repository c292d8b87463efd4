//! Engine error types.
//!
//! Rejections (nothing happened) are errors; a provider failure after the
//! cycle started is not, it comes back as a `DeliveryOutcome::Failed`.

use parlor_config::ConfigError;
use parlor_core::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("At least one knowledge book must remain")]
    LastBook,

    #[error("No knowledge book with id '{0}'")]
    UnknownBook(String),

    #[error("No entry with uid '{0}' in the current book")]
    UnknownEntry(String),

    #[error("An entry needs content or at least one key")]
    EmptyEntry,

    #[error("Book name cannot be empty")]
    EmptyName,

    #[error("Not a knowledge book file: {0}")]
    InvalidImport(String),
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("No character with id '{0}'")]
    UnknownCharacter(String),

    #[error("Message index {index} out of range (history has {len} messages)")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Endpoint, key or model missing; nothing was appended or sent.
    #[error(transparent)]
    NotConfigured(#[from] ConfigError),

    #[error("Nothing to send")]
    EmptyInput,

    /// A reply for this character is still outstanding.
    #[error("Still waiting for a reply from '{0}'")]
    Busy(String),

    #[error("No earlier message to reroll")]
    NothingToReroll,

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
