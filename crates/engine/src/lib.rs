//! # Parlor Engine
//!
//! Everything between the user pressing send and the reply being revealed:
//!
//! - `knowledge`: keyword-triggered background text and book management
//! - `conversation`: per-character logs and the visible window
//! - `context`: the canonical message list for one exchange
//! - `delivery`: the send/reroll state machine, typing lock and unread flag
//! - `reveal`: paced paragraph-by-paragraph display of a reply

pub mod context;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod knowledge;
pub mod reveal;
pub mod state;

pub use context::ContextAssembler;
pub use conversation::{ConversationState, LoadMore, Window, WindowEntry};
pub use delivery::{ConversationView, DeliveryController, DeliveryOutcome};
pub use error::{ConversationError, DeliveryError, KnowledgeError};
pub use knowledge::{EntryDraft, KnowledgeLibrary, KnowledgeScanner, export_tavern, import_tavern};
pub use reveal::{RevealCancel, RevealPlan, RevealStep};
pub use state::{AppState, TypingLock};
