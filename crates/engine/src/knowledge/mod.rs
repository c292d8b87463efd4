//! Knowledge base: conditional background text injected into requests.
//!
//! - `scan` decides which entries fire for an exchange
//! - `library` manages books and entries for editing
//! - `tavern` converts to and from SillyTavern world-info files

pub mod library;
pub mod scan;
pub mod tavern;

pub use library::{EntryDraft, KnowledgeLibrary};
pub use scan::KnowledgeScanner;
pub use tavern::{export_tavern, import_tavern};
