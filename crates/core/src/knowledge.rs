//! Knowledge books: conditionally injected background text.
//!
//! A book is scoped either to every character or to exactly one. Its entries
//! fire on keyword match or unconditionally (`constant`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label given to entries saved without a label or any key.
pub const UNNAMED_ENTRY_LABEL: &str = "Untitled entry";

/// Which characters a book applies to.
///
/// Persisted as a `characterId` string where the empty string means global.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookScope {
    #[default]
    Global,
    Character(String),
}

impl BookScope {
    /// Whether a book with this scope is a candidate for `character_id`.
    pub fn applies_to(&self, character_id: &str) -> bool {
        match self {
            BookScope::Global => true,
            BookScope::Character(id) => id == character_id,
        }
    }
}

impl From<String> for BookScope {
    fn from(id: String) -> Self {
        if id.trim().is_empty() {
            BookScope::Global
        } else {
            BookScope::Character(id)
        }
    }
}

impl From<BookScope> for String {
    fn from(scope: BookScope) -> Self {
        match scope {
            BookScope::Global => String::new(),
            BookScope::Character(id) => id,
        }
    }
}

/// A named, scoped collection of knowledge entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBook {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "characterId")]
    pub scope: BookScope,

    #[serde(default)]
    pub entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBook {
    /// Create an empty global book.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: format!("book_{}", Uuid::new_v4().simple()),
            name: name.into(),
            scope: BookScope::Global,
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, uid: &str) -> Option<&KnowledgeEntry> {
        self.entries.iter().find(|e| e.uid == uid)
    }
}

/// A snippet injected when one of its keys appears in the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique within the book; never changes after creation
    pub uid: String,

    #[serde(default)]
    pub keys: Vec<String>,

    #[serde(default)]
    pub content: String,

    /// Always injected, regardless of keys
    #[serde(default)]
    pub constant: bool,

    /// Editor-facing name
    #[serde(default, alias = "comment")]
    pub label: String,
}

impl KnowledgeEntry {
    /// Create an entry with a fresh uid and a resolved label.
    pub fn new(keys: Vec<String>, content: impl Into<String>, constant: bool, label: Option<&str>) -> Self {
        let label = resolve_label(label, None, &keys);
        Self {
            uid: Uuid::new_v4().simple().to_string(),
            keys,
            content: content.into(),
            constant,
            label,
        }
    }
}

/// Pick an entry label: the requested one, else the existing one, else the
/// first key, else [`UNNAMED_ENTRY_LABEL`]. Never returns an empty string.
pub fn resolve_label(requested: Option<&str>, existing: Option<&str>, keys: &[String]) -> String {
    [requested, existing, keys.first().map(String::as_str)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNNAMED_ENTRY_LABEL)
        .to_string()
}

/// Parse a comma-separated key list. Accepts ASCII and full-width commas.
pub fn parse_keys(raw: &str) -> Vec<String> {
    raw.split([',', '，'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
