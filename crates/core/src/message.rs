//! Message domain types.
//!
//! `Message` is what a character's history stores; `ChatMessage` is the
//! provider-agnostic `{role, content}` pair that the context assembler emits
//! and the provider adapter translates into a vendor wire shape.
//!
//! User turns carry a display timestamp both as a field and as a
//! `[Mon.D HH:MM] ` prefix embedded in the content. The prefix is data: it is
//! sent to the model verbatim and survives edits.

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[[A-Z][a-z]{2}\.\d{1,2}\s\d{2}:\d{2}\]\s").expect("valid timestamp pattern")
});

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph pattern"));

static QUOTE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\n)>\s*").expect("valid quote pattern"));

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona and platform instructions
    System,
    /// The end user
    User,
    /// The model speaking as the character
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single entry in a character's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredMessage")]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content (user turns include the timestamp prefix)
    pub content: String,

    /// Display timestamp in `Mon.D HH:MM` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Message {
    /// Create a persona/system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Create a user message stamped with `timestamp`.
    ///
    /// The content becomes `[timestamp] text`.
    pub fn user(text: &str, timestamp: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        Self {
            role: Role::User,
            content: format!("[{timestamp}] {text}"),
            timestamp: Some(timestamp),
        }
    }

    /// Create an assistant reply.
    pub fn assistant(content: impl Into<String>, timestamp: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
        }
    }

    /// Content with any timestamp prefix removed.
    pub fn body(&self) -> &str {
        strip_timestamp_prefix(&self.content)
    }

    /// Text as the renderer should show it.
    ///
    /// User turns lose their timestamp prefix; assistant turns have
    /// line-leading `>` quote markers turned into paragraph breaks.
    pub fn display_text(&self) -> String {
        match self.role {
            Role::User => self.body().to_string(),
            Role::Assistant => QUOTE_MARKER.replace_all(&self.content, "\n\n").into_owned(),
            Role::System => self.content.clone(),
        }
    }

    /// Display text split into reveal/bubble units.
    pub fn paragraphs(&self) -> Vec<String> {
        paragraphs(&self.display_text())
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// The canonical `{role, content}` pair for this message.
    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Persisted shape of a history entry.
///
/// Older data stored bare strings; those, like records with a missing or
/// unknown role, are read as user turns. A null content reads as empty.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredMessage {
    Record {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    Bare(String),
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        match stored {
            StoredMessage::Record {
                role,
                content,
                timestamp,
            } => Self {
                role: match role.as_deref() {
                    Some("assistant") => Role::Assistant,
                    Some("system") => Role::System,
                    _ => Role::User,
                },
                content: content.unwrap_or_default(),
                timestamp,
            },
            StoredMessage::Bare(content) => Self {
                role: Role::User,
                content,
                timestamp: None,
            },
        }
    }
}

/// A provider-agnostic message: the unit of the canonical message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Format a display timestamp such as `Dec.14 16:39`.
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format("%b.%-d %H:%M").to_string()
}

/// Display timestamp for the current local time.
pub fn timestamp_now() -> String {
    format_timestamp(Local::now())
}

/// Split `content` into its timestamp prefix (possibly empty) and body.
pub fn split_timestamp_prefix(content: &str) -> (&str, &str) {
    match TIMESTAMP_PREFIX.find(content) {
        Some(m) => content.split_at(m.end()),
        None => ("", content),
    }
}

/// Remove a leading `[Mon.D HH:MM] ` prefix if present.
pub fn strip_timestamp_prefix(content: &str) -> &str {
    split_timestamp_prefix(content).1
}

/// Split text on blank-line boundaries, dropping empty paragraphs.
///
/// Text with no blank line is a single paragraph.
pub fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Plain text for the clipboard: timestamp prefix and markdown markers removed,
/// line breaks kept.
pub fn plain_text(content: &str) -> String {
    static QUOTE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^>\s*").expect("valid quote pattern"));
    static HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#+\s+").expect("valid heading pattern"));
    static BULLET: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^\*\s+").expect("valid bullet pattern"));

    let body = strip_timestamp_prefix(content);
    let text = QUOTE.replace_all(body, "");
    let text = HEADING.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    text.replace(['*', '`'], "")
}
