//! Characters: a persona plus the chat log kept with it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, Role};

/// A user-defined character the model speaks as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Stable identifier
    pub id: String,

    /// Display name, also substituted for `{{char}}` in knowledge entries
    #[serde(default)]
    pub name: String,

    /// Emoji, URL or data URI; opaque to the engine
    #[serde(default)]
    pub avatar: String,

    /// Persona text sent as the character's system message
    #[serde(default, alias = "prompt")]
    pub persona: String,

    /// Full chat log. Index 0, when it is a system message, is the persona.
    #[serde(default)]
    pub history: Vec<Message>,

    /// A reply arrived while the user was looking elsewhere
    #[serde(default, alias = "hasNewMsg")]
    pub unread: bool,
}

impl Character {
    /// Create a character with an empty history.
    pub fn new(name: impl Into<String>, avatar: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            avatar: avatar.into(),
            persona: persona.into(),
            history: Vec::new(),
            unread: false,
        }
    }

    /// Non-system history entries paired with their stable index.
    pub fn turns(&self) -> impl Iterator<Item = (usize, &Message)> {
        self.history
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role != Role::System)
    }

    /// Whether any assistant reply exists (enables reroll).
    pub fn has_reply(&self) -> bool {
        self.history.iter().any(|m| m.role == Role::Assistant)
    }

    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.history.iter().rev().find(|m| m.role == Role::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_field_names_are_accepted() {
        let json = r#"{
            "id": "1700000000000",
            "name": "Mina",
            "avatar": "😊",
            "prompt": "You are Mina.",
            "hasNewMsg": true,
            "history": [{"role": "system", "content": "You are Mina."}, "hey"]
        }"#;
        let c: Character = serde_json::from_str(json).unwrap();
        assert_eq!(c.persona, "You are Mina.");
        assert!(c.unread);
        assert_eq!(c.history.len(), 2);
        assert_eq!(c.turns().count(), 1);
    }

    #[test]
    fn missing_fields_default() {
        let c: Character = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(c.name.is_empty());
        assert!(c.history.is_empty());
        assert!(!c.has_reply());
        assert!(c.last_user_message().is_none());
    }
}
