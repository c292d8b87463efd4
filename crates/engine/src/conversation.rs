//! Per-character message logs and the visible window over them.
//!
//! History indices are stable: appends take `len - 1`, edits never move an
//! entry, and a delete shifts later entries, so callers re-read the window
//! after one.

use parlor_core::character::Character;
use parlor_core::message::{Message, Role, split_timestamp_prefix};
use serde::Serialize;
use tracing::debug;

use crate::error::ConversationError;

/// One displayable history entry tagged with its index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowEntry {
    pub index: usize,
    pub role: Role,
    pub timestamp: Option<String>,
    /// Text as shown (timestamp prefix removed for user turns)
    pub display: String,
    /// `display` split on blank lines
    pub paragraphs: Vec<String>,
}

/// The most recent slice of a history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    /// First history index covered by the slice
    pub start_index: usize,
    pub entries: Vec<WindowEntry>,
    /// Older messages exist before `start_index`
    pub has_more: bool,
}

/// Materialized window sizes before and after a "load more".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMore {
    pub old: usize,
    pub new: usize,
}

impl LoadMore {
    /// Number of older messages that became visible.
    pub fn revealed(&self) -> usize {
        self.new - self.old
    }
}

/// All characters plus the visible count of the open conversation.
#[derive(Debug, Clone)]
pub struct ConversationState {
    characters: Vec<Character>,
    page_size: usize,
    visible: usize,
}

impl ConversationState {
    pub fn new(characters: Vec<Character>, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            characters,
            page_size,
            visible: page_size,
        }
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn character(&self, id: &str) -> Result<&Character, ConversationError> {
        self.characters
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ConversationError::UnknownCharacter(id.to_string()))
    }

    fn character_mut(&mut self, id: &str) -> Result<&mut Character, ConversationError> {
        self.characters
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ConversationError::UnknownCharacter(id.to_string()))
    }

    /// Find a character by id, or by name case-insensitively.
    pub fn find(&self, id_or_name: &str) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.id == id_or_name)
            .or_else(|| {
                self.characters
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(id_or_name))
            })
    }

    /// Push `message` onto the character's history, returning its index.
    pub fn append(&mut self, id: &str, message: Message) -> Result<usize, ConversationError> {
        let character = self.character_mut(id)?;
        character.history.push(message);
        let index = character.history.len() - 1;
        debug!(character = %id, index, "Appended message");
        Ok(index)
    }

    /// Replace the text at `index`, keeping any `[Mon.D HH:MM] ` prefix.
    ///
    /// Returns `false` (and changes nothing) when `new_text` is blank or
    /// equal to the current body.
    pub fn edit_at(&mut self, id: &str, index: usize, new_text: &str) -> Result<bool, ConversationError> {
        let character = self.character_mut(id)?;
        let len = character.history.len();
        let message = character
            .history
            .get_mut(index)
            .ok_or(ConversationError::IndexOutOfRange { index, len })?;

        let new_text = new_text.trim();
        let (prefix, body) = split_timestamp_prefix(&message.content);
        if new_text.is_empty() || new_text == body {
            return Ok(false);
        }
        message.content = format!("{prefix}{new_text}");
        Ok(true)
    }

    /// Remove exactly the entry at `index`.
    pub fn delete_at(&mut self, id: &str, index: usize) -> Result<Message, ConversationError> {
        let character = self.character_mut(id)?;
        let len = character.history.len();
        if index >= len {
            return Err(ConversationError::IndexOutOfRange { index, len });
        }
        Ok(character.history.remove(index))
    }

    /// Pop assistant messages off the end. Returns how many were removed.
    pub fn truncate_trailing_assistant(&mut self, id: &str) -> Result<usize, ConversationError> {
        let character = self.character_mut(id)?;
        let mut removed = 0;
        while character
            .history
            .last()
            .is_some_and(|m| m.role == Role::Assistant)
        {
            character.history.pop();
            removed += 1;
        }
        Ok(removed)
    }

    /// Make history[0] the character's current persona.
    ///
    /// An existing leading system message is replaced, never duplicated.
    pub fn set_persona(&mut self, id: &str) -> Result<(), ConversationError> {
        let character = self.character_mut(id)?;
        let persona = Message::system(character.persona.clone());
        match character.history.first_mut() {
            Some(first) if first.role == Role::System => *first = persona,
            _ => character.history.insert(0, persona),
        }
        Ok(())
    }

    pub fn set_unread(&mut self, id: &str, unread: bool) -> Result<(), ConversationError> {
        self.character_mut(id)?.unread = unread;
        Ok(())
    }

    /// The visible slice of the character's history.
    pub fn window(&self, id: &str) -> Result<Window, ConversationError> {
        let character = self.character(id)?;
        let len = character.history.len();
        let start_index = len.saturating_sub(self.visible);

        let entries = character.history[start_index..]
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role != Role::System)
            .filter_map(|(offset, m)| {
                let display = m.display_text();
                if display.trim().is_empty() {
                    return None;
                }
                Some(WindowEntry {
                    index: start_index + offset,
                    role: m.role,
                    timestamp: m.timestamp.clone(),
                    paragraphs: m.paragraphs(),
                    display,
                })
            })
            .collect();

        let has_more = character.history[..start_index]
            .iter()
            .any(|m| m.role != Role::System);

        Ok(Window {
            start_index,
            entries,
            has_more,
        })
    }

    /// Grow the window by one page.
    pub fn load_more(&mut self, id: &str) -> Result<LoadMore, ConversationError> {
        let len = self.character(id)?.history.len();
        let old = len.min(self.visible);
        self.visible += self.page_size;
        let new = len.min(self.visible);
        debug!(character = %id, old, new, "Loaded older messages");
        Ok(LoadMore { old, new })
    }

    /// Back to one page, as when a conversation is entered.
    pub fn reset_window(&mut self) {
        self.visible = self.page_size;
    }

    pub fn visible_count(&self) -> usize {
        self.visible
    }
}
