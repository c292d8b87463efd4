//! Application state owned by the delivery controller.

use std::collections::HashSet;

use parlor_config::ApiSettings;

use crate::conversation::ConversationState;
use crate::knowledge::KnowledgeLibrary;
use crate::reveal::RevealCancel;

/// Which characters have a reply outstanding, and whose indicator shows.
///
/// Several characters may be awaiting at once; the indicator belongs to the
/// most recent one. Releasing a character never clears another's indicator.
#[derive(Debug, Clone, Default)]
pub struct TypingLock {
    typing: Option<String>,
    in_flight: HashSet<String>,
}

impl TypingLock {
    /// Mark `id` as awaiting a reply. `false` if it already was.
    pub fn acquire(&mut self, id: &str) -> bool {
        if !self.in_flight.insert(id.to_string()) {
            return false;
        }
        self.typing = Some(id.to_string());
        true
    }

    /// Clear `id`. Returns whether the indicator was this character's.
    pub fn release(&mut self, id: &str) -> bool {
        self.in_flight.remove(id);
        if self.typing.as_deref() == Some(id) {
            self.typing = None;
            true
        } else {
            false
        }
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }

    pub fn typing_character(&self) -> Option<&str> {
        self.typing.as_deref()
    }
}

/// Everything one controller mutates.
#[derive(Debug)]
pub struct AppState {
    pub settings: ApiSettings,
    pub conversations: ConversationState,
    pub library: KnowledgeLibrary,
    /// The character on screen, if any
    pub active_character: Option<String>,
    pub typing: TypingLock,
    /// Reveal running for the character on screen
    pub reveal: Option<RevealCancel>,
}

impl AppState {
    pub fn new(settings: ApiSettings, conversations: ConversationState, library: KnowledgeLibrary) -> Self {
        Self {
            settings,
            conversations,
            library,
            active_character: None,
            typing: TypingLock::default(),
            reveal: None,
        }
    }

    pub fn is_viewing(&self, id: &str) -> bool {
        self.active_character.as_deref() == Some(id)
    }
}
