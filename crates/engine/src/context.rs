//! Context assembly: the canonical message list sent for one exchange.
//!
//! Fixed order:
//!
//! 1. Platform directive (system)
//! 2. Character persona (system)
//! 3. Triggered knowledge, when any entry fired (system)
//! 4. The most recent non-system turns, timestamp prefixes kept verbatim
//!
//! Assembly is deterministic: the same character, text and books always
//! produce the same list.

use parlor_config::{ContextConfig, KnowledgeConfig};
use parlor_core::character::Character;
use parlor_core::knowledge::KnowledgeBook;
use parlor_core::message::ChatMessage;
use tracing::debug;

use crate::knowledge::KnowledgeScanner;

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    directive: String,
    persona_heading: String,
    knowledge_heading: String,
    history_turns: usize,
    scanner: KnowledgeScanner,
}

impl ContextAssembler {
    pub fn new(context: &ContextConfig, knowledge: &KnowledgeConfig) -> Self {
        Self {
            directive: context.directive.clone(),
            persona_heading: context.persona_heading.clone(),
            knowledge_heading: context.knowledge_heading.clone(),
            history_turns: context.history_turns,
            scanner: KnowledgeScanner::new(knowledge),
        }
    }

    /// Override how many history turns are forwarded.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn scanner(&self) -> &KnowledgeScanner {
        &self.scanner
    }

    /// Build the message list for `character` replying to `user_text`.
    ///
    /// `user_text` only drives the knowledge scan; the turn itself must
    /// already be in the history.
    pub fn build(
        &self,
        character: &Character,
        user_text: &str,
        books: &[KnowledgeBook],
    ) -> Vec<ChatMessage> {
        let turns: Vec<ChatMessage> = character.turns().map(|(_, m)| m.to_chat()).collect();
        let skip = turns.len().saturating_sub(self.history_turns);
        let recent = &turns[skip..];

        let mut messages = Vec::with_capacity(recent.len() + 3);
        messages.push(ChatMessage::system(self.directive.clone()));
        messages.push(ChatMessage::system(format!(
            "{}\n{}",
            self.persona_heading, character.persona
        )));

        let knowledge = self
            .scanner
            .scan(books, user_text, recent, &character.id, &character.name);
        if let Some(knowledge) = &knowledge {
            messages.push(ChatMessage::system(format!(
                "{}\n{}",
                self.knowledge_heading, knowledge
            )));
        }

        messages.extend_from_slice(recent);

        debug!(
            character = %character.id,
            turns = recent.len(),
            knowledge = knowledge.is_some(),
            "Assembled context"
        );
        messages
    }
}
