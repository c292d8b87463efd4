//! Keyword scan: which entries fire for this exchange.

use parlor_config::KnowledgeConfig;
use parlor_core::knowledge::{KnowledgeBook, KnowledgeEntry};
use parlor_core::message::ChatMessage;
use regex_lite::{NoExpand, Regex};
use std::sync::LazyLock;

static USER_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\{user\}\}").expect("valid placeholder pattern"));
static CHAR_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\{char\}\}").expect("valid placeholder pattern"));

/// Evaluates knowledge books against the current exchange.
///
/// Pure and deterministic: the same books, text and history always produce
/// the same output.
#[derive(Debug, Clone)]
pub struct KnowledgeScanner {
    scan_turns: usize,
    user_label: String,
    character_label: String,
}

impl KnowledgeScanner {
    pub fn new(config: &KnowledgeConfig) -> Self {
        Self {
            scan_turns: config.scan_turns,
            user_label: config.user_label.clone(),
            character_label: config.character_label.clone(),
        }
    }

    /// Triggered entry contents joined by a blank line, or `None`.
    ///
    /// Only books scoped globally or to `character_id` are considered. Keys
    /// are matched case-insensitively against `user_text` plus the last few
    /// turns of `recent_history`.
    pub fn scan(
        &self,
        books: &[KnowledgeBook],
        user_text: &str,
        recent_history: &[ChatMessage],
        character_id: &str,
        character_name: &str,
    ) -> Option<String> {
        if books.is_empty() {
            return None;
        }

        let context_text = self.context_text(user_text, recent_history);
        let char_label = if character_name.is_empty() {
            self.character_label.as_str()
        } else {
            character_name
        };

        let triggered: Vec<String> = books
            .iter()
            .filter(|book| book.scope.applies_to(character_id))
            .flat_map(|book| book.entries.iter())
            .filter(|entry| !entry.content.is_empty() && triggers(entry, &context_text))
            .map(|entry| self.substitute(&entry.content, char_label))
            .collect();

        if triggered.is_empty() {
            None
        } else {
            Some(triggered.join("\n\n"))
        }
    }

    fn context_text(&self, user_text: &str, recent_history: &[ChatMessage]) -> String {
        let skip = recent_history.len().saturating_sub(self.scan_turns);
        let tail: Vec<&str> = recent_history[skip..]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        format!("{user_text}\n{}", tail.join("\n")).to_lowercase()
    }

    fn substitute(&self, content: &str, char_label: &str) -> String {
        let with_user = USER_PLACEHOLDER.replace_all(content, NoExpand(&self.user_label));
        CHAR_PLACEHOLDER
            .replace_all(&with_user, NoExpand(char_label))
            .into_owned()
    }
}

fn triggers(entry: &KnowledgeEntry, context_text: &str) -> bool {
    entry.constant
        || entry.keys.iter().any(|key| {
            let key = key.trim().to_lowercase();
            !key.is_empty() && context_text.contains(&key)
        })
}
