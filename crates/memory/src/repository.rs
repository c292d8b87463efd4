//! Typed access to the three persisted records.
//!
//! Reads are lenient: anything that cannot be understood is skipped with a
//! warning rather than failing the load. Writes replace the whole record.

use std::sync::Arc;

use parlor_config::ApiSettings;
use parlor_core::character::Character;
use parlor_core::error::StoreError;
use parlor_core::knowledge::{KnowledgeBook, KnowledgeEntry};
use parlor_core::message::{Message, Role};
use parlor_core::store::{KeyValueStore, keys};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_CHARACTER_NAME: &str = "Mako";
const DEFAULT_CHARACTER_AVATAR: &str = "😊";
const DEFAULT_CHARACTER_PERSONA: &str =
    "You are Mako, a gentle and cheerful assistant who sprinkles kaomoji into what you say.";
const DEFAULT_BOOK_NAME: &str = "New knowledge book";

/// Load/save of settings, characters and knowledge books over a [`KeyValueStore`].
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn KeyValueStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Stored settings laid over `defaults`. Stored fields win.
    pub async fn load_settings(&self, defaults: &ApiSettings) -> Result<ApiSettings, StoreError> {
        let Some(stored) = self.store.get(keys::SETTINGS).await? else {
            return Ok(defaults.clone());
        };

        let mut merged = serde_json::to_value(defaults).map_err(|e| corrupted(keys::SETTINGS, e))?;
        match (merged.as_object_mut(), stored) {
            (Some(base), Value::Object(overlay)) => base.extend(overlay),
            (_, other) => {
                warn!(kind = json_kind(&other), "Stored settings are not an object, using defaults");
                return Ok(defaults.clone());
            }
        }

        serde_json::from_value(merged).map_err(|e| corrupted(keys::SETTINGS, e))
    }

    pub async fn save_settings(&self, settings: &ApiSettings) -> Result<(), StoreError> {
        let value = serde_json::to_value(settings).map_err(|e| corrupted(keys::SETTINGS, e))?;
        self.store.set(keys::SETTINGS, value).await
    }

    /// All characters. Seeds one default character when none are stored.
    pub async fn load_characters(&self) -> Result<Vec<Character>, StoreError> {
        let stored = self.store.get(keys::CHARACTERS).await?;
        let mut characters: Vec<Character> = match stored {
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| parse_character(i, item))
                .collect(),
            Some(other) => {
                warn!(kind = json_kind(&other), "Stored characters are not a list, ignoring");
                Vec::new()
            }
            None => Vec::new(),
        };

        if characters.is_empty() {
            debug!("No characters stored, seeding default");
            characters.push(Character::new(
                DEFAULT_CHARACTER_NAME,
                DEFAULT_CHARACTER_AVATAR,
                DEFAULT_CHARACTER_PERSONA,
            ));
        }

        Ok(characters)
    }

    pub async fn save_characters(&self, characters: &[Character]) -> Result<(), StoreError> {
        let value = serde_json::to_value(characters).map_err(|e| corrupted(keys::CHARACTERS, e))?;
        self.store.set(keys::CHARACTERS, value).await
    }

    /// All knowledge books. At least one book is always returned.
    pub async fn load_books(&self) -> Result<Vec<KnowledgeBook>, StoreError> {
        let stored = self.store.get(keys::KNOWLEDGE_BOOKS).await?;
        let mut books: Vec<KnowledgeBook> = match stored {
            Some(Value::Array(items)) => items.into_iter().filter_map(parse_book).collect(),
            Some(other) => {
                warn!(kind = json_kind(&other), "Stored knowledge books are not a list, ignoring");
                Vec::new()
            }
            None => Vec::new(),
        };

        if books.is_empty() {
            books.push(KnowledgeBook::new(DEFAULT_BOOK_NAME));
        }
        Ok(books)
    }

    pub async fn save_books(&self, books: &[KnowledgeBook]) -> Result<(), StoreError> {
        let value = serde_json::to_value(books).map_err(|e| corrupted(keys::KNOWLEDGE_BOOKS, e))?;
        self.store.set(keys::KNOWLEDGE_BOOKS, value).await
    }
}

/// Parse one stored character.
///
/// Only a non-object is skipped. Missing fields take defaults, a numeric id
/// is kept as text, and history entries are read one by one.
fn parse_character(index: usize, value: Value) -> Option<Character> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            warn!(index, kind = json_kind(&other), "Skipping character that is not an object");
            return None;
        }
    };

    let id = match obj.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            warn!(index, "Character has no id, assigning one");
            Uuid::new_v4().to_string()
        }
    };
    let text = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| obj.get(*name).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string()
    };

    let history = match obj.get("history") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(position, item)| {
                let message = parse_message(item);
                if message.is_none() {
                    warn!(character = %id, position, "Skipping unreadable message");
                }
                message
            })
            .collect(),
        _ => Vec::new(),
    };

    Some(Character {
        name: text(&["name"]),
        avatar: text(&["avatar"]),
        persona: text(&["persona", "prompt"]),
        unread: ["unread", "hasNewMsg"]
            .iter()
            .find_map(|name| obj.get(*name).and_then(Value::as_bool))
            .unwrap_or(false),
        history,
        id,
    })
}

/// Read one history entry. Bare strings and unknown roles are user turns.
fn parse_message(value: &Value) -> Option<Message> {
    let obj = match value {
        Value::String(content) => {
            return Some(Message {
                role: Role::User,
                content: content.clone(),
                timestamp: None,
            });
        }
        Value::Object(obj) => obj,
        _ => return None,
    };

    let role = match obj.get("role").and_then(Value::as_str) {
        Some("assistant") => Role::Assistant,
        Some("system") => Role::System,
        _ => Role::User,
    };
    let content = match obj.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(_) => return None,
    };

    Some(Message {
        role,
        content,
        timestamp: obj.get("timestamp").and_then(Value::as_str).map(str::to_string),
    })
}

/// Parse one stored book, dropping entries that cannot be read.
fn parse_book(value: Value) -> Option<KnowledgeBook> {
    let Value::Object(mut obj) = value else {
        warn!("Skipping knowledge book that is not an object");
        return None;
    };

    let entries = match obj.remove("entries") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("book_{}", Uuid::new_v4().simple()));
    obj.insert("id".into(), Value::String(id));

    let mut book: KnowledgeBook = match serde_json::from_value(Value::Object(obj)) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "Skipping unreadable knowledge book");
            return None;
        }
    };

    book.entries = entries
        .into_iter()
        .filter_map(|entry| parse_entry(&book.id, entry))
        .collect();
    Some(book)
}

fn parse_entry(book_id: &str, value: Value) -> Option<KnowledgeEntry> {
    let Value::Object(mut obj) = value else {
        warn!(book = book_id, "Skipping knowledge entry that is not an object");
        return None;
    };
    if !obj.get("uid").is_some_and(|v| v.is_string()) {
        // Older data used numeric uids
        let uid = match obj.get("uid") {
            Some(Value::Number(n)) => n.to_string(),
            _ => Uuid::new_v4().simple().to_string(),
        };
        obj.insert("uid".into(), Value::String(uid));
    }

    match serde_json::from_value(Value::Object(obj)) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(book = book_id, error = %e, "Skipping unreadable knowledge entry");
            None
        }
    }
}

fn corrupted(key: &str, e: serde_json::Error) -> StoreError {
    StoreError::Corrupted {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use parlor_core::knowledge::BookScope;
    use serde_json::json;

    fn repo() -> (Repository, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (Repository::new(store.clone()), store)
    }

    #[tokio::test]
    async fn settings_default_when_absent() {
        let (repo, _) = repo();
        let settings = repo.load_settings(&ApiSettings::default()).await.unwrap();
        assert_eq!(settings.model, "zai-org/GLM-4.6");
    }

    #[tokio::test]
    async fn stored_settings_override_defaults() {
        let (repo, store) = repo();
        store
            .set(keys::SETTINGS, json!({"API_KEY": "sk-1", "MODEL": "deepseek-chat", "THEME": "dark"}))
            .await
            .unwrap();

        let settings = repo.load_settings(&ApiSettings::default()).await.unwrap();
        assert_eq!(settings.api_key, "sk-1");
        assert_eq!(settings.model, "deepseek-chat");
        assert_eq!(settings.api_url, "https://api.siliconflow.cn/v1/chat/completions");
        assert_eq!(settings.extra["THEME"], "dark");

        repo.save_settings(&settings).await.unwrap();
        let raw = store.get(keys::SETTINGS).await.unwrap().unwrap();
        assert_eq!(raw["THEME"], "dark");
        assert_eq!(raw["API_KEY"], "sk-1");
    }

    #[tokio::test]
    async fn seeds_default_character() {
        let (repo, _) = repo();
        let characters = repo.load_characters().await.unwrap();
        assert_eq!(characters.len(), 1);
        assert_eq!(characters[0].name, DEFAULT_CHARACTER_NAME);
        assert!(characters[0].history.is_empty());
    }

    #[tokio::test]
    async fn legacy_characters_normalized() {
        let (repo, store) = repo();
        store
            .set(
                keys::CHARACTERS,
                json!([
                    {
                        "id": "c1",
                        "name": "Mina",
                        "prompt": "You are Mina.",
                        "hasNewMsg": true,
                        "history": [
                            {"role": "system", "content": "You are Mina."},
                            "bare legacy line",
                            {"role": "assistant", "content": "hi", "timestamp": "Dec.14 16:39"}
                        ]
                    },
                    42
                ]),
            )
            .await
            .unwrap();

        let characters = repo.load_characters().await.unwrap();
        assert_eq!(characters.len(), 1);
        let mina = &characters[0];
        assert_eq!(mina.persona, "You are Mina.");
        assert!(mina.unread);
        assert_eq!(mina.history[1].role, Role::User);
        assert_eq!(mina.history[1].content, "bare legacy line");
        assert_eq!(mina.avatar, "");
    }

    #[tokio::test]
    async fn loose_characters_survive_load_and_save() {
        let (repo, store) = repo();
        store
            .set(
                keys::CHARACTERS,
                json!([
                    {"id": "c1", "name": "Null", "history": [{"role": "assistant", "content": null}]},
                    {"id": "c2", "name": "Roleless", "history": [{"content": "who said this"}]},
                    {"id": 1700000000000u64, "name": "Numeric", "history": []},
                    {"id": "c4", "name": "Ok", "history": [{"role": "user", "content": "hi"}]}
                ]),
            )
            .await
            .unwrap();

        let characters = repo.load_characters().await.unwrap();
        let names: Vec<&str> = characters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Null", "Roleless", "Numeric", "Ok"]);
        assert_eq!(characters[0].history[0].role, Role::Assistant);
        assert_eq!(characters[0].history[0].content, "");
        assert_eq!(characters[1].history[0].role, Role::User);
        assert_eq!(characters[1].history[0].content, "who said this");
        assert_eq!(characters[2].id, "1700000000000");

        repo.save_characters(&characters).await.unwrap();
        let raw = store.get(keys::CHARACTERS).await.unwrap().unwrap();
        assert_eq!(raw.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unknown_roles_and_bad_entries_handled_per_message() {
        let (repo, store) = repo();
        store
            .set(
                keys::CHARACTERS,
                json!([{
                    "id": "c1",
                    "name": "Mina",
                    "unread": true,
                    "history": [
                        {"role": "narrator", "content": "It was raining."},
                        {"role": "user", "content": {"nested": true}},
                        7,
                        {"role": "assistant", "content": "Still here.", "timestamp": "Dec.14 16:39"}
                    ]
                }]),
            )
            .await
            .unwrap();

        let characters = repo.load_characters().await.unwrap();
        assert_eq!(characters.len(), 1);
        let history = &characters[0].history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "Still here.");
        assert_eq!(history[1].timestamp.as_deref(), Some("Dec.14 16:39"));
        assert!(characters[0].unread);
    }

    #[tokio::test]
    async fn character_without_id_gets_one() {
        let (repo, store) = repo();
        store
            .set(keys::CHARACTERS, json!([{"name": "Anon", "history": "not a list"}]))
            .await
            .unwrap();

        let characters = repo.load_characters().await.unwrap();
        assert_eq!(characters.len(), 1);
        assert_eq!(characters[0].name, "Anon");
        assert!(!characters[0].id.is_empty());
        assert!(characters[0].history.is_empty());
    }

    #[tokio::test]
    async fn books_loaded_leniently() {
        let (repo, store) = repo();
        store
            .set(
                keys::KNOWLEDGE_BOOKS,
                json!([
                    {
                        "id": "b1",
                        "name": "World",
                        "characterId": "",
                        "entries": [
                            {"uid": "e1", "keys": ["rain"], "content": "It always rains.", "comment": "Weather"},
                            {"uid": 7, "keys": ["sun"], "content": "Rarely sunny."},
                            {"uid": "bad", "keys": "not-a-list", "content": 3},
                            "garbage"
                        ]
                    },
                    {"name": "Mina only", "characterId": "c1"},
                    null
                ]),
            )
            .await
            .unwrap();

        let books = repo.load_books().await.unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].entries.len(), 2);
        assert_eq!(books[0].entries[0].label, "Weather");
        assert_eq!(books[0].entries[1].uid, "7");
        assert!(books[1].id.starts_with("book_"));
        assert_eq!(books[1].scope, BookScope::Character("c1".into()));
    }

    #[tokio::test]
    async fn at_least_one_book() {
        let (repo, store) = repo();
        store.set(keys::KNOWLEDGE_BOOKS, json!([])).await.unwrap();
        let books = repo.load_books().await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].name, DEFAULT_BOOK_NAME);
    }

    #[tokio::test]
    async fn characters_round_trip() {
        let (repo, _) = repo();
        let mut c = Character::new("Ren", "🦊", "You are Ren.");
        c.history.push(parlor_core::Message::system("You are Ren."));
        repo.save_characters(std::slice::from_ref(&c)).await.unwrap();

        let loaded = repo.load_characters().await.unwrap();
        assert_eq!(loaded, vec![c]);
    }
}
