//! SillyTavern world-info compatibility.
//!
//! Import accepts `entries` as an array or as an index-keyed object, and
//! `key` as an array or a comma string. Export writes the index-keyed form
//! with the fixed defaults SillyTavern expects.

use chrono::Local;
use parlor_core::knowledge::{KnowledgeBook, KnowledgeEntry, parse_keys, resolve_label};
use serde_json::{Map, Value, json};

use crate::error::KnowledgeError;

/// Build a new global book from a SillyTavern file.
///
/// The book is named after `file_name` without its extension.
pub fn import_tavern(json_text: &str, file_name: Option<&str>) -> Result<KnowledgeBook, KnowledgeError> {
    let data: Value =
        serde_json::from_str(json_text).map_err(|e| KnowledgeError::InvalidImport(e.to_string()))?;
    if !data.is_object() {
        return Err(KnowledgeError::InvalidImport("expected a JSON object".into()));
    }

    let raw_entries: Vec<&Value> = match data.get("entries") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => {
            // "10" must follow "9"
            let mut indexed: Vec<(Option<usize>, &String, &Value)> =
                map.iter().map(|(k, v)| (k.parse().ok(), k, v)).collect();
            indexed.sort_by(|a, b| (a.0.is_none(), a.0, a.1).cmp(&(b.0.is_none(), b.0, b.1)));
            indexed.into_iter().map(|(_, _, v)| v).collect()
        }
        _ => Vec::new(),
    };

    let entries = raw_entries.into_iter().map(convert_entry).collect();

    let name = file_name
        .map(|f| match f.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => f.to_string(),
        })
        .unwrap_or_else(|| format!("Imported book {}", Local::now().format("%H:%M:%S")));

    Ok(KnowledgeBook {
        name,
        entries,
        ..KnowledgeBook::new("")
    })
}

fn convert_entry(raw: &Value) -> KnowledgeEntry {
    let keys = match raw.get("key") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => parse_keys(s),
        _ => Vec::new(),
    };
    let content = raw.get("content").and_then(Value::as_str).unwrap_or_default();
    let constant = raw.get("constant").and_then(Value::as_bool).unwrap_or(false);
    let comment = raw.get("comment").and_then(Value::as_str);

    KnowledgeEntry::new(keys, content, constant, comment)
}

/// Serialize `book` as a SillyTavern world-info document.
pub fn export_tavern(book: &KnowledgeBook) -> Value {
    let entries: Map<String, Value> = book
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let comment = resolve_label(Some(entry.label.as_str()), None, &entry.keys);
            (
                index.to_string(),
                json!({
                    "uid": index,
                    "key": entry.keys,
                    "comment": comment,
                    "content": entry.content,
                    "constant": entry.constant,
                    "selective": true,
                    "order": 100,
                    "position": 0,
                    "disable": false,
                    "excludeRecursion": false,
                    "probability": 100,
                    "useProbability": true,
                }),
            )
        })
        .collect();

    json!({ "entries": entries })
}
