//! Backup export and import.
//!
//! A backup is a JSON object mapping every store key to that key's value
//! serialized as a JSON string. Credential fields of the settings record are
//! obfuscated as `ENC_` + base64 on the way out and decoded on the way in.
//! This is not encryption; it only keeps keys from being readable at a glance.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parlor_config::ApiSettings;
use parlor_core::error::{ImportError, Result};
use parlor_core::store::{KeyValueStore, keys};
use serde_json::{Map, Value};
use tracing::{info, warn};

const OBFUSCATION_PREFIX: &str = "ENC_";

/// What an import wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub keys_written: usize,
}

/// Export every key in `store`.
pub async fn export_backup(store: &dyn KeyValueStore) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (key, mut value) in store.entries().await? {
        if key == keys::SETTINGS {
            transform_credentials(&mut value, obfuscate);
        }
        let encoded = match value {
            Value::String(s) => s,
            other => serde_json::to_string(&other)?,
        };
        out.insert(key, Value::String(encoded));
    }
    info!(keys = out.len(), "Backup exported");
    Ok(out)
}

/// Replace the whole store with the contents of `document`.
///
/// The document is fully decoded and checked before anything is written; an
/// [`ImportError`] leaves the store untouched. A document wrapped in a remote
/// envelope (`{"backup_at", "app", "data"}`) is unwrapped first.
pub async fn import_backup(store: &dyn KeyValueStore, document: &str) -> Result<ImportSummary> {
    let parsed: Value =
        serde_json::from_str(document).map_err(|e| ImportError::InvalidJson(e.to_string()))?;
    let decoded = decode_document(parsed)?;

    store.clear().await?;
    let keys_written = decoded.len();
    for (key, value) in decoded {
        store.set(&key, value).await?;
    }

    info!(keys = keys_written, "Backup imported");
    Ok(ImportSummary { keys_written })
}

/// Decode and validate a backup document without touching any store.
pub fn decode_document(parsed: Value) -> std::result::Result<Vec<(String, Value)>, ImportError> {
    let Value::Object(mut map) = parsed else {
        return Err(ImportError::InvalidShape("backup must be a JSON object".into()));
    };

    if map.contains_key("backup_at") {
        map = match map.remove("data") {
            Some(Value::Object(inner)) => inner,
            _ => {
                return Err(ImportError::InvalidShape(
                    "backup envelope has no data object".into(),
                ));
            }
        };
    }

    let mut decoded = Vec::with_capacity(map.len());
    for (key, raw) in map {
        let mut value = match raw {
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            other => other,
        };
        validate_shape(&key, &value)?;
        if key == keys::SETTINGS {
            transform_credentials(&mut value, deobfuscate);
        }
        decoded.push((key, value));
    }
    Ok(decoded)
}

fn validate_shape(key: &str, value: &Value) -> std::result::Result<(), ImportError> {
    let expected_ok = match key {
        keys::SETTINGS => value.is_object(),
        keys::CHARACTERS | keys::KNOWLEDGE_BOOKS => value.is_array(),
        _ => true,
    };
    if expected_ok {
        Ok(())
    } else {
        Err(ImportError::InvalidShape(format!(
            "value under '{key}' has the wrong type"
        )))
    }
}

fn transform_credentials(settings: &mut Value, f: fn(&str) -> String) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };
    for field in ApiSettings::CREDENTIAL_FIELDS {
        if let Some(Value::String(s)) = obj.get_mut(field) {
            if !s.is_empty() {
                *s = f(s);
            }
        }
    }
}

fn obfuscate(secret: &str) -> String {
    if secret.starts_with(OBFUSCATION_PREFIX) {
        return secret.to_string();
    }
    format!("{OBFUSCATION_PREFIX}{}", STANDARD.encode(secret))
}

fn deobfuscate(stored: &str) -> String {
    let Some(encoded) = stored.strip_prefix(OBFUSCATION_PREFIX) else {
        return stored.to_string();
    };
    match STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    {
        Some(secret) => secret,
        None => {
            warn!("Credential in backup could not be decoded, keeping it as stored");
            stored.to_string()
        }
    }
}
