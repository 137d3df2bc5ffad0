//! Canonicalization and validation of parsed model output.
//!
//! [`normalize`] rewrites a parsed JSON value into the canonical intent shape
//! without touching the caller's value; [`validate`] then deserializes it
//! strictly. Either failing is a contract fault for the extractor.

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::TransactionIntent;

/// Destination keys older prompts and models emit instead of `recipient`.
pub const LEGACY_RECIPIENT_KEYS: &[&str] = &["to", "receiver", "destination", "recipient_address"];

/// Parsed output that does not match the canonical intent schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("intent payload must be a JSON object")]
    NotAnObject,
    #[error("intent payload violates schema: {0}")]
    Invalid(#[source] serde_json::Error),
}

/// Rules that depend on deployment config rather than on the schema itself.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Symbol of the chain's native coin; a matching `token` becomes `null`.
    pub native_token: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            native_token: "SUI".into(),
        }
    }
}

/// Produce the canonical intermediate value. The input is left untouched.
pub fn normalize(raw: &Value, options: &NormalizeOptions) -> Result<Value, SchemaError> {
    let mut root = raw.as_object().cloned().ok_or(SchemaError::NotAnObject)?;

    uppercase_enum(&mut root, "type");

    let mut data = match root.remove("data") {
        Some(Value::Object(data)) => data,
        _ => Map::new(),
    };

    // Flat payloads carry action_type/params at the top level.
    for key in ["action_type", "params"] {
        if let Some(value) = root.remove(key) {
            data.entry(key).or_insert(value);
        }
    }

    if data.get("action_type").map_or(true, Value::is_null) {
        data.insert("action_type".into(), Value::String("NONE".into()));
    }
    uppercase_enum(&mut data, "action_type");

    let params = match data.remove("params") {
        Some(Value::Object(params)) => normalize_params(params, options),
        _ => Map::new(),
    };
    data.insert("params".into(), Value::Object(params));

    root.insert("data".into(), Value::Object(data));
    Ok(Value::Object(root))
}

/// Strictly deserialize a normalized value into a [`TransactionIntent`].
pub fn validate(normalized: Value) -> Result<TransactionIntent, SchemaError> {
    serde_json::from_value(normalized).map_err(SchemaError::Invalid)
}

/// [`normalize`] then [`validate`].
pub fn normalize_and_validate(
    raw: &Value,
    options: &NormalizeOptions,
) -> Result<TransactionIntent, SchemaError> {
    validate(normalize(raw, options)?)
}

fn normalize_params(mut params: Map<String, Value>, options: &NormalizeOptions) -> Map<String, Value> {
    for legacy in LEGACY_RECIPIENT_KEYS {
        if let Some(value) = params.remove(*legacy) {
            let canonical_missing = params.get("recipient").map_or(true, Value::is_null);
            if canonical_missing {
                params.insert("recipient".into(), value);
            }
        }
    }

    if let Some(Value::Number(n)) = params.get("amount") {
        let rendered = n.to_string();
        params.insert("amount".into(), Value::String(rendered));
    }

    let is_native = params
        .get("token")
        .and_then(Value::as_str)
        .is_some_and(|t| t.trim().eq_ignore_ascii_case(&options.native_token));
    if is_native {
        params.insert("token".into(), Value::Null);
    }

    if let Some(Value::String(list)) = params.get("recipients") {
        let split: Vec<Value> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect();
        params.insert("recipients".into(), Value::Array(split));
    }

    params
}

fn uppercase_enum(map: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(s)) = map.get_mut(key) {
        *s = s.trim().to_ascii_uppercase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::types::{ActionType, IntentKind};
    use serde_json::json;

    fn opts() -> NormalizeOptions {
        NormalizeOptions::default()
    }

    #[test]
    fn legacy_recipient_is_renamed_before_validation() {
        let raw = json!({
            "type": "TRANSACTION",
            "summary": "Sending",
            "data": {"action_type": "TRANSFER", "params": {"amount": "1", "to": "0xAB12"}}
        });
        let normalized = normalize(&raw, &opts()).unwrap();
        let params = &normalized["data"]["params"];
        assert_eq!(params["recipient"], "0xAB12");
        assert!(params.get("to").is_none());

        // caller's value untouched
        assert_eq!(raw["data"]["params"]["to"], "0xAB12");
    }

    #[test]
    fn canonical_recipient_wins_over_legacy() {
        let raw = json!({
            "type": "TRANSACTION",
            "summary": "s",
            "data": {"action_type": "TRANSFER", "params": {"recipient": "Ali", "receiver": "Bob"}}
        });
        let intent = normalize_and_validate(&raw, &opts()).unwrap();
        assert_eq!(intent.params().recipient.as_deref(), Some("Ali"));
    }

    #[test]
    fn null_params_become_empty_object() {
        let raw = json!({"type": "CHAT", "summary": "hi", "data": {"action_type": "NONE", "params": null}});
        let intent = normalize_and_validate(&raw, &opts()).unwrap();
        assert_eq!(intent.kind, IntentKind::Chat);
        assert_eq!(intent.params(), &Default::default());
    }

    #[test]
    fn missing_data_defaults_to_none() {
        let raw = json!({"type": "CHAT", "summary": "hi"});
        let intent = normalize_and_validate(&raw, &opts()).unwrap();
        assert_eq!(intent.action_type(), ActionType::None);
    }

    #[test]
    fn flat_payload_is_lifted_into_data() {
        let raw = json!({
            "type": "transaction",
            "summary": "ok",
            "action_type": "transfer",
            "params": {"amount": 10, "token": "sui", "recipient": "Ali"}
        });
        let intent = normalize_and_validate(&raw, &opts()).unwrap();
        assert_eq!(intent.kind, IntentKind::Transaction);
        assert_eq!(intent.action_type(), ActionType::Transfer);
        assert_eq!(intent.params().amount.as_deref(), Some("10"));
        assert_eq!(intent.params().token, None);
    }

    #[test]
    fn recipients_string_is_split() {
        let raw = json!({
            "type": "TRANSACTION",
            "summary": "batch",
            "data": {"action_type": "BATCH_TRANSFER", "params": {"recipients": "Ali, Bob ,0x9"}}
        });
        let intent = normalize_and_validate(&raw, &opts()).unwrap();
        assert_eq!(
            intent.params().recipients.as_deref(),
            Some(&["Ali".to_string(), "Bob".to_string(), "0x9".to_string()][..])
        );
    }

    #[test]
    fn unknown_enum_is_rejected() {
        let raw = json!({"type": "TRANSACTION", "summary": "x", "data": {"action_type": "BRIDGE", "params": {}}});
        assert!(matches!(
            normalize_and_validate(&raw, &opts()),
            Err(SchemaError::Invalid(_))
        ));
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let raw = json!({"type": "CHAT", "summary": 42});
        assert!(normalize_and_validate(&raw, &opts()).is_err());

        let raw = json!({"type": "CHAT", "summary": "x", "data": {"params": {"isMax": "yes"}}});
        assert!(normalize_and_validate(&raw, &opts()).is_err());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(
            normalize(&json!([1, 2]), &opts()),
            Err(SchemaError::NotAnObject)
        ));
    }
}
