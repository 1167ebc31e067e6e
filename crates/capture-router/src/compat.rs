//! Legacy wire keys.
//!
//! Older controllers address surfaces by `canvasIndex` and frames by
//! `frameUUID`/`targetFrameUUID`. Inbound messages are rewritten to the
//! current keys before dispatch so handlers only see one spelling.

use serde_json::Value;

/// Legacy key → current key.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("canvasIndex", "targetIndex"),
    ("frameUUID", "frameIdentity"),
    ("targetFrameUUID", "targetFrameIdentity"),
];

/// Rename legacy keys. If the current key is already present it wins and
/// the legacy duplicate is dropped.
pub fn normalize_params(params: &Value) -> Value {
    let Some(obj) = params.as_object() else {
        return params.clone();
    };
    let mut result = obj.clone();
    for &(legacy, current) in LEGACY_KEYS {
        if result.contains_key(current) {
            result.remove(legacy);
        } else if let Some(val) = result.remove(legacy) {
            result.insert(current.to_string(), val);
        }
    }
    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renames_legacy_keys() {
        let params = json!({"canvasIndex": 2, "frameUUID": "abc", "targetFrameUUID": "*"});
        let normalized = normalize_params(&params);
        assert_eq!(normalized["targetIndex"], 2);
        assert_eq!(normalized["frameIdentity"], "abc");
        assert_eq!(normalized["targetFrameIdentity"], "*");
        assert!(normalized.get("canvasIndex").is_none());
    }

    #[test]
    fn current_key_takes_precedence() {
        let normalized = normalize_params(&json!({"canvasIndex": 1, "targetIndex": 4}));
        assert_eq!(normalized["targetIndex"], 4);
        assert!(normalized.get("canvasIndex").is_none());
    }

    #[test]
    fn non_objects_pass_through() {
        assert_eq!(normalize_params(&json!([1, 2])), json!([1, 2]));
        assert_eq!(normalize_params(&Value::Null), Value::Null);
    }
}
