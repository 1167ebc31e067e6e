use capture_core::errors::CaptureError;
use capture_core::ids::{Address, FrameIdentity};
use capture_core::protocol::CommandKind;
use serde_json::{Map, Value};

use crate::compat;

/// One inbound controller message.
///
/// `params` is the whole message object after legacy-key normalisation,
/// `command` included; handlers pick the fields they need.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub command: String,
    pub params: Map<String, Value>,
}

impl InboundMessage {
    pub fn from_value(value: &Value) -> Result<Self, CaptureError> {
        let Value::Object(params) = compat::normalize_params(value) else {
            return Err(CaptureError::Malformed("expected a JSON object".into()));
        };
        let command = params
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| CaptureError::MissingField("command".into()))?
            .to_owned();
        Ok(Self { command, params })
    }

    /// `None` for commands this agent does not understand.
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::parse(&self.command)
    }

    pub fn target(&self) -> Option<Address> {
        self.params
            .get("targetFrameIdentity")
            .and_then(Value::as_str)
            .map(|s| Address::from(s.to_owned()))
    }

    /// Whether a message should be handled by the agent `frame`.
    /// Unaddressed messages are always accepted.
    pub fn is_addressed_to(&self, frame: &FrameIdentity) -> bool {
        self.target().map_or(true, |address| address.matches(frame))
    }
}

/// Parse one line of the wire format.
pub fn parse_message(line: &str) -> Result<InboundMessage, CaptureError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| CaptureError::Malformed(e.to_string()))?;
    InboundMessage::from_value(&value)
}

// ── Field helpers ───────────────────────────────────────────────────────────

/// Extract a required non-negative integer field.
pub fn require_index(params: &Map<String, Value>, key: &str) -> Result<usize, CaptureError> {
    optional_index(params, key)?.ok_or_else(|| CaptureError::MissingField(key.to_owned()))
}

/// Extract an optional non-negative integer field. `null` counts as absent.
pub fn optional_index(params: &Map<String, Value>, key: &str) -> Result<Option<usize>, CaptureError> {
    optional_u64(params, key)?
        .map(|n| {
            usize::try_from(n).map_err(|_| CaptureError::InvalidField {
                field: key.to_owned(),
                reason: format!("{n} does not fit an index"),
            })
        })
        .transpose()
}

pub fn optional_u64(params: &Map<String, Value>, key: &str) -> Result<Option<u64>, CaptureError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| CaptureError::InvalidField {
            field: key.to_owned(),
            reason: format!("expected a non-negative integer, got {value}"),
        }),
    }
}

pub fn optional_u32(params: &Map<String, Value>, key: &str) -> Result<Option<u32>, CaptureError> {
    optional_u64(params, key)?
        .map(|n| {
            u32::try_from(n).map_err(|_| CaptureError::InvalidField {
                field: key.to_owned(),
                reason: format!("{n} is out of range"),
            })
        })
        .transpose()
}

/// Clone an opaque pass-through value.
pub fn passthrough(params: &Map<String, Value>, key: &str) -> Option<Value> {
    params.get(key).filter(|v| !v.is_null()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_normalizes_legacy_keys() {
        let msg = parse_message(r#"{"command":"highlight","canvasIndex":3}"#).unwrap();
        assert_eq!(msg.kind(), Some(CommandKind::Highlight));
        assert_eq!(msg.params["targetIndex"], 3);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(parse_message("{oops"), Err(CaptureError::Malformed(_))));
        assert!(matches!(parse_message("[1]"), Err(CaptureError::Malformed(_))));
        assert_eq!(
            parse_message(r#"{"targetIndex":1}"#),
            Err(CaptureError::MissingField("command".into()))
        );
    }

    #[test]
    fn unknown_commands_parse_without_kind() {
        let msg = parse_message(r#"{"command":"self-destruct"}"#).unwrap();
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn addressing() {
        let me = FrameIdentity::from_raw("me");
        let to = |target: &str| {
            parse_message(&format!(r#"{{"command":"register","targetFrameIdentity":"{target}"}}"#))
                .unwrap()
        };
        assert!(to("me").is_addressed_to(&me));
        assert!(to("*").is_addressed_to(&me));
        assert!(!to("someone-else").is_addressed_to(&me));
        assert!(!to("top").is_addressed_to(&me));
        assert!(parse_message(r#"{"command":"register"}"#)
            .unwrap()
            .is_addressed_to(&me));
    }

    #[test]
    fn index_fields() {
        let p = params(json!({"a": 2, "b": -1, "c": "x", "d": null}));
        assert_eq!(require_index(&p, "a"), Ok(2));
        assert!(matches!(require_index(&p, "b"), Err(CaptureError::InvalidField { .. })));
        assert!(matches!(require_index(&p, "c"), Err(CaptureError::InvalidField { .. })));
        assert_eq!(require_index(&p, "d"), Err(CaptureError::MissingField("d".into())));
        assert_eq!(optional_index(&p, "missing"), Ok(None));
    }

    #[test]
    fn u32_fields_are_range_checked() {
        let p = params(json!({"fps": 60, "huge": 1u64 << 40}));
        assert_eq!(optional_u32(&p, "fps"), Ok(Some(60)));
        assert!(optional_u32(&p, "huge").is_err());
        assert_eq!(optional_u64(&p, "huge"), Ok(Some(1 << 40)));
    }

    #[test]
    fn passthrough_skips_null() {
        let p = params(json!({"tabId": 7, "frameId": null}));
        assert_eq!(passthrough(&p, "tabId"), Some(json!(7)));
        assert_eq!(passthrough(&p, "frameId"), None);
    }
}
