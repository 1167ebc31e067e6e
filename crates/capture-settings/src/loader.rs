//! Layered settings.
//!
//! The layers are JSON values merged in order: compiled defaults, the
//! settings file, then `CANVAS_CAPTURE_*` environment variables. The result
//! is deserialized and validated once at the end.

use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::AgentSettings;

struct EnvOverride {
    var: &'static str,
    key: &'static str,
    min: u64,
    max: u64,
}

const ENV_OVERRIDES: &[EnvOverride] = &[
    EnvOverride {
        var: "CANVAS_CAPTURE_MAX_VIDEO_SIZE",
        key: "maxVideoSize",
        min: 1,
        max: u64::MAX,
    },
    EnvOverride {
        var: "CANVAS_CAPTURE_FPS",
        key: "fps",
        min: 1,
        max: 240,
    },
    EnvOverride {
        var: "CANVAS_CAPTURE_BPS",
        key: "bps",
        min: 1,
        max: 1_000_000_000,
    },
    EnvOverride {
        var: "CANVAS_CAPTURE_FINALIZE_TIMEOUT_MS",
        key: "finalizeTimeoutMs",
        min: 100,
        max: 600_000,
    },
];

/// Load settings, optionally layering a file over the defaults.
/// A missing file is not an error.
pub fn load_settings(path: Option<&Path>) -> Result<AgentSettings> {
    let mut layered = serde_json::to_value(AgentSettings::default())
        .map_err(|e| SettingsError::invalid("defaults", e.to_string()))?;
    if let Some(path) = path {
        if let Some(file) = read_layer(path)? {
            deep_merge(&mut layered, file);
        }
    }
    apply_env_overrides(&mut layered, |var| std::env::var(var).ok());

    let settings: AgentSettings = serde_json::from_value(layered)
        .map_err(|e| SettingsError::invalid("settings", e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}

pub fn load_settings_from_path(path: &Path) -> Result<AgentSettings> {
    load_settings(Some(path))
}

fn read_layer(path: &Path) -> Result<Option<Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(None);
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_owned(),
                source,
            })
        }
    };
    debug!(path = %path.display(), "settings file loaded");
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_owned(),
            source,
        })
}

/// Merge `layer` into `target`. Objects merge per key, anything else is
/// replaced, and `null` in the layer leaves the target untouched.
pub fn deep_merge(target: &mut Value, layer: Value) {
    match (target, layer) {
        (_, Value::Null) => {}
        (Value::Object(target), Value::Object(layer)) => {
            for (key, value) in layer {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None if value.is_null() => {}
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, layer) => *target = layer,
    }
}

/// Apply environment overrides to a settings layer. `lookup` resolves a
/// variable name; out-of-range or unparsable values are logged and skipped.
pub fn apply_env_overrides(layer: &mut Value, lookup: impl Fn(&str) -> Option<String>) {
    let Value::Object(map) = layer else {
        return;
    };
    for o in ENV_OVERRIDES {
        let Some(raw) = lookup(o.var) else {
            continue;
        };
        match parse_in_range(&raw, o.min, o.max) {
            Some(n) => {
                debug!(var = o.var, value = n, "environment override");
                map.insert(o.key.to_owned(), Value::from(n));
            }
            None => warn!(var = o.var, value = %raw, min = o.min, max = o.max, "ignoring invalid override"),
        }
    }
}

pub fn parse_in_range(raw: &str, min: u64, max: u64) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|n| (min..=max).contains(n))
}
