//! Host directives for the simulated document.
//!
//! Lines on stdin carrying a `host` key drive the simulated page instead of
//! the agent, e.g. `{"host":"add-surface","id":"game","width":800,"height":600}`.
//! Surfaces are addressed by their current position in the document.

use std::time::Duration;

use capture_core::host::Document;
use capture_core::sim::SimulatedDocument;
use capture_core::surface::MutationRecord;
use serde::Deserialize;
use capture_telemetry::parse_level;
use serde_json::Value;
use tracing::{warn, Level};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "host", rename_all = "kebab-case")]
pub enum HostDirective {
    AddSurface {
        #[serde(default)]
        id: String,
        width: u32,
        height: u32,
        /// Insert before the surface at this position instead of appending.
        #[serde(default)]
        index: Option<usize>,
    },
    RemoveSurface {
        index: usize,
    },
    SetAttribute {
        index: usize,
        name: String,
        value: String,
    },
    /// Pause reading input, letting the recording run.
    Wait {
        ms: u64,
    },
    /// Change one module's log level, e.g. `capture_agent` to `debug`.
    LogLevel {
        module: String,
        level: String,
    },
}

/// One classified input line.
#[derive(Debug)]
pub enum ScriptLine {
    Directive(HostDirective),
    /// Anything else goes to the agent untouched.
    Message(String),
}

pub fn classify(line: String) -> ScriptLine {
    let is_directive = serde_json::from_str::<Value>(&line)
        .ok()
        .is_some_and(|value| value.get("host").is_some());
    if !is_directive {
        return ScriptLine::Message(line);
    }
    match serde_json::from_str::<HostDirective>(&line) {
        Ok(directive) => ScriptLine::Directive(directive),
        Err(e) => {
            warn!(error = %e, "invalid host directive, passing through");
            ScriptLine::Message(line)
        }
    }
}

/// Apply a document directive and return the mutation record an observer
/// would see, if any.
pub fn apply(document: &SimulatedDocument, directive: &HostDirective) -> Option<MutationRecord> {
    match directive {
        HostDirective::AddSurface {
            id,
            width,
            height,
            index,
        } => {
            let (_, record) = match index {
                Some(index) => document.insert_surface(*index, id, *width, *height),
                None => document.add_surface(id, *width, *height),
            };
            Some(record)
        }
        HostDirective::RemoveSurface { index } => {
            let Some(&surface) = document.query_surfaces().get(*index) else {
                warn!(index, "no surface at position");
                return None;
            };
            Some(document.remove(surface))
        }
        HostDirective::SetAttribute { index, name, value } => {
            let surface = document.query_surfaces().get(*index).copied()?;
            document.set_attribute(surface, name, value)
        }
        HostDirective::Wait { .. } | HostDirective::LogLevel { .. } => None,
    }
}

impl HostDirective {
    pub fn wait_duration(&self) -> Option<Duration> {
        match self {
            Self::Wait { ms } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    pub fn log_level(&self) -> Option<(&str, Level)> {
        match self {
            Self::LogLevel { module, level } => match parse_level(level) {
                Some(level) => Some((module.as_str(), level)),
                None => {
                    warn!(module, level, "unknown log level");
                    None
                }
            },
            _ => None,
        }
    }
}
