//! Command handlers.

use capture_agent::CaptureAgent;
use capture_core::errors::CaptureError;
use capture_core::protocol::{CommandKind, DisplaySettings};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::wire::{self, InboundMessage};

/// What became of one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// Unknown command or addressed to another frame.
    Ignored,
    /// The handler failed; the agent already sent whatever reply applies.
    Failed(CaptureError),
}

/// Dispatch a message to the matching handler.
///
/// Handler failures are logged and returned, never propagated as faults.
pub fn dispatch(agent: &mut CaptureAgent, message: &InboundMessage) -> Dispatch {
    if !message.is_addressed_to(agent.identity()) {
        debug!(command = %message.command, target = ?message.target(), "message for another frame");
        return Dispatch::Ignored;
    }
    let Some(kind) = message.kind() else {
        debug!(command = %message.command, "unknown command ignored");
        return Dispatch::Ignored;
    };

    let params = &message.params;
    let result = match kind {
        CommandKind::CaptureStart => capture_start(agent, params),
        CommandKind::CaptureStop => agent.request_stop(),
        CommandKind::Disable => {
            agent.disable();
            Ok(())
        }
        CommandKind::Display => display(agent, params),
        CommandKind::Download => download(agent, params),
        CommandKind::Highlight => {
            highlight(agent, params);
            Ok(())
        }
        CommandKind::Identify => {
            agent.identify(params.clone());
            Ok(())
        }
        CommandKind::Register => {
            agent.register(
                wire::passthrough(params, "tabId"),
                wire::passthrough(params, "frameId"),
            );
            Ok(())
        }
        CommandKind::UpdateCanvases => {
            agent.update_canvases();
            Ok(())
        }
    };

    match result {
        Ok(()) => Dispatch::Handled,
        Err(e) => {
            let command = kind.as_str();
            if e.is_rejection() {
                info!(command, error = %e, kind = e.error_kind(), "command rejected");
            } else if e.is_malformed_input() {
                warn!(command, error = %e, kind = e.error_kind(), "command with unusable fields");
            } else if e.is_capability_failure() {
                error!(command, error = %e, kind = e.error_kind(), "host capability failed");
            } else {
                warn!(command, error = %e, kind = e.error_kind(), "command failed");
            }
            Dispatch::Failed(e)
        }
    }
}

/// Every start is acknowledged, including ones with unusable fields.
fn capture_start(agent: &mut CaptureAgent, params: &Map<String, Value>) -> Result<(), CaptureError> {
    let result = start_fields(params)
        .and_then(|(index, fps, bps)| agent.try_start(index, fps, bps));
    agent.acknowledge_start(result.is_ok());
    result
}

fn start_fields(
    params: &Map<String, Value>,
) -> Result<(usize, Option<u32>, Option<u64>), CaptureError> {
    Ok((
        wire::require_index(params, "targetIndex")?,
        wire::optional_u32(params, "fps")?,
        wire::optional_u64(params, "bps")?,
    ))
}

fn display(agent: &mut CaptureAgent, params: &Map<String, Value>) -> Result<(), CaptureError> {
    let settings = match params.get("defaultSettings") {
        None | Some(Value::Null) => DisplaySettings::default(),
        Some(value) => {
            DisplaySettings::deserialize(value).map_err(|e| CaptureError::InvalidField {
                field: "defaultSettings".into(),
                reason: e.to_string(),
            })?
        }
    };
    if settings.max_video_size.is_none() {
        warn!("display without maxVideoSize, keeping current ceiling");
    }
    agent.display(settings.max_video_size, wire::passthrough(params, "tabId"));
    Ok(())
}

fn download(agent: &mut CaptureAgent, params: &Map<String, Value>) -> Result<(), CaptureError> {
    let index = wire::require_index(params, "targetIndex")?;
    agent.download(index)?;
    Ok(())
}

/// Highlight always answers; an unusable index is answered like an
/// unknown one.
fn highlight(agent: &mut CaptureAgent, params: &Map<String, Value>) {
    let index = wire::optional_index(params, "targetIndex").unwrap_or_else(|e| {
        warn!(error = %e, "highlight with unusable index");
        None
    });
    agent.highlight(index);
}
