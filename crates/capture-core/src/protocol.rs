//! Addressed message protocol between a frame agent and its controller.
//!
//! Wire keys are camelCase. Every outbound message is an [`Envelope`]:
//!
//! ```json
//! {
//!   "command": "capture-stop",
//!   "tabId": 7,
//!   "frameId": 0,
//!   "frameIdentity": "6f1c...",
//!   "targetFrameIdentity": "top",
//!   "targetIndex": 0,
//!   ...
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::host::ArtifactReference;
use crate::ids::{Address, FrameIdentity};
use crate::surface::{Rect, SurfaceRecord};

/// Text of the notification sent when the recorded surface disappears.
pub const SURFACE_REMOVED_NOTIFICATION: &str = "Canvas was removed while it was being recorded.";
/// Text of the notification sent when the encoder never finalizes.
pub const FINALIZE_TIMEOUT_NOTIFICATION: &str =
    "Recording did not finish in time and was stopped.";

/// Inbound command kinds understood by the agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CaptureStart,
    CaptureStop,
    Disable,
    Display,
    Download,
    Highlight,
    Identify,
    Register,
    UpdateCanvases,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        Self::CaptureStart,
        Self::CaptureStop,
        Self::Disable,
        Self::Display,
        Self::Download,
        Self::Highlight,
        Self::Identify,
        Self::Register,
        Self::UpdateCanvases,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaptureStart => "capture-start",
            Self::CaptureStop => "capture-stop",
            Self::Disable => "disable",
            Self::Display => "display",
            Self::Download => "download",
            Self::Highlight => "highlight",
            Self::Identify => "identify",
            Self::Register => "register",
            Self::UpdateCanvases => "update-canvases",
        }
    }

    /// Unknown command names yield `None` and are ignored by the router.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

/// Stop report sent when a recording finalizes.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub target_index: usize,
    /// `None` when nothing was recorded or the result is unusable.
    pub artifact_reference: Option<ArtifactReference>,
    pub success: bool,
    pub total_bytes: u64,
    /// Milliseconds since the Unix epoch.
    pub start_timestamp: i64,
}

/// Answer to a highlight query.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightReply {
    pub target_index: Option<usize>,
    /// `None` when the index does not name a known surface.
    pub rect: Option<Rect>,
    pub can_capture: bool,
}

/// Inventory report.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReport {
    pub canvases: Vec<SurfaceRecord>,
    pub active_index: Option<usize>,
}

/// Outbound payloads, tagged by `command`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Outbound {
    CaptureStart {
        success: bool,
    },
    CaptureStop(StopReport),
    Highlight(HighlightReply),
    UpdateCanvases(InventoryReport),
    Notify {
        notification: String,
    },
    /// Echo of an inbound identify message with this agent's identity added.
    Identify {
        #[serde(flatten)]
        echo: Map<String, Value>,
    },
}

impl Outbound {
    pub fn command(&self) -> &'static str {
        match self {
            Self::CaptureStart { .. } => "capture-start",
            Self::CaptureStop(_) => "capture-stop",
            Self::Highlight(_) => "highlight",
            Self::UpdateCanvases(_) => "update-canvases",
            Self::Notify { .. } => "notify",
            Self::Identify { .. } => "identify",
        }
    }
}

/// Addressed outbound message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Host tab coordinate, passed through unchanged from `register`/`display`.
    pub tab_id: Option<Value>,
    /// Host frame coordinate, passed through unchanged from `register`.
    pub frame_id: Option<Value>,
    pub frame_identity: FrameIdentity,
    pub target_frame_identity: Address,
    #[serde(flatten)]
    pub body: Outbound,
}

impl Envelope {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Configuration carried by the `display` command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    pub max_video_size: Option<u64>,
}
