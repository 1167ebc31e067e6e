use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Default size ceiling: 4 GiB.
pub const DEFAULT_MAX_VIDEO_SIZE: u64 = 4 * 1024 * 1024 * 1024;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_BPS: u64 = 2_500_000;
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_FINALIZE_TIMEOUT_MS: u64 = 10_000;

/// Agent settings as stored on disk (camelCase keys).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Size ceiling in bytes before a recording is stopped automatically.
    pub max_video_size: u64,
    /// Frame rate used when a start command does not carry one.
    pub fps: u32,
    /// Encoder bit rate used when a start command does not carry one.
    pub bps: u64,
    /// Encoder flush cadence.
    pub capture_interval_ms: u64,
    /// How long to wait for the encoder to finalize after a stop.
    pub finalize_timeout_ms: u64,
    /// Preferred encoder media type.
    pub mime_type: String,
    /// Extension of saved recordings.
    pub file_extension: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_video_size: DEFAULT_MAX_VIDEO_SIZE,
            fps: DEFAULT_FPS,
            bps: DEFAULT_BPS,
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            finalize_timeout_ms: DEFAULT_FINALIZE_TIMEOUT_MS,
            mime_type: "video/webm".to_string(),
            file_extension: "webm".to_string(),
        }
    }
}

impl AgentSettings {
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("maxVideoSize", self.max_video_size),
            ("fps", u64::from(self.fps)),
            ("captureIntervalMs", self.capture_interval_ms),
            ("finalizeTimeoutMs", self.finalize_timeout_ms),
        ];
        if let Some((key, _)) = positive.into_iter().find(|&(_, v)| v == 0) {
            return Err(SettingsError::invalid(key, "must be positive"));
        }
        if self.mime_type.is_empty() {
            return Err(SettingsError::invalid("mimeType", "must not be empty"));
        }
        if self.file_extension.is_empty() {
            return Err(SettingsError::invalid("fileExtension", "must not be empty"));
        }
        Ok(())
    }
}
