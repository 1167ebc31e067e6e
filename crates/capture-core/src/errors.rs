use std::time::Duration;

/// Error taxonomy for the capture agent.
/// Rejections are answered with a negative acknowledgement; nothing here is
/// fatal to the agent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    // Rejected commands
    #[error("a recording is already in progress")]
    AlreadyCapturing,
    #[error("no recording in progress")]
    NotCapturing,
    #[error("surface index {index} out of range (inventory has {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("surface cannot be captured")]
    NotCapturable,

    // Capability failures
    #[error("capture stream unavailable: {0}")]
    StreamUnavailable(String),
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),
    #[error("finalize callback did not arrive within {0:?}")]
    FinalizeTimeout(Duration),
    #[error("save failed: {0}")]
    SaveFailed(String),
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    // Lookup
    #[error("no artifact recorded for surface index {0}")]
    ArtifactNotFound(usize),

    // Malformed input
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl CaptureError {
    /// A rejected start or stop: the agent state was left untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::AlreadyCapturing
                | Self::NotCapturing
                | Self::IndexOutOfRange { .. }
                | Self::NotCapturable
        )
    }

    /// A failure reported by one of the host capabilities.
    pub fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Self::StreamUnavailable(_)
                | Self::EncoderUnavailable(_)
                | Self::FinalizeTimeout(_)
                | Self::SaveFailed(_)
                | Self::ChannelClosed(_)
        )
    }

    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_) | Self::MissingField(_) | Self::InvalidField { .. }
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AlreadyCapturing => "already_capturing",
            Self::NotCapturing => "not_capturing",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::NotCapturable => "not_capturable",
            Self::StreamUnavailable(_) => "stream_unavailable",
            Self::EncoderUnavailable(_) => "encoder_unavailable",
            Self::FinalizeTimeout(_) => "finalize_timeout",
            Self::SaveFailed(_) => "save_failed",
            Self::ChannelClosed(_) => "channel_closed",
            Self::ArtifactNotFound(_) => "artifact_not_found",
            Self::Malformed(_) => "malformed",
            Self::MissingField(_) => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
        }
    }
}
