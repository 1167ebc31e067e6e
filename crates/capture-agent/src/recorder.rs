//! Single-recording state machine.
//!
//! ```text
//!   Idle ──start──▶ Recording ──stop──▶ Stopping ──finish──▶ Idle
//! ```
//!
//! A session exists exactly while the state is not `Idle`. Starts are only
//! accepted from `Idle` and are rejected, not queued, otherwise. Each start
//! issues a fresh encoder generation; host events carrying any other
//! generation belong to an encoder that was abandoned and are dropped.

use std::time::Duration;

use capture_core::errors::CaptureError;
use capture_core::host::{EncoderGeneration, EncoderOptions, Host};
use capture_core::surface::NodeId;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::tracker::SurfaceTracker;

/// Marker placed on the surface being recorded.
pub const ACTIVE_MARKER: &str = "canvas_active_capturing";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Stopping,
}

impl CaptureState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
        }
    }
}

/// Parameters of an accepted start command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartRequest {
    pub target_index: usize,
    pub frames_per_second: u32,
    pub bits_per_second: u64,
    pub mime_type: String,
    pub timeslice: Duration,
}

/// Bookkeeping for the one active or stopping recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSession {
    /// Index into the last reported inventory; follows the surface when the
    /// document is reordered.
    pub target_index: usize,
    pub surface: NodeId,
    pub generation: EncoderGeneration,
    /// Milliseconds since the Unix epoch.
    pub start_timestamp: i64,
    pub surface_removed: bool,
}

#[derive(Debug)]
pub struct Recorder {
    state: CaptureState,
    session: Option<CaptureSession>,
    finalize_deadline: Option<Instant>,
    last_generation: u64,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            session: None,
            finalize_deadline: None,
            last_generation: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.state == CaptureState::Idle
    }

    /// Whether host events from `generation` belong to the current session.
    pub fn is_current(&self, generation: EncoderGeneration) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    /// When the finalize callback is considered lost.
    pub fn finalize_deadline(&self) -> Option<Instant> {
        self.finalize_deadline
    }

    /// Try to begin recording the surface at `request.target_index`.
    ///
    /// Every check runs before any state changes, so a rejection leaves the
    /// recorder exactly as it was.
    pub fn start(
        &mut self,
        request: &StartRequest,
        tracker: &SurfaceTracker,
        host: &mut Host,
    ) -> Result<&CaptureSession, CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::AlreadyCapturing);
        }
        let surface = tracker
            .get(request.target_index)
            .ok_or(CaptureError::IndexOutOfRange {
                index: request.target_index,
                len: tracker.len(),
            })?;
        if !host.capture.probe(surface) {
            return Err(CaptureError::NotCapturable);
        }

        host.capture.open_stream(surface, request.frames_per_second)?;

        self.last_generation += 1;
        let generation = EncoderGeneration(self.last_generation);

        let options = EncoderOptions {
            mime_type: request.mime_type.clone(),
            bits_per_second: request.bits_per_second,
        };
        let preferred = host
            .capture
            .start_encoder(generation, Some(&options), request.timeslice);
        if let Err(e) = preferred {
            warn!(error = %e, "encoder rejected preferred options, retrying with defaults");
            if let Err(e) = host.capture.start_encoder(generation, None, request.timeslice) {
                host.capture.close_stream();
                return Err(e);
            }
        }

        host.document.add_marker(surface, ACTIVE_MARKER);
        self.state = CaptureState::Recording;
        self.finalize_deadline = None;
        info!(
            target_index = request.target_index,
            surface = %surface,
            %generation,
            fps = request.frames_per_second,
            bps = request.bits_per_second,
            "recording started"
        );
        Ok(&*self.session.insert(CaptureSession {
            target_index: request.target_index,
            surface,
            generation,
            start_timestamp: chrono::Utc::now().timestamp_millis(),
            surface_removed: false,
        }))
    }

    /// Ask the encoder to finalize.
    ///
    /// Returns `Ok(true)` when this call moved the recorder to `Stopping`,
    /// `Ok(false)` when a stop was already under way.
    pub fn request_stop(
        &mut self,
        host: &mut Host,
        finalize_timeout: Duration,
    ) -> Result<bool, CaptureError> {
        match self.state {
            CaptureState::Idle => Err(CaptureError::NotCapturing),
            CaptureState::Stopping => Ok(false),
            CaptureState::Recording => {
                self.state = CaptureState::Stopping;
                self.finalize_deadline = Some(Instant::now() + finalize_timeout);
                host.capture.stop_encoder();
                Ok(true)
            }
        }
    }

    /// Flag the active surface as gone from the document.
    pub fn mark_surface_removed(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.surface_removed = true;
        }
    }

    /// Follow the active surface to its new position in the snapshot.
    pub fn retarget(&mut self, index: usize, surface: NodeId) {
        if let Some(session) = self.session.as_mut() {
            session.target_index = index;
            session.surface = surface;
        }
    }

    /// End the session and return to `Idle`.
    ///
    /// Accepted from `Recording` too, for encoders that stop on their own.
    /// Returns `None` when there was no session.
    pub fn finish(&mut self, host: &mut Host) -> Option<CaptureSession> {
        let session = self.session.take()?;
        host.document.remove_marker(session.surface, ACTIVE_MARKER);
        host.capture.close_stream();
        self.state = CaptureState::Idle;
        self.finalize_deadline = None;
        Some(session)
    }
}
