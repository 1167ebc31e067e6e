//! The per-frame capture agent.
//!
//! One [`CaptureAgent`] owns every piece of mutable state for its frame: the
//! surface snapshot, the recorder, the chunk buffer and the artifact
//! registry. Handlers take `&mut self` and run to completion, which is the
//! whole concurrency story; the router feeds events one at a time.

use std::time::Duration;

use capture_core::errors::CaptureError;
use capture_core::format::pretty_file_size;
use capture_core::host::{
    Artifact, Chunk, DownloadHelper, EncoderGeneration, Host, HostEvent, Port,
};
use capture_core::ids::{Address, FrameIdentity};
use capture_core::protocol::{
    Envelope, HighlightReply, InventoryReport, Outbound, StopReport,
    FINALIZE_TIMEOUT_NOTIFICATION, SURFACE_REMOVED_NOTIFICATION,
};
use capture_core::surface::MutationRecord;
use capture_settings::AgentSettings;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactRegistry;
use crate::chunks::{ChunkAccumulator, ChunkOutcome};
use crate::recorder::{CaptureSession, CaptureState, Recorder, StartRequest, ACTIVE_MARKER};
use crate::tracker::{StructuralChange, SurfaceTracker};

/// Envelope keys the agent always fills in itself.
const RESERVED_KEYS: [&str; 5] = [
    "command",
    "tabId",
    "frameId",
    "frameIdentity",
    "targetFrameIdentity",
];

/// Runtime configuration of one agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    pub max_video_size: u64,
    pub frames_per_second: u32,
    pub bits_per_second: u64,
    pub capture_interval: Duration,
    pub finalize_timeout: Duration,
    pub mime_type: String,
    pub file_extension: String,
}

impl From<&AgentSettings> for AgentConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_video_size: settings.max_video_size,
            frames_per_second: settings.fps,
            bits_per_second: settings.bps,
            capture_interval: settings.capture_interval(),
            finalize_timeout: settings.finalize_timeout(),
            mime_type: settings.mime_type.clone(),
            file_extension: settings.file_extension.clone(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

pub struct CaptureAgent {
    identity: FrameIdentity,
    tab_id: Option<Value>,
    frame_id: Option<Value>,
    config: AgentConfig,
    host: Host,
    port: Box<dyn Port>,
    tracker: SurfaceTracker,
    recorder: Recorder,
    chunks: ChunkAccumulator,
    artifacts: ArtifactRegistry,
}

impl CaptureAgent {
    pub fn new(config: AgentConfig, host: Host, port: impl Port + 'static) -> Self {
        Self::with_identity(FrameIdentity::new(), config, host, port)
    }

    pub fn with_identity(
        identity: FrameIdentity,
        config: AgentConfig,
        host: Host,
        port: impl Port + 'static,
    ) -> Self {
        info!(frame_identity = %identity, "capture agent created");
        let chunks = ChunkAccumulator::new(config.max_video_size);
        Self {
            identity,
            tab_id: None,
            frame_id: None,
            config,
            host,
            port: Box::new(port),
            tracker: SurfaceTracker::new(),
            recorder: Recorder::new(),
            chunks,
            artifacts: ArtifactRegistry::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn identity(&self) -> &FrameIdentity {
        &self.identity
    }

    pub fn tab_id(&self) -> Option<&Value> {
        self.tab_id.as_ref()
    }

    pub fn frame_id(&self) -> Option<&Value> {
        self.frame_id.as_ref()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.recorder.state()
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.recorder.session()
    }

    pub fn tracker(&self) -> &SurfaceTracker {
        &self.tracker
    }

    pub fn chunks(&self) -> &ChunkAccumulator {
        &self.chunks
    }

    pub fn artifacts(&self) -> &ArtifactRegistry {
        &self.artifacts
    }

    /// When the pending finalize callback is considered lost.
    pub fn finalize_deadline(&self) -> Option<Instant> {
        self.recorder.finalize_deadline()
    }

    // ── Controller commands ─────────────────────────────────────────────

    /// Bind the opaque host coordinates echoed on every outbound message.
    pub fn register(&mut self, tab_id: Option<Value>, frame_id: Option<Value>) {
        debug!(?tab_id, ?frame_id, "registered");
        self.tab_id = tab_id;
        self.frame_id = frame_id;
    }

    /// Configure the size ceiling, prime the tracker and report the
    /// inventory.
    pub fn display(&mut self, max_video_size: Option<u64>, tab_id: Option<Value>) {
        if let Some(ceiling) = max_video_size {
            self.chunks.set_ceiling(ceiling);
            debug!(ceiling = %pretty_file_size(ceiling, false), "size ceiling configured");
        }
        if tab_id.is_some() {
            self.tab_id = tab_id;
        }
        self.update_canvases();
    }

    /// Re-query the document and report the inventory.
    pub fn update_canvases(&mut self) {
        self.tracker.refresh(self.host.document.as_mut());
        self.post_inventory();
    }

    /// Handle a start command and acknowledge it.
    pub fn request_start(
        &mut self,
        target_index: usize,
        frames_per_second: Option<u32>,
        bits_per_second: Option<u64>,
    ) -> bool {
        let success = match self.try_start(target_index, frames_per_second, bits_per_second) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    target_index,
                    error = %e,
                    kind = e.error_kind(),
                    "start rejected"
                );
                false
            }
        };
        self.acknowledge_start(success);
        success
    }

    /// Start recording without acknowledging.
    pub fn try_start(
        &mut self,
        target_index: usize,
        frames_per_second: Option<u32>,
        bits_per_second: Option<u64>,
    ) -> Result<(), CaptureError> {
        let request = StartRequest {
            target_index,
            frames_per_second: frames_per_second.unwrap_or(self.config.frames_per_second),
            bits_per_second: bits_per_second.unwrap_or(self.config.bits_per_second),
            mime_type: self.config.mime_type.clone(),
            timeslice: self.config.capture_interval,
        };
        self.recorder.start(&request, &self.tracker, &mut self.host)?;
        self.chunks.reset();
        Ok(())
    }

    pub fn acknowledge_start(&mut self, success: bool) {
        self.send(Outbound::CaptureStart { success });
    }

    /// Ask the encoder to finalize the active recording.
    pub fn request_stop(&mut self) -> Result<(), CaptureError> {
        if self
            .recorder
            .request_stop(&mut self.host, self.config.finalize_timeout)?
        {
            info!(
                accumulated = %pretty_file_size(self.chunks.accumulated_bytes(), false),
                "stop requested, waiting for encoder to finalize"
            );
        }
        Ok(())
    }

    /// Answer a geometry query for the surface at `target_index`.
    pub fn highlight(&mut self, target_index: Option<usize>) -> HighlightReply {
        let surface = target_index.and_then(|index| self.tracker.get(index));
        let rect = surface.and_then(|s| self.host.document.bounding_rect(s));
        let can_capture = match surface {
            Some(s) if rect.is_some() => self.host.capture.probe(s),
            _ => false,
        };
        if rect.is_none() {
            debug!(?target_index, "highlight for unknown surface");
        }
        let reply = HighlightReply {
            target_index,
            rect,
            can_capture,
        };
        self.send(Outbound::Highlight(reply.clone()));
        reply
    }

    /// Save the artifact recorded from `target_index`.
    pub fn download(&mut self, target_index: usize) -> Result<DownloadHelper, CaptureError> {
        let reference = self
            .artifacts
            .resolve(target_index)
            .cloned()
            .ok_or(CaptureError::ArtifactNotFound(target_index))?;
        let file_name = format!(
            "capture-{}.{}",
            chrono::Utc::now().timestamp(),
            self.config.file_extension
        );
        let helper = self.host.artifacts.save(&reference, &file_name)?;
        self.artifacts.track_helper(reference.clone(), helper);
        info!(target_index, %reference, file_name = %file_name, "download started");
        Ok(helper)
    }

    /// Revoke every artifact reference handed out so far.
    pub fn disable(&mut self) -> usize {
        let released = self.artifacts.release_all(self.host.artifacts.as_mut());
        info!(released, "artifact references released");
        released
    }

    /// Echo an identify probe with this agent's identity filled in.
    pub fn identify(&mut self, mut echo: Map<String, Value>) {
        for key in RESERVED_KEYS {
            echo.remove(key);
        }
        self.send(Outbound::Identify { echo });
    }

    // ── Host events ─────────────────────────────────────────────────────

    pub fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Mutations(batch) => self.on_mutations(&batch),
            HostEvent::Chunk { generation, chunk } => self.on_chunk(generation, chunk),
            HostEvent::EncoderStopped { generation } => self.on_encoder_stopped(generation),
        }
    }

    /// Route a mutation batch. A batch that already produced a structural
    /// report does not report again for its attribute records.
    pub fn on_mutations(&mut self, batch: &[MutationRecord]) {
        if !self.observe_structural_mutations(batch) {
            self.observe_attribute_mutations(batch);
        }
    }

    /// Returns whether an inventory report was posted.
    pub fn observe_structural_mutations(&mut self, batch: &[MutationRecord]) -> bool {
        if !batch.iter().any(MutationRecord::is_structural) {
            return false;
        }
        let change = StructuralChange::from_batch(batch);

        let active = self
            .recorder
            .session()
            .filter(|s| !s.surface_removed)
            .map(|s| s.surface);
        let mut removed_active = false;
        if let Some(surface) = active {
            if change.removed(surface) {
                warn!(%surface, "recorded surface removed from document, forcing stop");
                removed_active = true;
                self.recorder.mark_surface_removed();
                if let Err(e) = self.request_stop() {
                    warn!(error = %e, "forced stop failed");
                }
            }
        }

        self.tracker.refresh(self.host.document.as_mut());
        if !change.changed {
            return false;
        }

        if active.is_some() && !removed_active {
            if let Some(index) = self
                .tracker
                .position_of_marker(self.host.document.as_ref(), ACTIVE_MARKER)
            {
                if let Some(surface) = self.tracker.get(index) {
                    debug!(index, %surface, "active surface relocated");
                    self.recorder.retarget(index, surface);
                }
            }
        }

        self.post_inventory();
        true
    }

    /// Returns whether an inventory report was posted.
    pub fn observe_attribute_mutations(&mut self, batch: &[MutationRecord]) -> bool {
        if !self.tracker.attributes_changed(batch) {
            return false;
        }
        self.update_canvases();
        true
    }

    pub fn on_chunk(&mut self, generation: EncoderGeneration, chunk: Chunk) {
        if !self.recorder.is_current(generation) {
            debug!(%generation, size = chunk.size(), "chunk from an inactive encoder, dropped");
            return;
        }
        let outcome = self.chunks.push(chunk);
        if outcome == ChunkOutcome::CeilingReached && self.state() == CaptureState::Recording {
            info!(
                accumulated = self.chunks.accumulated_bytes(),
                ceiling = self.chunks.ceiling(),
                "size ceiling reached"
            );
            if let Err(e) = self.request_stop() {
                warn!(error = %e, "automatic stop failed");
            }
        }
    }

    /// A finalize callback only ends the session whose encoder sent it.
    pub fn on_encoder_stopped(&mut self, generation: EncoderGeneration) {
        if !self.recorder.is_current(generation) {
            debug!(%generation, "finalize callback from an inactive encoder, ignored");
            return;
        }
        self.finalize(false);
    }

    /// The encoder never called back after a stop request.
    pub fn on_finalize_timeout(&mut self) {
        if self.state() != CaptureState::Stopping {
            return;
        }
        let err = CaptureError::FinalizeTimeout(self.config.finalize_timeout);
        warn!(error = %err, kind = err.error_kind(), "finalizing without encoder");
        self.finalize(true);
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn finalize(&mut self, timed_out: bool) {
        let Some(session) = self.recorder.finish(&mut self.host) else {
            return;
        };
        if self.chunks.mixed_media_types() {
            warn!("recording assembled from chunks of more than one media type");
        }
        let artifact = self.chunks.assemble();
        let total_bytes = artifact.as_ref().map_or(0, Artifact::size);
        let reference = artifact.map(|a| self.host.artifacts.create(a));
        let success = !session.surface_removed && !timed_out;

        if session.surface_removed {
            self.notify(SURFACE_REMOVED_NOTIFICATION);
        } else if timed_out {
            self.notify(FINALIZE_TIMEOUT_NOTIFICATION);
        }

        let artifact_reference = match reference {
            Some(reference) if success => {
                self.artifacts.insert(session.target_index, reference.clone());
                Some(reference)
            }
            Some(reference) => {
                debug!(%reference, "partial recording kept for diagnostics");
                self.artifacts.keep_diagnostic(reference);
                None
            }
            None => None,
        };

        info!(
            target_index = session.target_index,
            success,
            size = %pretty_file_size(total_bytes, false),
            "recording finished"
        );
        self.send(Outbound::CaptureStop(StopReport {
            target_index: session.target_index,
            artifact_reference,
            success,
            total_bytes,
            start_timestamp: session.start_timestamp,
        }));
        self.chunks.reset();
    }

    fn post_inventory(&mut self) {
        let canvases = self.tracker.records(self.host.document.as_ref());
        let active_index = self
            .recorder
            .session()
            .filter(|s| !s.surface_removed)
            .map(|s| s.target_index);
        self.send(Outbound::UpdateCanvases(InventoryReport {
            canvases,
            active_index,
        }));
    }

    fn notify(&mut self, notification: &str) {
        self.send(Outbound::Notify {
            notification: notification.to_owned(),
        });
    }

    fn send(&mut self, body: Outbound) {
        let command = body.command();
        let envelope = Envelope {
            tab_id: self.tab_id.clone(),
            frame_id: self.frame_id.clone(),
            frame_identity: self.identity.clone(),
            target_frame_identity: Address::Top,
            body,
        };
        if let Err(e) = self.port.post(envelope) {
            warn!(command, error = %e, "failed to post message");
        }
    }
}
