//! In-memory host for tests and the headless CLI.
//!
//! Every type here is a cheap cloneable handle over shared state, so a test
//! can keep one clone to mutate the document or inspect posted messages
//! while the agent owns another.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::CaptureError;
use crate::host::{
    Artifact, ArtifactReference, ArtifactStore, CaptureBackend, Chunk, Document, DownloadHelper,
    EncoderGeneration, EncoderOptions, HostEvent, Port,
};
use crate::protocol::Envelope;
use crate::surface::{
    MutatedNode, MutationRecord, NodeId, Rect, SurfaceAttributes, OBSERVED_ATTRIBUTES,
};

const DEFAULT_MIME_TYPE: &str = "video/webm";

// ── Document ────────────────────────────────────────────────────────────────

struct SimSurface {
    id: NodeId,
    parent: Option<NodeId>,
    attributes: SurfaceAttributes,
    capturable: bool,
    observed: bool,
    markers: HashSet<String>,
}

#[derive(Default)]
struct DocumentState {
    /// Surfaces in document order.
    surfaces: Vec<SimSurface>,
    containers: HashSet<NodeId>,
    next_id: u64,
}

impl DocumentState {
    fn allocate(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    fn find(&self, surface: NodeId) -> Option<&SimSurface> {
        self.surfaces.iter().find(|s| s.id == surface)
    }

    fn find_mut(&mut self, surface: NodeId) -> Option<&mut SimSurface> {
        self.surfaces.iter_mut().find(|s| s.id == surface)
    }
}

/// Document with a flat list of surfaces, optionally grouped under
/// container nodes.
#[derive(Clone, Default)]
pub struct SimulatedDocument {
    state: Arc<Mutex<DocumentState>>,
}

impl SimulatedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a surface at the end of the document.
    pub fn add_surface(&self, identifier: &str, width: u32, height: u32) -> (NodeId, MutationRecord) {
        let len = self.state.lock().surfaces.len();
        self.insert_surface(len, identifier, width, height)
    }

    /// Insert a surface before the surface currently at `index`.
    pub fn insert_surface(
        &self,
        index: usize,
        identifier: &str,
        width: u32,
        height: u32,
    ) -> (NodeId, MutationRecord) {
        self.insert(index, None, identifier, width, height)
    }

    /// Create a container node that is not itself a surface.
    pub fn add_container(&self) -> NodeId {
        let mut state = self.state.lock();
        let id = state.allocate();
        state.containers.insert(id);
        id
    }

    /// Append a surface inside `container`.
    pub fn add_surface_in(
        &self,
        container: NodeId,
        identifier: &str,
        width: u32,
        height: u32,
    ) -> (NodeId, MutationRecord) {
        let len = self.state.lock().surfaces.len();
        self.insert(len, Some(container), identifier, width, height)
    }

    fn insert(
        &self,
        index: usize,
        parent: Option<NodeId>,
        identifier: &str,
        width: u32,
        height: u32,
    ) -> (NodeId, MutationRecord) {
        let mut state = self.state.lock();
        let id = state.allocate();
        let index = index.min(state.surfaces.len());
        state.surfaces.insert(
            index,
            SimSurface {
                id,
                parent,
                attributes: SurfaceAttributes {
                    identifier: identifier.to_owned(),
                    width,
                    height,
                },
                capturable: true,
                observed: false,
                markers: HashSet::new(),
            },
        );
        let record = MutationRecord::ChildList {
            added: vec![MutatedNode::surface(id)],
            removed: vec![],
        };
        (id, record)
    }

    /// Remove a surface or a container together with its surfaces.
    pub fn remove(&self, node: NodeId) -> MutationRecord {
        let mut state = self.state.lock();
        state.containers.remove(&node);
        let mut surfaces = Vec::new();
        state.surfaces.retain(|s| {
            let hit = s.id == node || s.parent == Some(node);
            if hit {
                surfaces.push(s.id);
            }
            !hit
        });
        MutationRecord::ChildList {
            added: vec![],
            removed: vec![MutatedNode { node, surfaces }],
        }
    }

    /// Change an attribute. Returns the record an attribute observer would
    /// receive, which is only produced for observed surfaces and attributes.
    pub fn set_attribute(&self, surface: NodeId, name: &str, value: &str) -> Option<MutationRecord> {
        let mut state = self.state.lock();
        let entry = state.find_mut(surface)?;
        match name {
            "id" => entry.attributes.identifier = value.to_owned(),
            "width" => entry.attributes.width = value.parse().unwrap_or_default(),
            "height" => entry.attributes.height = value.parse().unwrap_or_default(),
            _ => {}
        }
        (entry.observed && OBSERVED_ATTRIBUTES.contains(&name)).then(|| MutationRecord::Attributes {
            target: surface,
            attribute: name.to_owned(),
        })
    }

    pub fn set_capturable(&self, surface: NodeId, capturable: bool) {
        if let Some(entry) = self.state.lock().find_mut(surface) {
            entry.capturable = capturable;
        }
    }

    pub fn is_capturable(&self, surface: NodeId) -> bool {
        self.state.lock().find(surface).is_some_and(|s| s.capturable)
    }

    pub fn is_observed(&self, surface: NodeId) -> bool {
        self.state.lock().find(surface).is_some_and(|s| s.observed)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        let state = self.state.lock();
        state.containers.contains(&node) || state.find(node).is_some()
    }

    pub fn surface_count(&self) -> usize {
        self.state.lock().surfaces.len()
    }
}

impl Document for SimulatedDocument {
    fn query_surfaces(&self) -> Vec<NodeId> {
        self.state.lock().surfaces.iter().map(|s| s.id).collect()
    }

    fn attributes(&self, surface: NodeId) -> Option<SurfaceAttributes> {
        self.state.lock().find(surface).map(|s| s.attributes.clone())
    }

    fn bounding_rect(&self, surface: NodeId) -> Option<Rect> {
        let state = self.state.lock();
        let mut y = 0.0;
        for s in &state.surfaces {
            if s.id == surface {
                return Some(Rect::from_origin_size(
                    0.0,
                    y,
                    f64::from(s.attributes.width),
                    f64::from(s.attributes.height),
                ));
            }
            y += f64::from(s.attributes.height);
        }
        None
    }

    fn observe_attributes(&mut self, surface: NodeId) {
        if let Some(entry) = self.state.lock().find_mut(surface) {
            entry.observed = true;
        }
    }

    fn add_marker(&mut self, surface: NodeId, marker: &str) {
        if let Some(entry) = self.state.lock().find_mut(surface) {
            entry.markers.insert(marker.to_owned());
        }
    }

    fn remove_marker(&mut self, surface: NodeId, marker: &str) {
        if let Some(entry) = self.state.lock().find_mut(surface) {
            entry.markers.remove(marker);
        }
    }

    fn has_marker(&self, surface: NodeId, marker: &str) -> bool {
        self.state
            .lock()
            .find(surface)
            .is_some_and(|s| s.markers.contains(marker))
    }
}

// ── Capture backend ─────────────────────────────────────────────────────────

struct ChunkPump {
    events: mpsc::UnboundedSender<HostEvent>,
    chunk_size: usize,
    task: Option<JoinHandle<()>>,
}

struct CaptureState {
    document: SimulatedDocument,
    fail_stream: bool,
    fail_encoder: bool,
    reject_preferred_options: bool,
    hang_on_stop: bool,
    streams_opened: Vec<(NodeId, u32)>,
    streams_closed: u32,
    encoder_options: Vec<Option<EncoderOptions>>,
    stop_requests: u32,
    recording: bool,
    generation: Option<EncoderGeneration>,
    mime_type: String,
    pump: Option<ChunkPump>,
}

/// Capture backend backed by a [`SimulatedDocument`].
///
/// Without a chunk pump, chunks and the finalize callback are delivered by
/// the caller. With one, a tokio task emits a zero-filled chunk per
/// timeslice and `stop_encoder` sends a last chunk plus `EncoderStopped`.
#[derive(Clone)]
pub struct SimulatedCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl SimulatedCapture {
    pub fn new(document: SimulatedDocument) -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState {
                document,
                fail_stream: false,
                fail_encoder: false,
                reject_preferred_options: false,
                hang_on_stop: false,
                streams_opened: Vec::new(),
                streams_closed: 0,
                encoder_options: Vec::new(),
                stop_requests: 0,
                recording: false,
                generation: None,
                mime_type: DEFAULT_MIME_TYPE.to_owned(),
                pump: None,
            })),
        }
    }

    pub fn with_chunk_pump(self, events: mpsc::UnboundedSender<HostEvent>, chunk_size: usize) -> Self {
        self.state.lock().pump = Some(ChunkPump {
            events,
            chunk_size,
            task: None,
        });
        self
    }

    pub fn fail_stream(&self, fail: bool) {
        self.state.lock().fail_stream = fail;
    }

    pub fn fail_encoder(&self, fail: bool) {
        self.state.lock().fail_encoder = fail;
    }

    /// Reject explicit encoder options so the caller has to fall back.
    pub fn reject_preferred_options(&self, reject: bool) {
        self.state.lock().reject_preferred_options = reject;
    }

    /// Never deliver `EncoderStopped` after a stop request.
    pub fn hang_on_stop(&self, hang: bool) {
        self.state.lock().hang_on_stop = hang;
    }

    pub fn streams_opened(&self) -> Vec<(NodeId, u32)> {
        self.state.lock().streams_opened.clone()
    }

    pub fn streams_closed(&self) -> u32 {
        self.state.lock().streams_closed
    }

    pub fn encoder_options(&self) -> Vec<Option<EncoderOptions>> {
        self.state.lock().encoder_options.clone()
    }

    pub fn stop_requests(&self) -> u32 {
        self.state.lock().stop_requests
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    /// Generation of the most recently started encoder.
    pub fn last_generation(&self) -> Option<EncoderGeneration> {
        self.state.lock().generation
    }
}

impl CaptureBackend for SimulatedCapture {
    fn probe(&mut self, surface: NodeId) -> bool {
        self.state.lock().document.is_capturable(surface)
    }

    fn open_stream(&mut self, surface: NodeId, frames_per_second: u32) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.fail_stream || !state.document.is_capturable(surface) {
            return Err(CaptureError::StreamUnavailable(format!(
                "{surface} refused to produce a stream"
            )));
        }
        state.streams_opened.push((surface, frames_per_second));
        Ok(())
    }

    fn start_encoder(
        &mut self,
        generation: EncoderGeneration,
        options: Option<&EncoderOptions>,
        timeslice: Duration,
    ) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.encoder_options.push(options.cloned());
        if state.fail_encoder {
            return Err(CaptureError::EncoderUnavailable("encoder construction failed".into()));
        }
        if options.is_some() && state.reject_preferred_options {
            return Err(CaptureError::EncoderUnavailable("unsupported encoder options".into()));
        }
        state.mime_type = options
            .map(|o| o.mime_type.clone())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_owned());
        let mime_type = state.mime_type.clone();
        state.generation = Some(generation);

        if let Some(pump) = state.pump.as_mut() {
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|e| CaptureError::EncoderUnavailable(e.to_string()))?;
            let events = pump.events.clone();
            let chunk_size = pump.chunk_size;
            pump.task = Some(handle.spawn(async move {
                let mut interval = tokio::time::interval(timeslice);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let chunk = Chunk::new(vec![0u8; chunk_size], mime_type.clone());
                    if events.send(HostEvent::Chunk { generation, chunk }).is_err() {
                        break;
                    }
                }
            }));
        }
        state.recording = true;
        Ok(())
    }

    fn stop_encoder(&mut self) {
        let mut state = self.state.lock();
        if !state.recording {
            return;
        }
        state.recording = false;
        state.stop_requests += 1;
        let hang = state.hang_on_stop;
        let mime_type = state.mime_type.clone();
        let Some(generation) = state.generation else {
            return;
        };
        if let Some(pump) = state.pump.as_mut() {
            if let Some(task) = pump.task.take() {
                task.abort();
            }
            let chunk = Chunk::new(vec![0u8; pump.chunk_size], mime_type);
            let _ = pump.events.send(HostEvent::Chunk { generation, chunk });
            if !hang {
                let _ = pump.events.send(HostEvent::EncoderStopped { generation });
            }
        }
    }

    fn close_stream(&mut self) {
        self.state.lock().streams_closed += 1;
    }
}

// ── Artifact store ──────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreState {
    artifacts: HashMap<ArtifactReference, Artifact>,
    helpers: HashMap<u64, ArtifactReference>,
    saved: Vec<(ArtifactReference, String)>,
    revocations: u32,
    next_helper: u64,
    output_dir: Option<PathBuf>,
}

/// Artifact store keeping recordings in memory and optionally writing saved
/// files to a directory.
#[derive(Clone, Default)]
pub struct MemoryArtifactStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_dir(dir: impl Into<PathBuf>) -> Self {
        let store = Self::default();
        store.state.lock().output_dir = Some(dir.into());
        store
    }

    pub fn get(&self, reference: &ArtifactReference) -> Option<Artifact> {
        self.state.lock().artifacts.get(reference).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().artifacts.len()
    }

    /// Number of references actually revoked.
    pub fn revocations(&self) -> u32 {
        self.state.lock().revocations
    }

    pub fn saved(&self) -> Vec<(ArtifactReference, String)> {
        self.state.lock().saved.clone()
    }

    pub fn helper_count(&self) -> usize {
        self.state.lock().helpers.len()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn create(&mut self, artifact: Artifact) -> ArtifactReference {
        let reference =
            ArtifactReference::from_raw(format!("blob:canvas-capture/{}", uuid::Uuid::new_v4()));
        self.state.lock().artifacts.insert(reference.clone(), artifact);
        reference
    }

    fn revoke(&mut self, reference: &ArtifactReference) {
        let mut state = self.state.lock();
        if state.artifacts.remove(reference).is_some() {
            state.revocations += 1;
        }
    }

    fn save(
        &mut self,
        reference: &ArtifactReference,
        file_name: &str,
    ) -> Result<DownloadHelper, CaptureError> {
        let mut state = self.state.lock();
        let artifact = state
            .artifacts
            .get(reference)
            .ok_or_else(|| CaptureError::SaveFailed(format!("{reference} is not a live artifact")))?;
        if let Some(dir) = &state.output_dir {
            std::fs::write(dir.join(file_name), &artifact.data)
                .map_err(|e| CaptureError::SaveFailed(e.to_string()))?;
        }
        state.next_helper += 1;
        let helper = state.next_helper;
        state.helpers.insert(helper, reference.clone());
        state.saved.push((reference.clone(), file_name.to_owned()));
        Ok(DownloadHelper(helper))
    }

    fn detach(&mut self, helper: DownloadHelper) {
        self.state.lock().helpers.remove(&helper.0);
    }
}

// ── Port ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct PortState {
    messages: Vec<Envelope>,
    closed: bool,
}

/// Port that records every posted envelope.
#[derive(Clone, Default)]
pub struct RecordingPort {
    state: Arc<Mutex<PortState>>,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Envelope> {
        self.state.lock().messages.clone()
    }

    /// Drain recorded envelopes.
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut self.state.lock().messages)
    }

    pub fn commands(&self) -> Vec<&'static str> {
        self.state.lock().messages.iter().map(|m| m.body.command()).collect()
    }

    /// Make every later post fail.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

impl Port for RecordingPort {
    fn post(&mut self, envelope: Envelope) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CaptureError::ChannelClosed("recording port closed".into()));
        }
        state.messages.push(envelope);
        Ok(())
    }
}
