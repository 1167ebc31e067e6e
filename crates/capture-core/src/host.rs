//! Capabilities the agent consumes from its host.
//!
//! The document, capture stream, encoder, artifact storage and the message
//! port are all supplied by the embedding environment. The agent never talks
//! to them except through these traits, so tests and the CLI can substitute
//! the in-memory implementations from [`crate::sim`].

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::CaptureError;
use crate::protocol::Envelope;
use crate::surface::{MutationRecord, NodeId, Rect, SurfaceAttributes};

/// Read/mark access to the live document.
pub trait Document: Send {
    /// All capturable surfaces, in document order.
    fn query_surfaces(&self) -> Vec<NodeId>;

    /// Current attributes of a surface, `None` once it left the document.
    fn attributes(&self, surface: NodeId) -> Option<SurfaceAttributes>;

    fn bounding_rect(&self, surface: NodeId) -> Option<Rect>;

    /// Register the surface for attribute observation. Idempotent.
    fn observe_attributes(&mut self, surface: NodeId);

    fn add_marker(&mut self, surface: NodeId, marker: &str);
    fn remove_marker(&mut self, surface: NodeId, marker: &str);
    fn has_marker(&self, surface: NodeId, marker: &str) -> bool;
}

/// Preferred encoder configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderOptions {
    pub mime_type: String,
    pub bits_per_second: u64,
}

/// Identifies one encoder instance. Every chunk and finalize callback is
/// tagged with the generation of the encoder that produced it, so events
/// from an abandoned encoder can be told apart from the current one.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct EncoderGeneration(pub u64);

impl std::fmt::Display for EncoderGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "encoder#{}", self.0)
    }
}

/// Stream capture plus encoder.
///
/// After `start_encoder` succeeds the host delivers [`HostEvent::Chunk`] once
/// per timeslice and exactly one [`HostEvent::EncoderStopped`] after
/// `stop_encoder`, both tagged with the generation passed to `start_encoder`.
pub trait CaptureBackend: Send {
    /// Whether the surface can produce a stream at all.
    fn probe(&mut self, surface: NodeId) -> bool;

    fn open_stream(&mut self, surface: NodeId, frames_per_second: u32) -> Result<(), CaptureError>;

    /// `None` asks for the backend's own defaults.
    fn start_encoder(
        &mut self,
        generation: EncoderGeneration,
        options: Option<&EncoderOptions>,
        timeslice: Duration,
    ) -> Result<(), CaptureError>;

    /// Ask the encoder to flush and finalize.
    fn stop_encoder(&mut self);

    /// Release the stream opened by `open_stream`.
    fn close_stream(&mut self);
}

/// One encoded data chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    pub mime_type: String,
}

impl Chunk {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Assembled recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub data: Bytes,
    pub mime_type: String,
}

impl Artifact {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Addressable, revocable handle to an artifact held by the host.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactReference(String);

impl ArtifactReference {
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a helper the host created to trigger a save.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct DownloadHelper(pub u64);

/// Storage for assembled artifacts.
pub trait ArtifactStore: Send {
    fn create(&mut self, artifact: Artifact) -> ArtifactReference;

    /// Revoke a reference. Unknown or already revoked references are ignored.
    fn revoke(&mut self, reference: &ArtifactReference);

    /// Start saving the artifact under `file_name`.
    fn save(
        &mut self,
        reference: &ArtifactReference,
        file_name: &str,
    ) -> Result<DownloadHelper, CaptureError>;

    /// Remove a helper created by `save`.
    fn detach(&mut self, helper: DownloadHelper);
}

/// Outbound half of the addressed channel.
pub trait Port: Send {
    fn post(&mut self, envelope: Envelope) -> Result<(), CaptureError>;
}

/// The host capabilities owned by one agent.
pub struct Host {
    pub document: Box<dyn Document>,
    pub capture: Box<dyn CaptureBackend>,
    pub artifacts: Box<dyn ArtifactStore>,
}

impl Host {
    pub fn new(
        document: impl Document + 'static,
        capture: impl CaptureBackend + 'static,
        artifacts: impl ArtifactStore + 'static,
    ) -> Self {
        Self {
            document: Box::new(document),
            capture: Box::new(capture),
            artifacts: Box::new(artifacts),
        }
    }
}

/// Events delivered by the host on the agent's queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Mutations(Vec<MutationRecord>),
    Chunk {
        generation: EncoderGeneration,
        chunk: Chunk,
    },
    EncoderStopped {
        generation: EncoderGeneration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_byte_length() {
        let chunk = Chunk::new(vec![0u8; 100], "video/webm");
        assert_eq!(chunk.size(), 100);
        assert_eq!(Chunk::new(Bytes::new(), "video/webm").size(), 0);
    }

    #[test]
    fn artifact_reference_is_transparent() {
        let r = ArtifactReference::from_raw("blob:abc");
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"blob:abc\"");
        assert_eq!(r.to_string(), "blob:abc");
    }
}
