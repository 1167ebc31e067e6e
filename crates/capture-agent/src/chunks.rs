use bytes::BytesMut;
use capture_core::host::{Artifact, Chunk};
use tracing::warn;

/// Outcome of offering a chunk to the accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Zero-length chunk, dropped.
    Ignored,
    Accepted,
    /// Accepted, and the running total is at or above the ceiling.
    CeilingReached,
}

/// Ordered chunk buffer for the active recording.
///
/// Append-only until [`assemble`](Self::assemble), which drains it.
#[derive(Debug)]
pub struct ChunkAccumulator {
    chunks: Vec<Chunk>,
    accumulated: u64,
    ceiling: u64,
    mixed_media_types: bool,
}

impl ChunkAccumulator {
    pub fn new(ceiling: u64) -> Self {
        Self {
            chunks: Vec::new(),
            accumulated: 0,
            ceiling,
            mixed_media_types: false,
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn set_ceiling(&mut self, ceiling: u64) {
        self.ceiling = ceiling;
    }

    pub fn accumulated_bytes(&self) -> u64 {
        self.accumulated
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// A chunk with a media type different from the first one was seen.
    pub fn mixed_media_types(&self) -> bool {
        self.mixed_media_types
    }

    /// Append a chunk in delivery order.
    pub fn push(&mut self, chunk: Chunk) -> ChunkOutcome {
        let size = chunk.size();
        if size == 0 {
            return ChunkOutcome::Ignored;
        }
        if let Some(first) = self.chunks.first() {
            if first.mime_type != chunk.mime_type && !self.mixed_media_types {
                warn!(
                    expected = %first.mime_type,
                    got = %chunk.mime_type,
                    "chunk media type differs from first chunk, assembling as first type"
                );
                self.mixed_media_types = true;
            }
        }
        self.chunks.push(chunk);
        self.accumulated = self.accumulated.saturating_add(size);
        if self.accumulated >= self.ceiling {
            ChunkOutcome::CeilingReached
        } else {
            ChunkOutcome::Accepted
        }
    }

    /// Concatenate all chunks into one artifact typed after the first chunk.
    /// Returns `None` when nothing was collected. Single use: the buffer is
    /// empty afterwards.
    pub fn assemble(&mut self) -> Option<Artifact> {
        let first = self.chunks.first()?;
        let mime_type = first.mime_type.clone();
        let total: usize = self.chunks.iter().map(|c| c.data.len()).sum();
        let mut data = BytesMut::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            data.extend_from_slice(&chunk.data);
        }
        Some(Artifact {
            data: data.freeze(),
            mime_type,
        })
    }

    /// Drop buffered chunks and zero the counters for a new session.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.accumulated = 0;
        self.mixed_media_types = false;
    }
}
