pub mod agent;
pub mod artifacts;
pub mod chunks;
pub mod recorder;
pub mod tracker;

pub use agent::{AgentConfig, CaptureAgent};
pub use artifacts::ArtifactRegistry;
pub use chunks::{ChunkAccumulator, ChunkOutcome};
pub use recorder::{CaptureSession, CaptureState, Recorder, StartRequest, ACTIVE_MARKER};
pub use tracker::{StructuralChange, SurfaceTracker};
