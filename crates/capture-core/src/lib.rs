pub mod errors;
pub mod format;
pub mod host;
pub mod ids;
pub mod protocol;
pub mod sim;
pub mod surface;

pub use errors::CaptureError;
pub use ids::{Address, FrameIdentity, ALL_FRAMES_ADDRESS, CONTROLLER_ADDRESS, TOP_ADDRESS};
