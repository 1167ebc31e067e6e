//! Agent-side message routing.
//!
//! Parses inbound controller messages, dispatches them to the
//! [`CaptureAgent`](capture_agent::CaptureAgent), and runs the single event
//! queue that interleaves controller messages with host events.

pub mod compat;
pub mod handlers;
pub mod port;
pub mod runtime;
pub mod wire;

pub use handlers::{dispatch, Dispatch};
pub use port::ChannelPort;
pub use runtime::{forward_host_events, handle_line, run, AgentInput};
pub use wire::{parse_message, InboundMessage};
