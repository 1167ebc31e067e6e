//! The agent's single event queue.
//!
//! Controller messages and host events are funnelled through one channel and
//! handled strictly one at a time. The only other wakeup is the finalize
//! deadline of a pending stop.

use capture_agent::CaptureAgent;
use capture_core::host::HostEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handlers::{dispatch, Dispatch};
use crate::wire::parse_message;

/// One item on the agent's queue.
#[derive(Debug)]
pub enum AgentInput {
    /// Raw controller message, one JSON object.
    Message(String),
    Host(HostEvent),
}

/// Parse and dispatch one raw controller message.
pub fn handle_line(agent: &mut CaptureAgent, line: &str) -> Dispatch {
    match parse_message(line) {
        Ok(message) => dispatch(agent, &message),
        Err(e) => {
            warn!(error = %e, kind = e.error_kind(), "malformed message dropped");
            Dispatch::Failed(e)
        }
    }
}

/// Drive `agent` until the queue closes or `cancel` fires, then hand it
/// back for inspection. Inputs already queued are handled before a
/// cancellation is noticed.
pub async fn run(
    mut agent: CaptureAgent,
    mut inputs: mpsc::UnboundedReceiver<AgentInput>,
    cancel: CancellationToken,
) -> CaptureAgent {
    info!(frame_identity = %agent.identity(), "agent event loop started");
    loop {
        let deadline = agent.finalize_deadline();
        tokio::select! {
            biased;
            input = inputs.recv() => match input {
                Some(AgentInput::Message(line)) => {
                    handle_line(&mut agent, &line);
                }
                Some(AgentInput::Host(event)) => agent.handle_host_event(event),
                None => break,
            },
            _ = cancel.cancelled() => {
                debug!("event loop cancelled");
                break;
            }
            _ = sleep_until(deadline) => agent.on_finalize_timeout(),
        }
    }
    info!("agent event loop stopped");
    agent
}

/// Forward host events into the agent queue until either side closes.
pub fn forward_host_events(
    mut events: mpsc::UnboundedReceiver<HostEvent>,
    inputs: mpsc::UnboundedSender<AgentInput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if inputs.send(AgentInput::Host(event)).is_err() {
                break;
            }
        }
    })
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
