//! End-to-end scenarios: JSON controller messages in, envelopes out, with
//! the simulated host producing chunks on a paused clock.

use std::time::Duration;

use capture_agent::{AgentConfig, CaptureAgent, CaptureState};
use capture_core::host::{Chunk, Host, HostEvent};
use capture_core::protocol::{
    Envelope, Outbound, StopReport, FINALIZE_TIMEOUT_NOTIFICATION, SURFACE_REMOVED_NOTIFICATION,
};
use capture_core::sim::{MemoryArtifactStore, SimulatedCapture, SimulatedDocument};
use capture_core::surface::NodeId;
use capture_core::FrameIdentity;
use capture_router::{forward_host_events, run, AgentInput, ChannelPort};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHUNK_SIZE: usize = 100;

struct Scenario {
    doc: SimulatedDocument,
    capture: SimulatedCapture,
    store: MemoryArtifactStore,
    surfaces: Vec<NodeId>,
    inputs: mpsc::UnboundedSender<AgentInput>,
    outputs: mpsc::UnboundedReceiver<Envelope>,
    cancel: CancellationToken,
    agent: JoinHandle<CaptureAgent>,
}

impl Scenario {
    fn start(surfaces: &[&str], config: AgentConfig) -> Self {
        let doc = SimulatedDocument::new();
        let surface_ids = surfaces
            .iter()
            .map(|name| doc.add_surface(name, 640, 480).0)
            .collect();

        let (inputs, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _forwarder = forward_host_events(event_rx, inputs.clone());

        let capture = SimulatedCapture::new(doc.clone()).with_chunk_pump(event_tx, CHUNK_SIZE);
        let store = MemoryArtifactStore::new();
        let (port, outputs) = ChannelPort::channel();
        let host = Host::new(doc.clone(), capture.clone(), store.clone());
        let agent = CaptureAgent::with_identity(
            FrameIdentity::from_raw("frame-a"),
            config,
            host,
            port,
        );
        let cancel = CancellationToken::new();
        let agent = tokio::spawn(run(agent, input_rx, cancel.clone()));

        Self {
            doc,
            capture,
            store,
            surfaces: surface_ids,
            inputs,
            outputs,
            cancel,
            agent,
        }
    }

    fn send(&self, json: &str) {
        self.inputs.send(AgentInput::Message(json.to_owned())).unwrap();
    }

    fn host(&self, event: HostEvent) {
        self.inputs.send(AgentInput::Host(event)).unwrap();
    }

    /// Next outbound envelope with the given command, skipping others.
    async fn expect(&mut self, command: &str) -> Envelope {
        loop {
            let envelope = tokio::time::timeout(Duration::from_secs(60), self.outputs.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("outbound channel closed");
            if envelope.body.command() == command {
                return envelope;
            }
        }
    }

    async fn expect_stop(&mut self) -> StopReport {
        match self.expect("capture-stop").await.body {
            Outbound::CaptureStop(report) => report,
            other => panic!("unexpected body: {other:?}"),
        }
    }

    async fn expect_ack(&mut self) -> bool {
        match self.expect("capture-start").await.body {
            Outbound::CaptureStart { success } => success,
            other => panic!("unexpected body: {other:?}"),
        }
    }

    /// Wait until everything queued so far was handled, then stop the loop.
    async fn finish(mut self) -> CaptureAgent {
        self.send(r#"{"command":"update-canvases"}"#);
        self.expect("update-canvases").await;
        self.cancel.cancel();
        self.agent.await.unwrap()
    }
}

fn config() -> AgentConfig {
    AgentConfig {
        capture_interval: Duration::from_millis(1000),
        finalize_timeout: Duration::from_millis(5000),
        ..AgentConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn size_ceiling_stops_recording_with_success() {
    let mut s = Scenario::start(&["scene"], config());
    s.send(r#"{"command":"display","defaultSettings":{"maxVideoSize":300},"tabId":1}"#);
    s.expect("update-canvases").await;
    s.send(r#"{"command":"capture-start","targetIndex":0,"fps":30,"bps":2500000}"#);
    assert!(s.expect_ack().await);

    let report = s.expect_stop().await;
    assert!(report.success);
    assert_eq!(report.target_index, 0);
    // Three flushes reach the ceiling; the flush emitted by the stop is kept.
    assert_eq!(report.total_bytes, 400);
    let reference = report.artifact_reference.expect("usable artifact");
    assert_eq!(s.store.get(&reference).unwrap().size(), 400);
    assert_eq!(s.capture.stop_requests(), 1);

    let agent = s.finish().await;
    assert_eq!(agent.state(), CaptureState::Idle);
}

#[tokio::test(start_paused = true)]
async fn removed_surface_fails_recording_and_notifies() {
    let mut s = Scenario::start(&["first", "second"], config());
    s.send(r#"{"command":"update-canvases"}"#);
    s.expect("update-canvases").await;
    s.send(r#"{"command":"capture-start","targetIndex":1}"#);
    assert!(s.expect_ack().await);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let record = s.doc.remove(s.surfaces[1]);
    s.host(HostEvent::Mutations(vec![record]));

    let notify = s.expect("notify").await;
    match notify.body {
        Outbound::Notify { notification } => {
            assert_eq!(notification, SURFACE_REMOVED_NOTIFICATION)
        }
        other => panic!("unexpected body: {other:?}"),
    }
    let report = s.expect_stop().await;
    assert!(!report.success);
    assert!(report.artifact_reference.is_none());

    let agent = s.finish().await;
    assert_eq!(agent.state(), CaptureState::Idle);
    assert_eq!(agent.artifacts().diagnostics().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_recording() {
    let mut s = Scenario::start(&["a", "b"], config());
    s.send(r#"{"command":"update-canvases"}"#);
    s.send(r#"{"command":"capture-start","targetIndex":0}"#);
    assert!(s.expect_ack().await);
    s.send(r#"{"command":"capture-start","targetIndex":1}"#);
    assert!(!s.expect_ack().await);

    s.send(r#"{"command":"capture-stop"}"#);
    let report = s.expect_stop().await;
    assert!(report.success);
    assert_eq!(report.target_index, 0);
    assert_eq!(s.capture.streams_opened().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn lost_finalize_callback_times_out() {
    let mut s = Scenario::start(&["a"], config());
    s.capture.hang_on_stop(true);
    s.send(r#"{"command":"update-canvases"}"#);
    s.send(r#"{"command":"capture-start","targetIndex":0}"#);
    assert!(s.expect_ack().await);
    tokio::time::sleep(Duration::from_millis(2500)).await;
    s.send(r#"{"command":"capture-stop"}"#);

    match s.expect("notify").await.body {
        Outbound::Notify { notification } => {
            assert_eq!(notification, FINALIZE_TIMEOUT_NOTIFICATION)
        }
        other => panic!("unexpected body: {other:?}"),
    }
    let report = s.expect_stop().await;
    assert!(!report.success);
    assert_eq!(report.total_bytes, 300);

    // A late callback does not produce a second report.
    let abandoned = s.capture.last_generation().unwrap();
    s.host(HostEvent::EncoderStopped {
        generation: abandoned,
    });
    s.send(r#"{"command":"update-canvases"}"#);
    s.expect("update-canvases").await;
    assert!(s.outputs.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn restart_after_timeout_ignores_the_abandoned_encoder() {
    let mut s = Scenario::start(&["a"], config());
    s.capture.hang_on_stop(true);
    s.send(r#"{"command":"update-canvases"}"#);
    s.send(r#"{"command":"capture-start","targetIndex":0}"#);
    assert!(s.expect_ack().await);
    s.send(r#"{"command":"capture-stop"}"#);
    assert!(!s.expect_stop().await.success);
    let abandoned = s.capture.last_generation().unwrap();

    s.capture.hang_on_stop(false);
    s.send(r#"{"command":"capture-start","targetIndex":0}"#);
    assert!(s.expect_ack().await);
    s.host(HostEvent::Chunk {
        generation: abandoned,
        chunk: Chunk::new(vec![0u8; 7], "video/webm"),
    });
    s.host(HostEvent::EncoderStopped {
        generation: abandoned,
    });

    tokio::time::sleep(Duration::from_millis(1500)).await;
    s.send(r#"{"command":"capture-stop"}"#);
    let report = s.expect_stop().await;
    assert!(report.success);
    assert_eq!(report.total_bytes, 2 * CHUNK_SIZE as u64);
    let agent = s.finish().await;
    assert_eq!(agent.state(), CaptureState::Idle);
}

#[tokio::test(start_paused = true)]
async fn highlight_of_missing_surface_replies_without_rect() {
    let mut s = Scenario::start(&["only"], config());
    s.send(r#"{"command":"update-canvases"}"#);
    s.send(r#"{"command":"highlight","targetIndex":4}"#);
    let json = serde_json::to_value(s.expect("highlight").await).unwrap();
    assert!(json["rect"].is_null());
    assert_eq!(json["canCapture"], false);

    s.send(r#"{"command":"highlight","canvasIndex":0}"#);
    let json = serde_json::to_value(s.expect("highlight").await).unwrap();
    assert_eq!(json["rect"]["width"], 640.0);
    assert_eq!(json["canCapture"], true);
}

#[tokio::test(start_paused = true)]
async fn garbage_and_unknown_commands_do_not_stop_the_agent() {
    let mut s = Scenario::start(&["a"], config());
    s.send("{definitely not json");
    s.send(r#"{"command":"reticulate-splines"}"#);
    s.send(r#"{"command":"capture-start"}"#);
    assert!(!s.expect_ack().await);
    s.send(r#"{"command":"update-canvases"}"#);
    let envelope = s.expect("update-canvases").await;
    assert_eq!(envelope.frame_identity.as_str(), "frame-a");
}

#[tokio::test(start_paused = true)]
async fn inventory_follows_document_after_mutations() {
    let mut s = Scenario::start(&["a", "b", "c"], config());
    s.send(r#"{"command":"update-canvases"}"#);
    s.expect("update-canvases").await;

    let removed = s.doc.remove(s.surfaces[1]);
    let (_, inserted) = s.doc.insert_surface(0, "z", 10, 10);
    s.host(HostEvent::Mutations(vec![removed, inserted]));

    match s.expect("update-canvases").await.body {
        Outbound::UpdateCanvases(report) => {
            let names: Vec<_> = report.canvases.iter().map(|c| c.identifier.as_str()).collect();
            assert_eq!(names, vec!["z", "a", "c"]);
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn download_and_disable_release_artifacts_once() {
    let mut s = Scenario::start(&["a"], config());
    s.send(r#"{"command":"update-canvases"}"#);
    s.send(r#"{"command":"capture-start","targetIndex":0}"#);
    assert!(s.expect_ack().await);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    s.send(r#"{"command":"capture-stop"}"#);
    assert!(s.expect_stop().await.success);

    s.send(r#"{"command":"download","targetIndex":0}"#);
    s.send(r#"{"command":"disable"}"#);
    s.send(r#"{"command":"disable"}"#);
    let store = s.store.clone();
    let agent = s.finish().await;

    assert_eq!(store.saved().len(), 1);
    assert_eq!(store.revocations(), 1);
    assert_eq!(store.helper_count(), 0);
    assert_eq!(store.live_count(), 0);
    assert_eq!(agent.artifacts().live_count(), 0);
    assert!(agent.artifacts().resolve(0).is_none());
}
