use capture_core::errors::CaptureError;
use capture_core::host::Port;
use capture_core::protocol::Envelope;
use tokio::sync::mpsc;

/// Port that forwards envelopes into a channel drained by a writer task.
#[derive(Clone, Debug)]
pub struct ChannelPort {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelPort {
    pub fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Port for ChannelPort {
    fn post(&mut self, envelope: Envelope) -> Result<(), CaptureError> {
        self.tx
            .send(envelope)
            .map_err(|_| CaptureError::ChannelClosed("outbound receiver dropped".into()))
    }
}
