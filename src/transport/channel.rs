//! In-memory transport for embedding and tests

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use super::{SendRequest, Transport};
use crate::common::{Error, Result};

/// Transport backed by channels instead of a device
///
/// Sent requests are queued for whoever took the outgoing receiver;
/// [`ChannelTransport::inject`] publishes a line as if the device sent it.
pub struct ChannelTransport {
    incoming: broadcast::Sender<String>,
    outgoing_tx: mpsc::UnboundedSender<SendRequest>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<SendRequest>>>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        let (incoming, _) = broadcast::channel(capacity.max(1));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        Self {
            incoming,
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
        }
    }

    /// Publish a received line, returning how many subscribers saw it
    pub fn inject(&self, line: impl Into<String>) -> usize {
        self.incoming.send(line.into()).unwrap_or(0)
    }

    /// Take the queue of sent requests (can only be called once)
    pub fn take_outgoing(&self) -> Option<mpsc::UnboundedReceiver<SendRequest>> {
        self.outgoing_rx.lock().take()
    }

    pub fn subscriber_count(&self) -> usize {
        self.incoming.receiver_count()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Transport for ChannelTransport {
    fn send_command(&self, request: SendRequest) -> Result<()> {
        tracing::debug!(payload = %request.payload, channel = ?request.channel, "send");
        self.outgoing_tx
            .send(request)
            .map_err(|_| Error::TransportClosed)
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.incoming.subscribe()
    }
}
