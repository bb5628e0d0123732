//! Transport collaborator
//!
//! The engine only needs two things from a serial link: a fire-and-forget
//! way to send a command, and a stream of received lines. Received lines are
//! published on a broadcast channel; a subscription lives as long as its
//! receiver, so dropping the receiver unsubscribes.

pub mod codec;

mod channel;
mod stream;

pub use channel::ChannelTransport;
pub use stream::StreamTransport;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::common::Result;
use crate::model::{Channel, DataFormat, LineEnding};

/// A command handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    /// Payload after variable substitution, without line ending
    pub payload: String,
    pub format: DataFormat,
    pub line_ending: LineEnding,
    pub channel: Channel,
}

impl SendRequest {
    /// Plain text request with CRLF to all channels
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            format: DataFormat::Text,
            line_ending: LineEnding::CrLf,
            channel: Channel::All,
        }
    }
}

/// Send capability and incoming-line subscription of a serial link
pub trait Transport: Send + Sync {
    /// Queue a command for sending
    ///
    /// Returns once the request is queued. Only encoding and queueing
    /// problems are reported, never anything about the device's answer.
    fn send_command(&self, request: SendRequest) -> Result<()>;

    /// Subscribe to received lines
    fn subscribe(&self) -> broadcast::Receiver<String>;
}
