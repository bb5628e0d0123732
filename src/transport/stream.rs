//! Transport over a byte stream
//!
//! Works with anything that reads and writes bytes: a device simulator's
//! stdio, or a TCP socket exposing a serial port (ser2net and friends).

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc};

use super::codec::{self, LineDecoder};
use super::{SendRequest, Transport};
use crate::common::{Error, Result};

/// Stream-backed transport with a reader and a writer task
pub struct StreamTransport {
    incoming: broadcast::Sender<String>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    closed: Arc<AtomicBool>,
    /// Simulator process, killed when the transport is dropped
    child: Mutex<Option<Child>>,
}

impl StreamTransport {
    /// Drive an arbitrary reader/writer pair
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<R, W>(reader: R, writer: W, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (incoming, _) = broadcast::channel(capacity.max(1));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(read_loop(reader, incoming.clone(), closed.clone()));
        tokio::spawn(write_loop(writer, outgoing_rx, closed.clone()));

        Self {
            incoming,
            outgoing,
            closed,
            child: Mutex::new(None),
        }
    }

    /// Spawn a program and talk to it over its stdin/stdout
    pub async fn spawn(program: &Path, args: &[String], capacity: usize) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::TransportStartFailed(format!("Failed to start {}: {}", program.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::TransportStartFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::TransportStartFailed("Failed to get stdout".to_string()))?;

        tracing::info!(program = %program.display(), "Spawned device process");
        let transport = Self::from_stream(stdout, stdin, capacity);
        *transport.child.lock() = Some(child);
        Ok(transport)
    }

    /// Connect to a serial port exposed over TCP
    pub async fn connect_tcp(addr: &str, capacity: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            Error::TransportStartFailed(format!("Failed to connect to {}: {}", addr, e))
        })?;
        stream.set_nodelay(true)?;
        tracing::info!(addr, "Connected");
        let (reader, writer) = stream.into_split();
        Ok(Self::from_stream(reader, writer, capacity))
    }

    /// Whether the underlying stream has ended
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for StreamTransport {
    fn send_command(&self, request: SendRequest) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        let frame = codec::encode_payload(&request.payload, request.format, request.line_ending)?;
        tracing::debug!(payload = %request.payload, channel = ?request.channel, "send");
        self.outgoing.send(frame).map_err(|_| Error::TransportClosed)
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.incoming.subscribe()
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        // Best-effort, kill_on_drop covers the rest
        if let Some(child) = self.child.get_mut().as_mut() {
            let _ = child.start_kill();
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    incoming: broadcast::Sender<String>,
    closed: Arc<AtomicBool>,
) {
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in decoder.push(&buf[..n]) {
                    tracing::debug!(line = %line, "recv");
                    // No subscribers is fine, the line is simply not observed
                    let _ = incoming.send(line);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transport read failed");
                break;
            }
        }
    }
    if let Some(line) = decoder.finish() {
        let _ = incoming.send(line);
    }
    closed.store(true, Ordering::SeqCst);
    tracing::info!("Transport stream closed");
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: Arc<AtomicBool>,
) {
    while let Some(frame) = outgoing.recv().await {
        if let Err(e) = codec::write_frame(&mut writer, &frame).await {
            tracing::warn!(error = %e, "Transport write failed");
            closed.store(true, Ordering::SeqCst);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_duplex_roundtrip() {
        let (engine_side, device_side) = tokio::io::duplex(256);
        let (engine_read, engine_write) = tokio::io::split(engine_side);
        let (device_read, mut device_write) = tokio::io::split(device_side);

        let transport = StreamTransport::from_stream(engine_read, engine_write, 16);
        let mut rx = transport.subscribe();

        transport.send_command(SendRequest::text("AT+CSQ")).unwrap();
        let mut device_lines = BufReader::new(device_read).lines();
        assert_eq!(device_lines.next_line().await.unwrap().unwrap(), "AT+CSQ");

        device_write.write_all(b"\r\n+CSQ: 23,99\r\n\r\nOK\r\n").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "+CSQ: 23,99");
        assert_eq!(rx.recv().await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_invalid_hex_is_rejected_before_queueing() {
        let (engine_side, _device_side) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(engine_side);
        let transport = StreamTransport::from_stream(r, w, 4);
        let request = SendRequest {
            format: crate::model::DataFormat::Hex,
            ..SendRequest::text("not hex")
        };
        assert!(matches!(
            transport.send_command(request),
            Err(Error::InvalidHex { .. })
        ));
    }
}
