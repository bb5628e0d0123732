//! Line codec for AT links
//!
//! Outgoing payloads are text or hex bytes followed by the configured line
//! ending. Incoming bytes are split into lines on CR and LF; empty lines
//! (the blank line modems put around responses) are dropped.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};
use crate::model::{DataFormat, LineEnding};

/// Longest line kept before it is flushed without a terminator
const MAX_LINE_LEN: usize = 64 * 1024;

/// Encode an outgoing payload
///
/// Hex payloads are whitespace-separated byte pairs, with an optional `0x`
/// prefix per group (`"41 54 0D"`, `"0x4154"`).
pub fn encode_payload(payload: &str, format: DataFormat, line_ending: LineEnding) -> Result<Vec<u8>> {
    let mut bytes = match format {
        DataFormat::Text => payload.as_bytes().to_vec(),
        DataFormat::Hex => {
            let digits: String = payload
                .split_whitespace()
                .map(|group| {
                    group
                        .strip_prefix("0x")
                        .or_else(|| group.strip_prefix("0X"))
                        .unwrap_or(group)
                })
                .collect();
            hex::decode(&digits).map_err(|e| Error::invalid_hex(payload, e))?
        }
    };
    bytes.extend_from_slice(line_ending.as_bytes());
    Ok(bytes)
}

/// Write one encoded frame and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Incremental splitter turning received bytes into lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes, returning every line they complete
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            if byte == b'\r' || byte == b'\n' {
                self.flush_into(&mut lines);
            } else {
                self.buf.push(byte);
                if self.buf.len() >= MAX_LINE_LEN {
                    self.flush_into(&mut lines);
                }
            }
        }
        lines
    }

    /// Take whatever is left without a terminator (end of stream)
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.flush_into(&mut lines);
        lines.pop()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        if self.buf.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
}
