// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Line-oriented hardware reader shared by serial and wireless transports

use std::fmt;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::time::timeout;

use super::{ReadOutcome, TransportKind};
use crate::error::ReadError;
use crate::frame::{parse_record, SensorFrame, SourceTag};

/// Longest record accepted, newline excluded
pub const MAX_RECORD_LEN: usize = 256;

/// An opened byte stream from a device
pub type BoxedTransport = Box<dyn AsyncRead + Send + Unpin>;

/// Hardware source reading newline-delimited records
///
/// Owns its transport: dropping the source closes the port or socket.
pub struct HardwareSource {
    kind: TransportKind,
    label: String,
    reader: BufReader<BoxedTransport>,
    /// Bytes of a record not yet terminated by a newline
    pending: Vec<u8>,
    poll_timeout: Duration,
}

impl HardwareSource {
    pub fn new(
        kind: TransportKind,
        label: impl Into<String>,
        transport: BoxedTransport,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            reader: BufReader::new(transport),
            pending: Vec::with_capacity(128),
            poll_timeout,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Device label reported to subscribers
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read one record, waiting at most the poll timeout
    ///
    /// A record cut by the timeout stays buffered and is completed by a later
    /// call. Blank lines read as `Empty`. A record growing past
    /// [`MAX_RECORD_LEN`] without a newline is discarded as malformed.
    pub async fn read_frame(&mut self) -> Result<ReadOutcome, ReadError> {
        // pending never exceeds MAX_RECORD_LEN here, so the limit is at least 1
        let limit = (MAX_RECORD_LEN + 1).saturating_sub(self.pending.len()) as u64;
        let mut bounded = (&mut self.reader).take(limit);
        let read = timeout(
            self.poll_timeout,
            bounded.read_until(b'\n', &mut self.pending),
        )
        .await;

        if self.pending.len() > MAX_RECORD_LEN && !self.pending.ends_with(b"\n") {
            return Err(self.discard_oversized());
        }

        match read {
            Err(_) => Ok(ReadOutcome::Empty),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(0)) => Err(ReadError::TransportClosed),
            Ok(Ok(_)) if !self.pending.ends_with(b"\n") => {
                // EOF in the middle of a record; the next read reports the close
                Ok(ReadOutcome::Empty)
            }
            Ok(Ok(_)) => {
                let line = std::mem::take(&mut self.pending);
                let text = String::from_utf8_lossy(&line);
                if text.trim().is_empty() {
                    return Ok(ReadOutcome::Empty);
                }
                let readings = parse_record(&text).map_err(|e| {
                    debug!("{}: dropping record: {}", self.label, e);
                    e
                })?;
                Ok(ReadOutcome::Frame(SensorFrame::new(
                    readings,
                    SourceTag::Hardware,
                )))
            }
        }
    }
}

impl HardwareSource {
    fn discard_oversized(&mut self) -> ReadError {
        let head = String::from_utf8_lossy(&self.pending[..32]).into_owned();
        debug!("{}: discarding {} bytes without newline", self.label, self.pending.len());
        self.pending.clear();
        ReadError::Malformed {
            record: head,
            reason: format!("no newline within {} bytes", MAX_RECORD_LEN),
        }
    }
}

impl fmt::Debug for HardwareSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareSource")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("pending", &self.pending.len())
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}
