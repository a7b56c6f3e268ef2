//! Line framing for the agent's stdio streams.
//!
//! The protocol carries one JSON object per `\n`-terminated UTF-8 line.
//! Decoding buffers partial reads until a full terminator arrives, so a
//! message split across arbitrary read boundaries reassembles identically to
//! an unsplit stream. A per-line byte cap bounds the read buffer when the
//! agent emits an unterminated or oversized line; the session takes the cap
//! from [`AgentConfig::max_frame_bytes`] when it builds its framed streams.
//!
//! [`AgentConfig::max_frame_bytes`]: crate::config::AgentConfig::max_frame_bytes

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Line cap applied when no explicit limit is configured: 1 MiB.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited framing over the agent's stdin and stdout.
///
/// Decoding yields one `String` per complete line; a line longer than the
/// cap fails with [`AppError::Wire`] instead of growing the buffer for it.
/// Encoding appends the `\n` terminator. The cap is a decoder-side concern
/// only.
#[derive(Debug)]
pub struct LineCodec {
    inner: LinesCodec,
    max_line_bytes: usize,
}

impl LineCodec {
    /// Codec with the [`DEFAULT_MAX_LINE_BYTES`] cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_BYTES)
    }

    /// Codec capping inbound lines at `max_line_bytes`.
    #[must_use]
    pub fn with_max_length(max_line_bytes: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_bytes),
            max_line_bytes,
        }
    }

    fn map_error(&self, e: LinesCodecError) -> AppError {
        match e {
            LinesCodecError::MaxLineLengthExceeded => AppError::Wire(format!(
                "line too long: exceeded {} bytes",
                self.max_line_bytes
            )),
            LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    /// Yield the next complete line, or `Ok(None)` while buffering a
    /// partial one.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode(src).map_err(|e| self.map_error(e))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode_eof(src).map_err(|e| self.map_error(e))
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    /// Append `item` and the `\n` terminator to `dst`.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.inner.encode(item, dst).map_err(|e| self.map_error(e))
    }
}
