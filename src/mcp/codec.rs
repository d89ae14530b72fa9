//! Line-delimited JSON-RPC framing
//!
//! Wraps [`tokio_util::codec::LinesCodec`] so that both transports share one
//! framing implementation: every outbound [`JsonRpcMessage`] is written as a
//! single line of JSON terminated by `\n`, and every inbound line is parsed
//! into a [`JsonRpcMessage`].
//!
//! # Decoding
//!
//! Incomplete trailing data stays buffered in the `BytesMut` until the next
//! read completes the line. A line that is not valid UTF-8, is not valid
//! JSON, or exceeds [`MAX_LINE_BYTES`] is logged and discarded; the decoder
//! then moves on to the next line instead of ending the stream. Blank lines
//! are skipped silently.
//!
//! # Usage
//!
//! ```no_run
//! use futures::StreamExt;
//! use mcp_bridge::mcp::codec::JsonRpcCodec;
//! use tokio_util::codec::FramedRead;
//!
//! # async fn example(stream: tokio::net::TcpStream) {
//! let mut frames = FramedRead::new(stream, JsonRpcCodec::new());
//! while let Some(Ok(message)) = frames.next().await {
//!     println!("{:?}", message.method);
//! }
//! # }
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::BridgeError;
use crate::mcp::types::JsonRpcMessage;

/// Maximum accepted length of a single inbound line: 16 MiB.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Newline-delimited JSON-RPC codec.
///
/// One instance per connection or pipe; the codec carries the partial-line
/// state of its stream.
#[derive(Debug)]
pub struct JsonRpcCodec(LinesCodec);

impl JsonRpcCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line length limit.
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }

    /// Turn raw line results into the next well-formed message.
    ///
    /// `next_line` is either `LinesCodec::decode` or `decode_eof`; it is
    /// called repeatedly until it yields a parsable line or runs dry.
    fn next_message<F>(
        &mut self,
        src: &mut BytesMut,
        mut next_line: F,
    ) -> Result<Option<JsonRpcMessage>, BridgeError>
    where
        F: FnMut(&mut LinesCodec, &mut BytesMut) -> Result<Option<String>, LinesCodecError>,
    {
        loop {
            let line = match next_line(&mut self.0, src) {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    tracing::warn!("discarding inbound line longer than the codec limit");
                    continue;
                }
                Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::warn!("discarding inbound line that is not valid UTF-8: {e}");
                    continue;
                }
                Err(LinesCodecError::Io(e)) => return Err(BridgeError::Io(e)),
            };

            if let Some(message) = parse_line(&line) {
                return Ok(Some(message));
            }
        }
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonRpcCodec {
    type Item = JsonRpcMessage;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_message(src, |codec, buf| codec.decode(buf))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_message(src, |codec, buf| codec.decode_eof(buf))
    }
}

// Only owned frames are encodable, so `FramedWrite<_, JsonRpcCodec>` is a
// `Sink` for exactly one item type.
impl Encoder<JsonRpcMessage> for JsonRpcCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: JsonRpcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&item)?;
        self.0.encode(line, dst).map_err(|e| match e {
            LinesCodecError::Io(io) => BridgeError::Io(io),
            LinesCodecError::MaxLineLengthExceeded => {
                BridgeError::Protocol("outbound frame exceeds line limit".to_string())
            }
        })
    }
}

/// Encode one message as a newline-terminated JSON line.
///
/// `serde_json` escapes control characters inside strings, so the encoded
/// body never contains a raw newline.
///
/// # Errors
///
/// Returns [`BridgeError::Serialization`] if the message cannot be
/// serialized.
///
/// # Examples
///
/// ```
/// use mcp_bridge::mcp::codec::encode;
/// use mcp_bridge::mcp::types::JsonRpcMessage;
///
/// let bytes = encode(&JsonRpcMessage::notification("ping", serde_json::json!({}))).unwrap();
/// assert!(bytes.ends_with(b"\n"));
/// assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
/// ```
pub fn encode(message: &JsonRpcMessage) -> Result<Vec<u8>, BridgeError> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse one line; `None` for blank or malformed lines.
fn parse_line(line: &str) -> Option<JsonRpcMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<JsonRpcMessage>(trimmed) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!("discarding malformed JSON-RPC line: {e}");
            None
        }
    }
}
