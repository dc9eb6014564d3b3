//! Newline-delimited event stream framing.

use bytes::Bytes;
use chainload_core::{ClientError, EventEnvelope, EventStream};
use futures::{Stream, StreamExt};
use std::io;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;
use tracing::trace;

/// Longest event line accepted before the stream is abandoned.
pub const MAX_EVENT_LINE: usize = 1 << 20;

/// Frame a chunked body into decoded event envelopes.
///
/// Blank lines are skipped. A final line without a trailing newline is still
/// decoded. The stream ends after the first framing error.
pub fn event_lines<S>(chunks: S, max_line: usize) -> EventStream
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
{
    FramedRead::new(
        StreamReader::new(chunks),
        LinesCodec::new_with_max_length(max_line),
    )
    .filter_map(|line| async move {
        match line {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                trace!(line = text, "Event line");
                Some(EventEnvelope::decode(text).map_err(|e| ClientError::Decode(e.to_string())))
            }
            Err(e) => Some(Err(framing_error(e))),
        }
    })
    .boxed()
}

fn framing_error(err: LinesCodecError) -> ClientError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            ClientError::Decode("event line exceeds maximum length".to_string())
        }
        LinesCodecError::Io(e) if e.kind() == io::ErrorKind::InvalidData => {
            ClientError::Decode(e.to_string())
        }
        LinesCodecError::Io(e) => ClientError::Unavailable(e.to_string()),
    }
}
