//! Line-delimited framing.
//!
//! Each frame is one JSON document followed by `\n`. JSON string escaping
//! guarantees the document itself never contains a raw newline.

use std::io::{self, BufRead, BufReader, Read};

use serde::Serialize;

use super::PatchError;

/// Reads newline-terminated frames, keeping bytes that follow a frame for the
/// next call.
#[derive(Debug)]
pub(crate) struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Returns the next frame without its delimiter.
    ///
    /// `Ok(None)` signals end-of-stream on a frame boundary. End-of-stream in
    /// the middle of a frame is reported as malformed.
    pub(crate) fn next_frame(
        &mut self,
        max_frame_bytes: usize,
    ) -> Result<Option<Vec<u8>>, PatchError> {
        let mut frame = Vec::new();
        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(PatchError::connection(error)),
            };

            if available.is_empty() {
                return if frame.is_empty() {
                    Ok(None)
                } else {
                    Err(PatchError::malformed("stream ended inside a frame"))
                };
            }

            if let Some(position) = available.iter().position(|byte| *byte == b'\n') {
                frame.extend(available.iter().take(position));
                self.inner.consume(position + 1);
                enforce_limit(frame.len() + 1, max_frame_bytes)?;
                return Ok(Some(frame));
            }

            let consumed = available.len();
            frame.extend_from_slice(available);
            self.inner.consume(consumed);
            enforce_limit(frame.len(), max_frame_bytes)?;
        }
    }
}

/// Encodes a value as a single frame including its delimiter.
pub(crate) fn encode_frame<T: Serialize>(
    value: &T,
    max_frame_bytes: usize,
) -> Result<Vec<u8>, PatchError> {
    let mut frame = serde_json::to_vec(value).map_err(PatchError::Serialize)?;
    frame.push(b'\n');
    enforce_limit(frame.len(), max_frame_bytes)?;
    Ok(frame)
}

/// Trims ASCII whitespace from both ends of a frame.
pub(crate) fn trim_frame(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(start, |position| position + 1);
    bytes.get(start..end).unwrap_or_default()
}

fn enforce_limit(size: usize, max_frame_bytes: usize) -> Result<(), PatchError> {
    if size > max_frame_bytes {
        return Err(PatchError::frame_too_large(size, max_frame_bytes));
    }
    Ok(())
}
