//! The [`Patch`] connection type.

use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use tracing::{debug, warn};

use mycelium_config::{DEFAULT_MAX_FRAME_BYTES, SocketEndpoint};

use super::frame::{FrameReader, encode_frame, trim_frame};
use super::{ConnectionStream, PATCH_TARGET, PatchError};
use crate::message::Request;

/// A framed, bidirectional request channel over one socket.
///
/// `read` and `send` block the calling thread. They may run concurrently with
/// each other, but only one thread should read at a time. `close` may be called
/// from any thread, at any time, any number of times: the first call shuts the
/// socket down and wakes a blocked reader, later calls do nothing.
///
/// Configure the patch with [`with_name`](Self::with_name) and
/// [`with_frame_limit`](Self::with_frame_limit) before sharing it.
#[derive(Debug)]
pub struct Patch {
    name: String,
    max_frame_bytes: usize,
    reader: Mutex<FrameReader<ConnectionStream>>,
    writer: Mutex<ConnectionStream>,
    control: ConnectionStream,
    closed: AtomicBool,
}

impl Patch {
    /// Wraps an already connected stream.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::Connection`] if the socket handle cannot be
    /// duplicated for the writer and control halves.
    pub fn new(stream: impl Into<ConnectionStream>) -> Result<Self, PatchError> {
        let stream = stream.into();
        let writer = stream.try_clone().map_err(PatchError::connection)?;
        let control = stream.try_clone().map_err(PatchError::connection)?;
        Ok(Self {
            name: stream.peer_label(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            reader: Mutex::new(FrameReader::new(stream)),
            writer: Mutex::new(writer),
            control,
            closed: AtomicBool::new(false),
        })
    }

    /// Dials `endpoint` and wraps the resulting stream.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::Connect`] when the endpoint refuses or cannot be
    /// reached.
    pub fn connect(endpoint: &SocketEndpoint) -> Result<Self, PatchError> {
        let stream = match endpoint {
            SocketEndpoint::Tcp { host, port } => TcpStream::connect((host.as_str(), *port))
                .map(ConnectionStream::Tcp)
                .map_err(|source| PatchError::connect(endpoint, source))?,
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => UnixStream::connect(path.as_std_path())
                .map(ConnectionStream::Unix)
                .map_err(|source| PatchError::connect(endpoint, source))?,
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(PatchError::connect(
                    endpoint,
                    std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "unix sockets are unsupported on this platform",
                    ),
                ));
            }
        };
        debug!(target: PATCH_TARGET, %endpoint, "connected");
        Self::new(stream)
    }

    /// Creates two patches joined to each other in-process.
    ///
    /// Whatever one end sends, the other reads. Servers can be handed one end
    /// with `attach` while local code drives the other.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::Connection`] if the socket pair cannot be created.
    #[cfg(unix)]
    pub fn stitched(
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Result<(Self, Self), PatchError> {
        let (left, right) = UnixStream::pair().map_err(PatchError::connection)?;
        Ok((
            Self::new(left)?.with_name(first),
            Self::new(right)?.with_name(second),
        ))
    }

    /// Sets the name used for addressing and diagnostics.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the frame ceiling applied in both directions.
    #[must_use]
    pub fn with_frame_limit(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Identifying name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reports whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Blocks until one complete request arrives.
    ///
    /// Blank lines between frames are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::ConnectionClosed`] when the peer hangs up or the
    /// patch is closed, even if that happens while this call is blocked. Other
    /// variants report socket failures and undecodable frames.
    ///
    /// A socket failure or an oversized frame leaves the stream somewhere
    /// inside a frame, so the patch closes itself before returning the error.
    /// A frame that is delimited but not valid JSON leaves the patch usable.
    pub fn read(&self) -> Result<Request, PatchError> {
        if self.is_closed() {
            return Err(PatchError::ConnectionClosed);
        }
        let mut reader = lock(&self.reader);
        loop {
            let frame = match reader.next_frame(self.max_frame_bytes) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(PatchError::ConnectionClosed),
                Err(_) if self.is_closed() => return Err(PatchError::ConnectionClosed),
                Err(error) => {
                    self.close();
                    return Err(error);
                }
            };
            let trimmed = trim_frame(&frame);
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_slice(trimmed).map_err(PatchError::from_json_error);
        }
    }

    /// Writes one request as a single frame and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::ConnectionClosed`] after `close`, and
    /// [`PatchError::Connection`] when the socket can no longer be written.
    pub fn send(&self, request: impl Into<Request>) -> Result<(), PatchError> {
        let request = request.into();
        if self.is_closed() {
            return Err(PatchError::ConnectionClosed);
        }
        let frame = encode_frame(&request, self.max_frame_bytes)?;
        let mut writer = lock(&self.writer);
        writer
            .write_all(&frame)
            .and_then(|()| writer.flush())
            .map_err(|error| {
                if self.is_closed() {
                    PatchError::ConnectionClosed
                } else {
                    PatchError::connection(error)
                }
            })
    }

    /// Shuts the socket down. Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self.control.shutdown() {
            warn!(
                target: PATCH_TARGET,
                patch = %self.name,
                %error,
                "failed to shut down socket"
            );
            return;
        }
        debug!(target: PATCH_TARGET, patch = %self.name, "closed");
    }
}

impl Drop for Patch {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
