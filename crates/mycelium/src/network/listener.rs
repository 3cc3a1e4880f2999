//! Listening sockets a server accepts connections from.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use tracing::warn;

use mycelium_config::SocketEndpoint;

use super::{ListenerError, NETWORK_TARGET};
use crate::patch::ConnectionStream;

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::{Path, PathBuf};

/// A bound, listening socket.
///
/// Either bind one from a [`SocketEndpoint`] or adopt a listener created
/// elsewhere through the `From` conversions. Unix socket files are removed on
/// shutdown only when this type created them.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
    #[cfg(unix)]
    owned_path: Option<PathBuf>,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    /// Binds a fresh listener at `endpoint`.
    ///
    /// Stale Unix socket files left by a dead process are replaced; a socket
    /// that still accepts connections is reported as in use.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] describing the resolution or bind failure.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let listener = bind_tcp(host, *port)?;
                let endpoint = match listener.local_addr() {
                    Ok(addr) => endpoint.with_port(addr.port()),
                    Err(_) => endpoint.clone(),
                };
                Ok(Self {
                    endpoint,
                    listener: ListenerKind::Tcp(listener),
                    #[cfg(unix)]
                    owned_path: None,
                })
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    let listener = bind_unix(path.as_std_path())?;
                    Ok(Self {
                        endpoint: endpoint.clone(),
                        listener: ListenerKind::Unix(listener),
                        owned_path: Some(path.as_std_path().to_path_buf()),
                    })
                }

                #[cfg(not(unix))]
                {
                    let _ = path;
                    Err(ListenerError::UnsupportedUnix {
                        endpoint: endpoint.to_string(),
                    })
                }
            }
        }
    }

    /// Endpoint the listener accepts on. TCP endpoints report the bound port.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Local TCP address, when listening on TCP.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    pub(crate) fn set_nonblocking(&self) -> Result<(), ListenerError> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        }
        .map_err(|source| ListenerError::NonBlocking { source })
    }

    /// Accepts one pending connection, returning `None` when none is waiting.
    pub(crate) fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        match &self.listener {
            ListenerKind::Tcp(tcp) => match tcp.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Ok(Some(ConnectionStream::Tcp(stream)))
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(error) => Err(error),
            },
            #[cfg(unix)]
            ListenerKind::Unix(unix) => match unix.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Ok(Some(ConnectionStream::Unix(stream)))
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(error) => Err(error),
            },
        }
    }

    pub(crate) fn cleanup(&self) {
        #[cfg(unix)]
        if let Some(path) = &self.owned_path
            && let Err(error) = fs::remove_file(path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: NETWORK_TARGET,
                error = %error,
                path = %path.display(),
                "failed to remove unix socket file"
            );
        }
    }
}

impl From<TcpListener> for SocketListener {
    fn from(listener: TcpListener) -> Self {
        let endpoint = match listener.local_addr() {
            Ok(addr) => SocketEndpoint::tcp(addr.ip().to_string(), addr.port()),
            Err(error) => {
                warn!(target: NETWORK_TARGET, %error, "adopted listener has no local address");
                SocketEndpoint::tcp("unknown", 0)
            }
        };
        Self {
            endpoint,
            listener: ListenerKind::Tcp(listener),
            #[cfg(unix)]
            owned_path: None,
        }
    }
}

#[cfg(unix)]
impl From<UnixListener> for SocketListener {
    fn from(listener: UnixListener) -> Self {
        let path = listener
            .local_addr()
            .ok()
            .and_then(|addr| addr.as_pathname().map(|path| path.display().to_string()))
            .unwrap_or_default();
        Self {
            endpoint: SocketEndpoint::unix(path),
            listener: ListenerKind::Unix(listener),
            owned_path: None,
        }
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_string(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        let metadata =
            fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
                path: path.display().to_string(),
                source,
            })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::UnixNotSocket {
                path: path.display().to_string(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenerError::UnixInUse {
                    path: path.display().to_string(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound =>
            {
                fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            Err(error) => {
                return Err(ListenerError::UnixConnect {
                    path: path.display().to_string(),
                    source: error,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_bind_reports_the_assigned_port() {
        let listener =
            SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp");
        let addr = listener.local_addr().expect("local address");
        assert_ne!(addr.port(), 0);
        assert_eq!(
            listener.endpoint(),
            &SocketEndpoint::tcp("127.0.0.1", addr.port())
        );
    }

    #[test]
    fn adopted_tcp_listener_keeps_its_address() {
        let raw = TcpListener::bind(("127.0.0.1", 0)).expect("bind raw listener");
        let addr = raw.local_addr().expect("raw address");
        let listener = SocketListener::from(raw);
        assert_eq!(listener.local_addr(), Some(addr));
    }

    #[test]
    fn accept_without_pending_clients_returns_none() {
        let listener =
            SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp");
        listener.set_nonblocking().expect("non-blocking");
        assert!(listener.accept().expect("accept").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn unix_bind_replaces_stale_socket_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("mycelium.sock");
        {
            let _stale = UnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists(), "stale socket should remain");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
        let listener = SocketListener::bind(&endpoint).expect("bind over stale socket");
        listener.cleanup();
        assert!(!path.exists(), "owned socket file should be removed");
    }

    #[cfg(unix)]
    #[test]
    fn unix_bind_rejects_live_sockets() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("mycelium.sock");
        let _existing = UnixListener::bind(&path).expect("bind existing listener");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
        let error = SocketListener::bind(&endpoint).expect_err("socket is in use");
        assert!(matches!(error, ListenerError::UnixInUse { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn adopted_unix_listener_leaves_its_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("adopted.sock");
        let listener = SocketListener::from(UnixListener::bind(&path).expect("bind"));
        listener.cleanup();
        assert!(path.exists(), "adopted socket files belong to their creator");
    }
}
