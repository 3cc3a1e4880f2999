//! Server construction and the handle returned by `start`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use tracing::info;

use mycelium_config::{Config, DEFAULT_MAX_FRAME_BYTES, SocketEndpoint};

use super::state::ServerState;
use super::{NETWORK_TARGET, ServerError, SocketListener};
use crate::interactions::Interactions;
use crate::patch::Patch;

static NEXT_SERVER: AtomicUsize = AtomicUsize::new(0);

/// Staged server configuration. Nothing runs until [`start`](Self::start).
///
/// ```no_run
/// use mycelium::network::NetworkServer;
/// use mycelium_config::SocketEndpoint;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = NetworkServer::new()
///     .bind(&SocketEndpoint::tcp("127.0.0.1", 0))?
///     .embed_interaction();
/// if let Some(interactions) = server.interactions() {
///     interactions.register_fn("Ping", |event| Ok(event.respond(event.request().clone())?));
/// }
/// let handle = server.start()?;
/// handle.close();
/// handle.join()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct NetworkServer {
    listener: Option<SocketListener>,
    attached: Vec<Patch>,
    upstream: Option<Patch>,
    interactions: Option<Arc<Interactions>>,
    max_frame_bytes: usize,
}

impl Default for NetworkServer {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkServer {
    /// A server with no listener, no attached patches and no interactions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listener: None,
            attached: Vec::new(),
            upstream: None,
            interactions: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Binds the configured server socket and applies the frame limit.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Prepare`] when a Unix socket directory cannot be
    /// created and [`ServerError::Listener`] when binding fails.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        config.server_socket().prepare_filesystem()?;
        Self::new()
            .with_frame_limit(config.max_frame_bytes())
            .bind(config.server_socket())
    }

    /// Binds a fresh listener at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listener`] when binding fails.
    pub fn bind(self, endpoint: &SocketEndpoint) -> Result<Self, ServerError> {
        Ok(self.with_server_socket(SocketListener::bind(endpoint)?))
    }

    /// Adopts an already bound, listening socket as the accept source.
    #[must_use]
    pub fn with_server_socket(mut self, listener: impl Into<SocketListener>) -> Self {
        self.listener = Some(listener.into());
        self
    }

    /// Services `patch` alongside accepted connections. Its name becomes a
    /// routable target.
    #[must_use]
    pub fn attach(mut self, patch: Patch) -> Self {
        self.attached.push(patch);
        self
    }

    /// Services `patch` as the way out of this server, typically its own
    /// uplink to a server further up.
    ///
    /// Requests that no crumb, managed connection or embedded handler claims
    /// are forwarded to it with a return crumb, so replies find their way
    /// back. It is also routable by name like an attached patch.
    #[must_use]
    pub fn with_upstream(mut self, patch: Patch) -> Self {
        self.upstream = Some(patch);
        self
    }

    /// Gives the server its own handler registry, used for requests no
    /// managed connection claims.
    #[must_use]
    pub fn embed_interaction(mut self) -> Self {
        self.interactions
            .get_or_insert_with(|| Arc::new(Interactions::new()));
        self
    }

    /// Embeds an existing registry, shared with the caller.
    #[must_use]
    pub fn with_interactions(mut self, interactions: Arc<Interactions>) -> Self {
        self.interactions = Some(interactions);
        self
    }

    /// Frame ceiling applied to accepted connections.
    #[must_use]
    pub fn with_frame_limit(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// The embedded registry, if any.
    #[must_use]
    pub fn interactions(&self) -> Option<&Arc<Interactions>> {
        self.interactions.as_ref()
    }

    /// Starts servicing attached patches and, with a listener, accepting new
    /// connections. Returns once every thread is running.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NothingToServe`] without a listener, attached
    /// patch or upstream, and a listener or spawn failure otherwise. Anything already
    /// started is closed again before the error is returned.
    pub fn start(self) -> Result<ServerHandle, ServerError> {
        if self.listener.is_none() && self.attached.is_empty() && self.upstream.is_none() {
            return Err(ServerError::NothingToServe);
        }

        let id = format!(
            "{}-{}",
            std::process::id(),
            NEXT_SERVER.fetch_add(1, Ordering::SeqCst)
        );
        let state = Arc::new(ServerState::new(
            id,
            self.max_frame_bytes,
            self.interactions,
        ));
        let endpoint = self.listener.as_ref().map(|l| l.endpoint().clone());
        let local_addr = self.listener.as_ref().and_then(SocketListener::local_addr);

        for patch in self.attached {
            if let Err(error) = state.manage(Arc::new(patch)) {
                state.close();
                return Err(error);
            }
        }
        if let Some(upstream) = self.upstream
            && let Err(error) = state.manage_upstream(Arc::new(upstream))
        {
            state.close();
            return Err(error);
        }

        let acceptor = match self.listener {
            Some(listener) => Some(spawn_acceptor(&state, listener)?),
            None => None,
        };

        info!(
            target: NETWORK_TARGET,
            server = state.id(),
            endpoint = endpoint.as_ref().map(ToString::to_string).unwrap_or_default(),
            embedded = state.interactions().is_some(),
            "server started"
        );
        Ok(ServerHandle {
            state,
            acceptor,
            endpoint,
            local_addr,
        })
    }
}

fn spawn_acceptor(
    state: &Arc<ServerState>,
    listener: SocketListener,
) -> Result<JoinHandle<()>, ServerError> {
    if let Err(error) = listener.set_nonblocking() {
        listener.cleanup();
        state.close();
        return Err(error.into());
    }
    let accepting = Arc::clone(state);
    thread::Builder::new()
        .name(format!("mycelium-accept-{}", state.id()))
        .spawn(move || accepting.accept_loop(&listener))
        .map_err(|source| {
            state.close();
            ServerError::Spawn { source }
        })
}

/// A running server. Dropping the handle closes the server without waiting.
#[derive(Debug)]
pub struct ServerHandle {
    state: Arc<ServerState>,
    acceptor: Option<JoinHandle<()>>,
    endpoint: Option<SocketEndpoint>,
    local_addr: Option<SocketAddr>,
}

impl ServerHandle {
    /// Identifier unique to this server within the process.
    #[must_use]
    pub fn id(&self) -> &str {
        self.state.id()
    }

    /// Header key this server writes onto the requests it forwards.
    #[must_use]
    pub fn crumb_key(&self) -> &str {
        self.state.crumb_key()
    }

    /// Listening endpoint, with the bound port for TCP.
    #[must_use]
    pub fn endpoint(&self) -> Option<&SocketEndpoint> {
        self.endpoint.as_ref()
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    #[must_use]
    pub fn interactions(&self) -> Option<&Arc<Interactions>> {
        self.state.interactions()
    }

    /// Names of the connections currently managed, sorted.
    #[must_use]
    pub fn connection_names(&self) -> Vec<String> {
        self.state.connection_names()
    }

    /// Name of the upstream connection while it is managed.
    #[must_use]
    pub fn upstream(&self) -> Option<String> {
        self.state.upstream_name()
    }

    /// Registered `(service, connection)` pairs, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<(String, String)> {
        self.state.services()
    }

    /// Services another patch on the running server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Spawn`] when its thread cannot be started.
    pub fn attach(&self, patch: Patch) -> Result<(), ServerError> {
        self.state.manage(Arc::new(patch))
    }

    /// Stops accepting and closes every managed connection.
    ///
    /// Handlers already running finish; no further reads are issued.
    pub fn close(&self) {
        self.state.close();
    }

    /// Waits for the accept loop and every connection loop to finish.
    ///
    /// Call [`close`](Self::close) first unless the connections are expected
    /// to end on their own.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ThreadPanic`] naming the first thread that
    /// panicked.
    pub fn join(mut self) -> Result<(), ServerError> {
        let mut outcome = Ok(());
        if let Some(acceptor) = self.acceptor.take()
            && acceptor.join().is_err()
        {
            outcome = Err(ServerError::ThreadPanic {
                thread: "accept".to_string(),
            });
        }
        loop {
            let workers = self.state.take_workers();
            if workers.is_empty() {
                break;
            }
            for worker in workers {
                let thread = worker.thread().name().unwrap_or("connection").to_string();
                if worker.join().is_err() && outcome.is_ok() {
                    outcome = Err(ServerError::ThreadPanic { thread });
                }
            }
        }
        outcome
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.state.close();
    }
}
