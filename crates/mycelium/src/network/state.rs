//! Shared server state and the threads that drive it.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::router::{self, ConnectionTable, Route};
use super::{NETWORK_TARGET, ServerError, SocketListener};
use crate::interactions::{Interactions, RequestEvent};
use crate::message::Request;
use crate::patch::{ConnectionStream, Patch};
use crate::threads::thread_name;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

#[derive(Debug)]
pub(crate) struct ServerState {
    id: String,
    crumb_key: String,
    max_frame_bytes: usize,
    interactions: Option<Arc<Interactions>>,
    connections: Mutex<ConnectionTable>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_peer: AtomicUsize,
    shutdown: AtomicBool,
}

impl ServerState {
    pub(crate) fn new(
        id: String,
        max_frame_bytes: usize,
        interactions: Option<Arc<Interactions>>,
    ) -> Self {
        Self {
            crumb_key: format!("{}{id}", super::CRUMB_PREFIX),
            id,
            max_frame_bytes,
            interactions,
            connections: Mutex::new(ConnectionTable::default()),
            workers: Mutex::new(Vec::new()),
            next_peer: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn crumb_key(&self) -> &str {
        &self.crumb_key
    }

    pub(crate) fn interactions(&self) -> Option<&Arc<Interactions>> {
        self.interactions.as_ref()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_names(&self) -> Vec<String> {
        self.table().names()
    }

    pub(crate) fn upstream_name(&self) -> Option<String> {
        self.table()
            .upstream()
            .map(|upstream| upstream.name().to_string())
    }

    pub(crate) fn services(&self) -> Vec<(String, String)> {
        self.table().services()
    }

    /// Adds `patch` to the routing table and starts its serve loop.
    ///
    /// A patch handed over after shutdown began is closed immediately.
    pub(crate) fn manage(self: &Arc<Self>, patch: Arc<Patch>) -> Result<(), ServerError> {
        let shadowed = self.table().insert(Arc::clone(&patch));
        if shadowed.is_some() {
            warn!(
                target: NETWORK_TARGET,
                connection = patch.name(),
                "connection name already in use; the newest connection takes it"
            );
        }
        if self.is_shutdown() {
            self.retire(&patch);
            return Ok(());
        }

        let state = Arc::clone(self);
        let served = Arc::clone(&patch);
        let spawned = thread::Builder::new()
            .name(thread_name("mycelium-", patch.name()))
            .spawn(move || state.serve(&served));
        match spawned {
            Ok(worker) => {
                let mut workers = lock(&self.workers);
                workers.retain(|running| !running.is_finished());
                workers.push(worker);
                Ok(())
            }
            Err(source) => {
                self.retire(&patch);
                Err(ServerError::Spawn { source })
            }
        }
    }

    /// Manages `patch` as the connection that receives requests nothing else
    /// claims.
    pub(crate) fn manage_upstream(
        self: &Arc<Self>,
        patch: Arc<Patch>,
    ) -> Result<(), ServerError> {
        self.table().set_upstream(Arc::clone(&patch));
        self.manage(patch)
    }

    pub(crate) fn take_workers(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *lock(&self.workers))
    }

    /// Stops accepting and closes every managed connection. Idempotent.
    pub(crate) fn close(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let patches = self.table().drain();
        info!(
            target: NETWORK_TARGET,
            server = %self.id,
            connections = patches.len(),
            "server closing"
        );
        for patch in patches {
            patch.close();
        }
    }

    pub(crate) fn accept_loop(self: &Arc<Self>, listener: &SocketListener) {
        info!(
            target: NETWORK_TARGET,
            server = %self.id,
            endpoint = %listener.endpoint(),
            "socket listener active"
        );
        let mut last_error = None::<io::ErrorKind>;
        while !self.is_shutdown() {
            match listener.accept() {
                Ok(Some(stream)) => {
                    last_error = None;
                    self.adopt(stream);
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(
                            target: NETWORK_TARGET,
                            error = %error,
                            "socket accept error"
                        );
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        listener.cleanup();
    }

    fn adopt(self: &Arc<Self>, stream: ConnectionStream) {
        let peer = stream.peer_label();
        let name = format!("peer-{}", self.next_peer.fetch_add(1, Ordering::SeqCst) + 1);
        let patch = match Patch::new(stream) {
            Ok(patch) => patch.with_name(&name).with_frame_limit(self.max_frame_bytes),
            Err(error) => {
                warn!(target: NETWORK_TARGET, %peer, %error, "failed to wrap accepted connection");
                return;
            }
        };
        debug!(target: NETWORK_TARGET, %peer, connection = %name, "accepted connection");
        if let Err(error) = self.manage(Arc::new(patch)) {
            warn!(target: NETWORK_TARGET, connection = %name, %error, "failed to service connection");
        }
    }

    fn serve(&self, patch: &Arc<Patch>) {
        debug!(target: NETWORK_TARGET, connection = patch.name(), "servicing connection");
        while !self.is_shutdown() {
            match patch.read() {
                Ok(request) => self.route(patch, request),
                Err(error) if error.is_closed() => {
                    debug!(target: NETWORK_TARGET, connection = patch.name(), "connection closed");
                    break;
                }
                Err(error) => {
                    warn!(
                        target: NETWORK_TARGET,
                        connection = patch.name(),
                        %error,
                        "connection failed"
                    );
                    break;
                }
            }
        }
        self.retire(patch);
    }

    fn route(&self, origin: &Arc<Patch>, request: Request) {
        let route = router::route(
            &request,
            origin,
            &self.crumb_key,
            &self.table(),
            self.interactions.as_deref(),
        );
        match route {
            Route::Register { service } => {
                info!(
                    target: NETWORK_TARGET,
                    service = %service,
                    connection = origin.name(),
                    "service registered"
                );
                self.table()
                    .register_service(service, origin.name().to_string());
            }
            Route::Return(destination)
            | Route::Peer(destination)
            | Route::Upstream(destination) => {
                self.forward(origin, &destination, request);
            }
            Route::StaleReturn { connection } => {
                warn!(
                    target: NETWORK_TARGET,
                    origin = origin.name(),
                    return_connection = %connection,
                    "return connection is gone; reply dropped"
                );
            }
            Route::Local => {
                if let Some(interactions) = &self.interactions {
                    interactions.dispatch_and_report(&RequestEvent::new(request, Arc::clone(origin)));
                }
            }
            Route::Unroutable => {
                warn!(
                    target: NETWORK_TARGET,
                    origin = origin.name(),
                    target_endpoint = request.target().unwrap_or_default(),
                    request_type = request.request_type().unwrap_or_default(),
                    "unroutable request dropped"
                );
            }
        }
    }

    fn forward(&self, origin: &Patch, destination: &Patch, request: Request) {
        let request = request
            .into_builder()
            .with_header(&self.crumb_key, origin.name())
            .build();
        debug!(
            target: NETWORK_TARGET,
            origin = origin.name(),
            destination = destination.name(),
            "forwarding request"
        );
        if let Err(error) = destination.send(request) {
            warn!(
                target: NETWORK_TARGET,
                origin = origin.name(),
                destination = destination.name(),
                %error,
                "forward failed; request dropped"
            );
        }
    }

    fn retire(&self, patch: &Arc<Patch>) {
        patch.close();
        self.table().remove(patch);
    }

    fn table(&self) -> MutexGuard<'_, ConnectionTable> {
        lock(&self.connections)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
