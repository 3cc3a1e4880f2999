//! Shared world for the mesh behaviour scenarios.

use std::cell::RefCell;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mycelium_config::SocketEndpoint;

use crate::interactions::{Bindings, HandlerError, Interaction, RequestEvent};
use crate::message::{InternalRequest, Request};
use crate::network::{NetworkServer, ServerHandle};
use crate::patch::Patch;
use crate::spore::{
    HOOK_SERVICE_AVAILABLE, HOOK_UPLINK, Hooks, LifecycleState, Spore, SporeContext, SporeError,
    SporeHandle, SporeNode, SporeProfile,
};

pub(super) const WAIT: Duration = Duration::from_secs(2);

/// Handler prototype that reports what it was handed.
pub(super) struct Observer {
    seen: Arc<Mutex<Sender<Request>>>,
}

impl Observer {
    fn observe(&mut self, event: &RequestEvent) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .map_err(|_| "observer lock poisoned")?
            .send(event.request().clone())
            .map_err(|_| "observer hung up")?;
        Ok(())
    }
}

impl Interaction for Observer {
    fn spawn(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
        }
    }

    fn bind(bindings: &mut Bindings<Self>) {
        bindings.handles("TestRequest", Self::observe);
    }
}

pub(super) struct TestSpore {
    profile: SporeProfile,
    seen: Arc<Mutex<Sender<Request>>>,
    fail_uplink: bool,
    phases: Arc<Mutex<Vec<&'static str>>>,
}

impl TestSpore {
    fn post_uplink(&self, context: &SporeContext) -> Result<(), HandlerError> {
        self.record("uplink");
        if self.fail_uplink {
            return Err("uplink hook refused".into());
        }
        context.interactions().register_start_point(
            "TestRequest",
            Observer {
                seen: Arc::clone(&self.seen),
            },
        )?;
        context.uplink().send(
            InternalRequest::new()
                .with_target("Endpoint")
                .with_request("TestRequest"),
        )?;
        Ok(())
    }

    fn post_service_available(&self, _context: &SporeContext) -> Result<(), HandlerError> {
        self.record("service_available");
        Ok(())
    }

    fn record(&self, phase: &'static str) {
        if let Ok(mut phases) = self.phases.lock() {
            phases.push(phase);
        }
    }
}

impl Spore for TestSpore {
    fn profile(&self) -> &SporeProfile {
        &self.profile
    }

    fn hooks(hooks: &mut Hooks<Self>) {
        hooks
            .on(HOOK_UPLINK, Self::post_uplink)
            .on(HOOK_SERVICE_AVAILABLE, Self::post_service_available);
    }
}

/// Where the request a handler observed came from.
pub(super) enum Observed {
    Node,
    Server,
}

pub(super) struct MeshWorld {
    server: Option<ServerHandle>,
    endpoint: Option<SocketEndpoint>,
    echo: Option<JoinHandle<()>>,
    node: Option<SporeNode<TestSpore>>,
    node_handle: Option<SporeHandle>,
    error: Option<SporeError>,
    node_seen: Receiver<Request>,
    server_seen: Receiver<Request>,
    node_sender: Arc<Mutex<Sender<Request>>>,
    server_sender: Arc<Mutex<Sender<Request>>>,
    phases: Arc<Mutex<Vec<&'static str>>>,
}

pub(super) fn world() -> RefCell<MeshWorld> {
    let (node_sender, node_seen) = mpsc::channel();
    let (server_sender, server_seen) = mpsc::channel();
    RefCell::new(MeshWorld {
        server: None,
        endpoint: None,
        echo: None,
        node: None,
        node_handle: None,
        error: None,
        node_seen,
        server_seen,
        node_sender: Arc::new(Mutex::new(node_sender)),
        server_sender: Arc::new(Mutex::new(server_sender)),
        phases: Arc::new(Mutex::new(Vec::new())),
    })
}

impl MeshWorld {
    /// A TCP server whose embedded registry observes `TestRequest`.
    pub(super) fn start_embedded_server(&mut self) {
        let server = NetworkServer::new()
            .bind(&SocketEndpoint::tcp("127.0.0.1", 0))
            .expect("bind server")
            .embed_interaction();
        server
            .interactions()
            .expect("embedded registry")
            .register_start_point(
                "TestRequest",
                Observer {
                    seen: Arc::clone(&self.server_sender),
                },
            )
            .expect("register server observer");
        self.launch(server);
    }

    /// A TCP server with an attached `Endpoint` that echoes one request.
    pub(super) fn start_echo_server(&mut self) {
        let (attached, local) = Patch::stitched("Endpoint", "endpoint-local").expect("stitch");
        let server = NetworkServer::new()
            .bind(&SocketEndpoint::tcp("127.0.0.1", 0))
            .expect("bind server")
            .attach(attached)
            .embed_interaction();
        self.echo = Some(thread::spawn(move || {
            if let Ok(request) = local.read() {
                let _ = local.send(request);
            }
        }));
        self.launch(server);
    }

    fn launch(&mut self, server: NetworkServer) {
        let handle = server.start().expect("start server");
        self.endpoint = handle.endpoint().cloned();
        self.server = Some(handle);
    }

    pub(super) fn prepare_node(&mut self, fail_uplink: bool) {
        self.node = Some(SporeNode::new(TestSpore {
            profile: SporeProfile::new("TestSpore", "1.0"),
            seen: Arc::clone(&self.node_sender),
            fail_uplink,
            phases: Arc::clone(&self.phases),
        }));
    }

    pub(super) fn start_node(&mut self) {
        let endpoint = self.endpoint.clone().expect("server endpoint");
        let node = self.node.as_ref().expect("node prepared");
        match node.start(&endpoint) {
            Ok(handle) => self.node_handle = Some(handle),
            Err(error) => self.error = Some(error),
        }
    }

    pub(super) fn observed(&self, side: &Observed) -> Option<Request> {
        let receiver = match side {
            Observed::Node => &self.node_seen,
            Observed::Server => &self.server_seen,
        };
        receiver.recv_timeout(WAIT).ok()
    }

    pub(super) fn node_state(&self) -> Option<LifecycleState> {
        self.node.as_ref().map(SporeNode::state)
    }

    pub(super) fn phases(&self) -> Vec<&'static str> {
        self.phases
            .lock()
            .map(|phases| phases.clone())
            .unwrap_or_default()
    }

    pub(super) fn error(&self) -> Option<&SporeError> {
        self.error.as_ref()
    }
}

impl Drop for MeshWorld {
    fn drop(&mut self) {
        if let Some(handle) = self.node_handle.take() {
            handle.close();
            let _ = handle.join();
        }
        if let Some(server) = self.server.take() {
            server.close();
            let _ = server.join();
        }
        if let Some(echo) = self.echo.take() {
            let _ = echo.join();
        }
    }
}
