//! Server behaviour over real sockets.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use mycelium_config::SocketEndpoint;

use super::*;
use crate::interactions::Interactions;
use crate::message::{InternalRequest, Request};
use crate::patch::{Patch, PatchError};

const WAIT: Duration = Duration::from_secs(2);

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Registry that forwards every `TestRequest` onto a channel.
fn observed() -> (Arc<Interactions>, Receiver<Request>) {
    let (sender, receiver) = mpsc::channel();
    let interactions = Arc::new(Interactions::new());
    let sender = std::sync::Mutex::new(sender);
    interactions.register_fn("TestRequest", move |event| {
        sender
            .lock()
            .map_err(|_| "observer lock poisoned")?
            .send(event.request().clone())
            .map_err(|_| "observer hung up")?;
        Ok(())
    });
    (interactions, receiver)
}

fn test_request() -> InternalRequest {
    InternalRequest::new()
        .with_target("Endpoint")
        .with_request("TestRequest")
}

struct TcpServer {
    handle: ServerHandle,
    endpoint: SocketEndpoint,
    received: Receiver<Request>,
}

#[fixture]
fn tcp_server() -> TcpServer {
    let (interactions, received) = observed();
    let handle = NetworkServer::new()
        .bind(&SocketEndpoint::tcp("127.0.0.1", 0))
        .expect("bind server")
        .with_interactions(interactions)
        .start()
        .expect("start server");
    let endpoint = handle.endpoint().cloned().expect("listening endpoint");
    TcpServer {
        handle,
        endpoint,
        received,
    }
}

#[test]
fn a_server_needs_something_to_serve() {
    let error = NetworkServer::new().start().expect_err("nothing to serve");
    assert!(matches!(error, ServerError::NothingToServe));
}

#[rstest]
fn accepted_connections_dispatch_to_embedded_interactions(tcp_server: TcpServer) {
    let client = Patch::connect(&tcp_server.endpoint).expect("connect");
    client.send(test_request()).expect("send");

    let request = tcp_server.received.recv_timeout(WAIT).expect("dispatched");
    assert_eq!(request.header().get("target"), Some("Endpoint"));
    assert_eq!(tcp_server.handle.connection_names(), vec!["peer-1".to_string()]);
}

#[rstest]
fn unroutable_requests_leave_the_loop_running(tcp_server: TcpServer) {
    let client = Patch::connect(&tcp_server.endpoint).expect("connect");
    client
        .send(test_request().with_request("Unknown"))
        .expect("send unroutable");
    client.send(test_request()).expect("send routable");

    let request = tcp_server.received.recv_timeout(WAIT).expect("dispatched");
    assert_eq!(request.request_type(), Some("TestRequest"));
}

#[rstest]
fn a_failing_connection_does_not_affect_its_siblings(tcp_server: TcpServer) {
    let healthy = Patch::connect(&tcp_server.endpoint).expect("connect healthy");
    let mut broken = match &tcp_server.endpoint {
        SocketEndpoint::Tcp { host, port } => {
            TcpStream::connect((host.as_str(), *port)).expect("connect raw")
        }
        SocketEndpoint::Unix { .. } => unreachable!("fixture binds TCP"),
    };
    assert!(wait_until(|| tcp_server.handle.connection_names().len() == 2));

    broken.write_all(b"{not json}\n").expect("write garbage");
    assert!(wait_until(|| tcp_server.handle.connection_names().len() == 1));

    healthy.send(test_request()).expect("send");
    tcp_server
        .received
        .recv_timeout(WAIT)
        .expect("sibling still dispatched");
}

#[rstest]
fn closing_the_server_closes_its_connections(tcp_server: TcpServer) {
    let client = Patch::connect(&tcp_server.endpoint).expect("connect");
    assert!(wait_until(|| tcp_server.handle.connection_names().len() == 1));

    let TcpServer { handle, .. } = tcp_server;
    handle.close();
    assert!(matches!(client.read(), Err(PatchError::ConnectionClosed)));
    handle.join().expect("join server");
}

#[cfg(unix)]
mod attached {
    use super::*;

    #[test]
    fn attached_patches_are_serviced() {
        let (interactions, received) = observed();
        let (served, local) = Patch::stitched("Endpoint", "local").expect("stitch");
        let handle = NetworkServer::new()
            .attach(served)
            .with_interactions(interactions)
            .start()
            .expect("start");

        local
            .send(test_request().with_target("Elsewhere"))
            .expect("send");
        let request = received.recv_timeout(WAIT).expect("dispatched");
        assert_eq!(request.target(), Some("Elsewhere"));
        assert_eq!(handle.connection_names(), vec!["Endpoint".to_string()]);
    }

    #[test]
    fn requests_are_forwarded_by_target_and_replies_follow_the_crumb() {
        let (alpha, alpha_remote) = Patch::stitched("Alpha", "alpha-remote").expect("stitch");
        let (beta, beta_remote) = Patch::stitched("Beta", "beta-remote").expect("stitch");
        let handle = NetworkServer::new()
            .attach(alpha)
            .attach(beta)
            .start()
            .expect("start");

        alpha_remote
            .send(test_request().with_target("Beta").with_body(serde_json::json!(7)))
            .expect("send to beta");
        let forwarded = beta_remote.read().expect("beta receives");
        assert_eq!(forwarded.header().get(handle.crumb_key()), Some("Alpha"));
        assert_eq!(forwarded.body(), &serde_json::json!(7));

        beta_remote.send(forwarded).expect("echo back");
        let reply = alpha_remote.read().expect("alpha receives reply");
        assert_eq!(reply.target(), Some("Beta"));
        assert_eq!(reply.header().get(handle.crumb_key()), Some("Beta"));
    }

    #[test]
    fn registered_services_become_targets() {
        let (endpoint, endpoint_remote) =
            Patch::stitched("Endpoint", "endpoint-remote").expect("stitch");
        let handle = NetworkServer::new()
            .bind(&SocketEndpoint::tcp("127.0.0.1", 0))
            .expect("bind")
            .attach(endpoint)
            .start()
            .expect("start");
        let node = Patch::connect(handle.endpoint().expect("endpoint")).expect("connect");

        node.send(
            InternalRequest::new()
                .with_request(REGISTER_REQUEST)
                .with_header(SERVICE_HEADER, "Svc")
                .with_header(VERSION_HEADER, "1.0"),
        )
        .expect("register");
        assert!(wait_until(|| !handle.services().is_empty()));
        let connection = handle.services()[0].1.clone();
        assert_eq!(handle.services(), vec![("Svc".to_string(), connection)]);

        endpoint_remote
            .send(test_request().with_target("Svc"))
            .expect("send to service");
        let routed = node.read().expect("node receives");
        assert_eq!(routed.header().get(handle.crumb_key()), Some("Endpoint"));

        node.close();
        assert!(wait_until(|| handle.services().is_empty()));
    }

    fn closes_within_deadline(remote: Patch) -> Receiver<Result<Request, PatchError>> {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let _ = sender.send(remote.read());
        });
        receiver
    }

    #[test]
    fn closing_reaches_every_connection_sharing_a_name() {
        let (first, first_remote) = Patch::stitched("Endpoint", "first-remote").expect("stitch");
        let (second, second_remote) =
            Patch::stitched("Endpoint", "second-remote").expect("stitch");
        let handle = NetworkServer::new()
            .attach(first)
            .attach(second)
            .start()
            .expect("start");
        assert_eq!(
            handle.connection_names(),
            vec!["Endpoint".to_string(), "Endpoint".to_string()]
        );

        let first_read = closes_within_deadline(first_remote);
        let second_read = closes_within_deadline(second_remote);
        handle.close();

        for read in [first_read, second_read] {
            let result = read.recv_timeout(WAIT).expect("remote end sees the close");
            assert!(matches!(result, Err(PatchError::ConnectionClosed)));
        }
        handle.join().expect("join server");
    }

    #[test]
    fn names_with_nul_bytes_still_start() {
        let (interactions, received) = observed();
        let (served, local) = Patch::stitched("End\0point", "local").expect("stitch");
        let handle = NetworkServer::new()
            .attach(served)
            .with_interactions(interactions)
            .start()
            .expect("start with a NUL in the connection name");

        local.send(test_request()).expect("send");
        received.recv_timeout(WAIT).expect("dispatched");
        assert_eq!(handle.connection_names(), vec!["End\0point".to_string()]);
        handle.close();
        handle.join().expect("join server");
    }

    #[test]
    fn unclaimed_requests_travel_upstream_and_replies_return() {
        let (interactions, received) = observed();
        let (endpoint, endpoint_remote) =
            Patch::stitched("Endpoint", "endpoint-remote").expect("stitch");
        let (upstream, upstream_remote) =
            Patch::stitched("Upstream", "upstream-remote").expect("stitch");
        let handle = NetworkServer::new()
            .attach(endpoint)
            .with_upstream(upstream)
            .with_interactions(interactions)
            .start()
            .expect("start");
        assert_eq!(handle.upstream().as_deref(), Some("Upstream"));

        endpoint_remote
            .send(
                InternalRequest::new()
                    .with_target("Far")
                    .with_request("FarRequest"),
            )
            .expect("send unclaimed request");
        let escalated = upstream_remote.read().expect("upstream receives");
        assert_eq!(escalated.target(), Some("Far"));
        assert_eq!(escalated.header().get(handle.crumb_key()), Some("Endpoint"));

        upstream_remote.send(escalated).expect("reply from upstream");
        let reply = endpoint_remote.read().expect("reply follows the crumb");
        assert_eq!(reply.request_type(), Some("FarRequest"));

        endpoint_remote.send(test_request()).expect("send handled request");
        received.recv_timeout(WAIT).expect("handled locally, not upstream");

        upstream_remote.close();
        assert!(wait_until(|| handle.upstream().is_none()));
    }

    #[test]
    fn unix_listeners_remove_their_socket_on_shutdown() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("server.sock");
        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
        let (interactions, received) = observed();
        let handle = NetworkServer::new()
            .bind(&endpoint)
            .expect("bind unix")
            .with_interactions(interactions)
            .start()
            .expect("start");

        let client = Patch::connect(&endpoint).expect("connect");
        client.send(test_request()).expect("send");
        received.recv_timeout(WAIT).expect("dispatched");

        handle.close();
        handle.join().expect("join");
        assert!(!path.exists(), "socket file should be removed");
    }
}
