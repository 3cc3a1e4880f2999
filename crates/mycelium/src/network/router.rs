//! Target routing for requests read by a server.
//!
//! Requests are evaluated in a fixed order:
//!
//! 1. a return crumb left by this server sends a reply back the way the
//!    original request came;
//! 2. a `target` naming a managed connection (or a service registered over
//!    one) other than the sender forwards the request to that connection;
//! 3. a request type the embedded interactions handle is dispatched by the
//!    server itself;
//! 4. anything else goes to the upstream connection, when there is one and
//!    the request did not come from it;
//! 5. otherwise embedded interactions report it as unroutable, or it is
//!    dropped.

use std::collections::HashMap;
use std::sync::Arc;

use super::{REGISTER_REQUEST, SERVICE_HEADER};
use crate::interactions::Interactions;
use crate::message::Request;
use crate::patch::Patch;

/// Every managed connection, the name each is addressed by and service
/// aliases.
///
/// Names need not be unique. The most recently inserted patch owns a name;
/// when it leaves, the name passes back to the newest remaining patch that
/// carries it.
#[derive(Debug, Default)]
pub(crate) struct ConnectionTable {
    managed: Vec<Arc<Patch>>,
    by_name: HashMap<String, Arc<Patch>>,
    services: HashMap<String, String>,
    upstream: Option<Arc<Patch>>,
}

impl ConnectionTable {
    /// Adds `patch` and returns the patch it shadows by name, if any.
    pub(crate) fn insert(&mut self, patch: Arc<Patch>) -> Option<Arc<Patch>> {
        self.managed.push(Arc::clone(&patch));
        self.by_name.insert(patch.name().to_string(), patch)
    }

    /// Marks an already inserted patch as the fallback for requests nothing
    /// else claims.
    pub(crate) fn set_upstream(&mut self, patch: Arc<Patch>) {
        self.upstream = Some(patch);
    }

    pub(crate) fn upstream(&self) -> Option<&Arc<Patch>> {
        self.upstream.as_ref()
    }

    /// Removes `patch`. When it owned its name, its service aliases go too and
    /// the name falls back to an older patch of the same name.
    pub(crate) fn remove(&mut self, patch: &Arc<Patch>) {
        self.managed.retain(|managed| !Arc::ptr_eq(managed, patch));
        if self
            .upstream
            .as_ref()
            .is_some_and(|upstream| Arc::ptr_eq(upstream, patch))
        {
            self.upstream = None;
        }

        let name = patch.name();
        if !self
            .by_name
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, patch))
        {
            return;
        }
        self.by_name.remove(name);
        self.services.retain(|_, connection| connection != name);
        if let Some(older) = self
            .managed
            .iter()
            .rev()
            .find(|managed| managed.name() == name)
        {
            self.by_name.insert(name.to_string(), Arc::clone(older));
        }
    }

    pub(crate) fn register_service(&mut self, service: String, connection: String) {
        self.services.insert(service, connection);
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<Arc<Patch>> {
        self.by_name
            .get(name)
            .or_else(|| {
                self.services
                    .get(name)
                    .and_then(|connection| self.by_name.get(connection))
            })
            .cloned()
    }

    /// Names of the managed connections, sorted, one entry per connection.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .managed
            .iter()
            .map(|patch| patch.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn services(&self) -> Vec<(String, String)> {
        let mut services: Vec<(String, String)> = self
            .services
            .iter()
            .map(|(service, connection)| (service.clone(), connection.clone()))
            .collect();
        services.sort();
        services
    }

    /// Empties the table, handing back every managed patch.
    pub(crate) fn drain(&mut self) -> Vec<Arc<Patch>> {
        self.services.clear();
        self.by_name.clear();
        self.upstream = None;
        std::mem::take(&mut self.managed)
    }
}

/// Where a request read by the server should go.
#[derive(Debug)]
pub(crate) enum Route {
    /// The sender is announcing the service it provides.
    Register { service: String },
    /// A reply travelling back along a crumb.
    Return(Arc<Patch>),
    /// A reply whose return connection no longer exists.
    StaleReturn { connection: String },
    /// A request for another managed connection.
    Peer(Arc<Patch>),
    /// A request nothing here claims, passed to the upstream connection.
    Upstream(Arc<Patch>),
    /// A request for the server's own interactions.
    Local,
    /// Nothing can take the request.
    Unroutable,
}

pub(crate) fn route(
    request: &Request,
    origin: &Arc<Patch>,
    crumb_key: &str,
    table: &ConnectionTable,
    local: Option<&Interactions>,
) -> Route {
    if request.request_type() == Some(REGISTER_REQUEST)
        && let Some(service) = request.header().get(SERVICE_HEADER)
    {
        return Route::Register {
            service: service.to_string(),
        };
    }

    if let Some(connection) = request.header().get(crumb_key) {
        return match table.resolve(connection) {
            Some(patch) => Route::Return(patch),
            None => Route::StaleReturn {
                connection: connection.to_string(),
            },
        };
    }

    if let Some(patch) = request
        .target()
        .and_then(|target| table.resolve(target))
        .filter(|patch| !Arc::ptr_eq(patch, origin))
    {
        return Route::Peer(patch);
    }

    let handled_here = local.is_some_and(|interactions| {
        request
            .request_type()
            .is_some_and(|request_type| interactions.is_registered(request_type))
    });
    if handled_here {
        return Route::Local;
    }

    if let Some(upstream) = table
        .upstream()
        .filter(|upstream| !Arc::ptr_eq(upstream, origin))
    {
        return Route::Upstream(Arc::clone(upstream));
    }

    if local.is_some() {
        Route::Local
    } else {
        Route::Unroutable
    }
}
