use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{
    ConnectionConfig, ConnectionFactory, ConnectionOperator, DefaultConnectionOperator, Exchanging,
    HttpConnection, SocketConfig,
};
use crate::context::{ClientContext, UserToken};
use crate::host::HttpHost;
use crate::pool::{ConnPool, ConnPoolControl, PoolEntry, PoolStats, Poolable};
use crate::route::{HttpRoute, RouteInfo};

type Conn = Box<dyn HttpConnection>;

impl Poolable for Conn {
    fn is_open(&self) -> bool {
        HttpConnection::is_open(&**self)
    }

    fn is_stale(&mut self) -> bool {
        HttpConnection::is_stale(&mut **self)
    }

    fn shutdown(&mut self) {
        HttpConnection::shutdown(&mut **self)
    }
}

/// Hands out connections and establishes their routes.
pub trait ConnectionManager: Send + Sync {
    /// Ask for a connection for `route` bound to `state`.
    fn request_connection(&self, route: &HttpRoute, state: Option<&UserToken>)
        -> ConnectionRequest;

    /// Give `conn` back. Its connection is kept for reuse if it is still
    /// open and its route was completed; `keep_alive` bounds how long.
    fn release_connection(
        &self,
        conn: ManagedConnection,
        state: Option<UserToken>,
        keep_alive: Option<Duration>,
    );

    /// Open the transport to the first hop of `route`.
    fn connect<'a>(
        &'a self,
        conn: &'a mut ManagedConnection,
        route: &'a HttpRoute,
        connect_timeout: Option<Duration>,
        ctx: &'a ClientContext,
    ) -> Exchanging<'a, ()>;

    /// Layer the target's protocol over the (tunnelled) transport.
    fn upgrade<'a>(
        &'a self,
        conn: &'a mut ManagedConnection,
        route: &'a HttpRoute,
        ctx: &'a ClientContext,
    ) -> Exchanging<'a, ()>;

    /// Record that `route` is fully established on `conn`.
    fn route_complete(&self, conn: &mut ManagedConnection, route: &HttpRoute, ctx: &ClientContext);

    /// Close connections idle for longer than `idle`.
    fn close_idle(&self, idle: Duration);

    /// Close idle connections that expired.
    fn close_expired(&self);

    /// Close every connection and refuse further requests.
    fn shutdown(&self);
}

/// A pending [`ConnectionManager::request_connection`].
///
/// The request can be [cancelled](ConnectionRequest::cancel) from another
/// task while it waits.
pub struct ConnectionRequest {
    pool: ConnPool<Conn>,
    route: HttpRoute,
    state: Option<UserToken>,
    cancel: CancellationToken,
}

impl ConnectionRequest {
    /// Wait for the connection, at most `timeout`.
    pub async fn get(self, timeout: Option<Duration>) -> crate::Result<ManagedConnection> {
        let lease = self.pool.lease(&self.route, self.state.as_ref(), timeout);
        tokio::select! {
            entry = lease => Ok(ManagedConnection {
                entry: Some(entry?),
                pool: self.pool.clone(),
            }),
            _ = self.cancel.cancelled() => {
                log::debug!("connection request for {} cancelled", self.route);
                Err(crate::error::canceled())
            }
        }
    }

    /// Cancel the request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the request when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> ConnectionRequest {
        self.cancel = token;
        self
    }
}

impl fmt::Debug for ConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRequest")
            .field("route", &self.route)
            .field("state", &self.state)
            .finish()
    }
}

/// A leased connection.
///
/// Dropping it without handing it back to its manager closes the
/// connection and frees its pool slot.
pub struct ManagedConnection {
    entry: Option<PoolEntry<Conn>>,
    pool: ConnPool<Conn>,
}

impl ManagedConnection {
    /// The pool entry id, unless detached.
    pub fn id(&self) -> Option<u64> {
        self.entry.as_ref().map(PoolEntry::id)
    }

    /// The route of the pool entry, unless detached.
    pub fn route(&self) -> Option<&HttpRoute> {
        self.entry.as_ref().map(PoolEntry::route)
    }

    /// Returns true if attached and open.
    pub fn is_open(&self) -> bool {
        self.entry
            .as_ref()
            .map_or(false, |e| HttpConnection::is_open(&**e.connection()))
    }

    /// Returns true once the route was established on this connection.
    pub fn is_route_complete(&self) -> bool {
        self.entry
            .as_ref()
            .map_or(false, PoolEntry::is_route_complete)
    }

    /// The user token this connection is bound to.
    pub fn state(&self) -> Option<&UserToken> {
        self.entry.as_ref().and_then(PoolEntry::state)
    }

    /// The connection.
    ///
    /// # Errors
    ///
    /// Fails once the connection was detached from its pool entry.
    pub fn connection(&mut self) -> crate::Result<&mut (dyn HttpConnection + 'static)> {
        match self.entry {
            Some(ref mut entry) => Ok(&mut **entry.connection_mut()),
            None => Err(crate::error::shutdown()),
        }
    }

    /// Close the connection immediately.
    pub fn shutdown(&mut self) {
        if let Some(ref mut entry) = self.entry {
            HttpConnection::shutdown(&mut **entry.connection_mut());
        }
    }

    pub(crate) fn entry_mut(&mut self) -> Option<&mut PoolEntry<Conn>> {
        self.entry.as_mut()
    }

    pub(crate) fn detach(&mut self) -> Option<PoolEntry<Conn>> {
        self.entry.take()
    }

    /// Cancelled once the pool force-closes this connection.
    pub(crate) fn closed_token(&self) -> CancellationToken {
        match self.entry {
            Some(ref entry) => entry.closed_token().clone(),
            None => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }
}

impl Drop for ManagedConnection {
    fn drop(&mut self) {
        if let Some(mut entry) = self.entry.take() {
            HttpConnection::shutdown(&mut **entry.connection_mut());
            self.pool.release(entry, false);
        }
    }
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry {
            Some(ref entry) => f
                .debug_tuple("ManagedConnection")
                .field(&entry.id())
                .field(entry.route())
                .finish(),
            None => f.write_str("ManagedConnection(detached)"),
        }
    }
}

/// A [`ConnectionManager`] over a [`ConnPool`].
pub struct PoolingConnectionManager {
    pool: ConnPool<Conn>,
    operator: Arc<dyn ConnectionOperator>,
    socket_config: RwLock<SocketConfigs>,
}

#[derive(Default)]
struct SocketConfigs {
    default: SocketConfig,
    per_host: HashMap<HttpHost, SocketConfig>,
}

impl PoolingConnectionManager {
    /// A manager creating connections with `factory`, connecting them with
    /// a [`DefaultConnectionOperator`].
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> PoolingConnectionManager {
        PoolingConnectionManager::with_operator(
            factory,
            ConnectionConfig::default(),
            Arc::new(DefaultConnectionOperator::default()),
        )
    }

    /// A manager with full control over connection settings and operator.
    pub fn with_operator(
        factory: Arc<dyn ConnectionFactory>,
        config: ConnectionConfig,
        operator: Arc<dyn ConnectionOperator>,
    ) -> PoolingConnectionManager {
        let pool = ConnPool::new(move |route: &HttpRoute| {
            factory
                .create(route, &config)
                .map_err(crate::error::connect)
        });
        PoolingConnectionManager {
            pool,
            operator,
            socket_config: RwLock::new(SocketConfigs::default()),
        }
    }

    /// Set the socket config of hosts without their own.
    pub fn set_default_socket_config(&self, config: SocketConfig) {
        self.socket_config
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .default = config;
    }

    /// Set the socket config of `host`.
    pub fn set_socket_config(&self, host: HttpHost, config: SocketConfig) {
        self.socket_config
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .per_host
            .insert(host, config);
    }

    fn socket_config_for(&self, host: &HttpHost) -> SocketConfig {
        let configs = self.socket_config.read().unwrap_or_else(|e| e.into_inner());
        configs
            .per_host
            .get(host)
            .unwrap_or(&configs.default)
            .clone()
    }

    /// Set the time to live of new connections.
    pub fn set_time_to_live(&self, ttl: Option<Duration>) {
        self.pool.set_time_to_live(ttl);
    }

    /// Check connections idle longer than `period` for staleness before
    /// leasing them.
    pub fn set_validate_after_inactivity(&self, period: Option<Duration>) {
        self.pool.set_validate_after_inactivity(period);
    }

    /// The underlying pool's routes.
    pub fn routes(&self) -> Vec<HttpRoute> {
        self.pool.routes()
    }
}

impl ConnectionManager for PoolingConnectionManager {
    fn request_connection(
        &self,
        route: &HttpRoute,
        state: Option<&UserToken>,
    ) -> ConnectionRequest {
        log::debug!("connection request: {route}; {:?}", self.pool.stats(route));
        ConnectionRequest {
            pool: self.pool.clone(),
            route: route.clone(),
            state: state.cloned(),
            cancel: CancellationToken::new(),
        }
    }

    fn release_connection(
        &self,
        mut conn: ManagedConnection,
        state: Option<UserToken>,
        keep_alive: Option<Duration>,
    ) {
        let mut entry = match conn.detach() {
            Some(entry) => entry,
            None => return,
        };
        let open = HttpConnection::is_open(&**entry.connection());
        if open {
            entry.set_state(state);
            entry.update_expiry(keep_alive);
            match keep_alive {
                Some(d) => log::debug!("connection {} can be kept alive for {:?}", entry.id(), d),
                None => log::debug!("connection {} can be kept alive indefinitely", entry.id()),
            }
        }
        let reusable = open && entry.is_route_complete();
        log::debug!("connection released: {}; {:?}", entry.id(), self.pool.stats(entry.route()));
        self.pool.release(entry, reusable);
    }

    fn connect<'a>(
        &'a self,
        conn: &'a mut ManagedConnection,
        route: &'a HttpRoute,
        connect_timeout: Option<Duration>,
        ctx: &'a ClientContext,
    ) -> Exchanging<'a, ()> {
        Box::pin(async move {
            let host = route.proxy_host().unwrap_or_else(|| route.target_host());
            let config = self.socket_config_for(host);
            let local = route.local_address();
            let inner = conn.connection()?;
            self.operator
                .connect(inner, host, local, connect_timeout, &config, ctx)
                .await
        })
    }

    fn upgrade<'a>(
        &'a self,
        conn: &'a mut ManagedConnection,
        route: &'a HttpRoute,
        ctx: &'a ClientContext,
    ) -> Exchanging<'a, ()> {
        Box::pin(async move {
            let inner = conn.connection()?;
            self.operator.upgrade(inner, route.target_host(), ctx).await
        })
    }

    fn route_complete(
        &self,
        conn: &mut ManagedConnection,
        _route: &HttpRoute,
        _ctx: &ClientContext,
    ) {
        if let Some(entry) = conn.entry_mut() {
            entry.mark_route_complete();
        }
    }

    fn close_idle(&self, idle: Duration) {
        self.pool.close_idle(idle);
    }

    fn close_expired(&self) {
        self.pool.close_expired();
    }

    fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl ConnPoolControl for PoolingConnectionManager {
    fn max_total(&self) -> usize {
        self.pool.max_total()
    }

    fn set_max_total(&self, max: usize) {
        self.pool.set_max_total(max)
    }

    fn default_max_per_route(&self) -> usize {
        self.pool.default_max_per_route()
    }

    fn set_default_max_per_route(&self, max: usize) {
        self.pool.set_default_max_per_route(max)
    }

    fn max_per_route(&self, route: &HttpRoute) -> usize {
        self.pool.max_per_route(route)
    }

    fn set_max_per_route(&self, route: &HttpRoute, max: usize) {
        self.pool.set_max_per_route(route, max)
    }

    fn total_stats(&self) -> PoolStats {
        self.pool.total_stats()
    }

    fn stats(&self, route: &HttpRoute) -> PoolStats {
        self.pool.stats(route)
    }
}

impl fmt::Debug for PoolingConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolingConnectionManager")
            .field("pool", &self.pool)
            .finish()
    }
}
