use std::fmt;
use std::net::IpAddr;

use super::http_route::write_route;
use super::{HttpRoute, LayerType, RouteInfo, TunnelType};
use crate::host::HttpHost;

/// Tracks the route a connection has established so far.
///
/// A tracker starts disconnected. Each operation records one step the
/// connection has completed; steps that make no sense for the current state
/// (connecting twice, tunnelling before connecting) are programming errors
/// and panic.
#[derive(Clone, PartialEq, Eq)]
pub struct RouteTracker {
    target: HttpHost,
    local_address: Option<IpAddr>,
    connected: bool,
    proxy_chain: Vec<HttpHost>,
    tunnelled: TunnelType,
    layered: LayerType,
    secure: bool,
}

impl RouteTracker {
    /// Start tracking a connection to `target`.
    pub fn new(target: HttpHost, local_address: Option<IpAddr>) -> RouteTracker {
        RouteTracker {
            target,
            local_address,
            connected: false,
            proxy_chain: Vec::new(),
            tunnelled: TunnelType::Plain,
            layered: LayerType::Plain,
            secure: false,
        }
    }

    /// Start tracking the establishment of `route`.
    pub fn for_route(route: &HttpRoute) -> RouteTracker {
        RouteTracker::new(route.target_host().clone(), route.local_address())
    }

    /// Returns true once the first hop is connected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The target has been connected directly.
    pub fn connect_target(&mut self, secure: bool) {
        assert!(!self.connected, "already connected");
        self.connected = true;
        self.secure = secure;
    }

    /// The first proxy has been connected.
    pub fn connect_proxy(&mut self, proxy: HttpHost, secure: bool) {
        assert!(!self.connected, "already connected");
        self.connected = true;
        self.proxy_chain = vec![proxy];
        self.secure = secure;
    }

    /// A tunnel to the target has been opened through the proxy chain.
    pub fn tunnel_target(&mut self, secure: bool) {
        assert!(self.connected, "no tunnel unless connected");
        assert!(!self.proxy_chain.is_empty(), "no tunnel without proxy");
        self.tunnelled = TunnelType::Tunnelled;
        self.secure = secure;
    }

    /// A tunnel to another proxy has been opened, extending the chain.
    pub fn tunnel_proxy(&mut self, proxy: HttpHost, secure: bool) {
        assert!(self.connected, "no tunnel unless connected");
        assert!(!self.proxy_chain.is_empty(), "no proxy tunnel without proxy");
        self.proxy_chain.push(proxy);
        self.secure = secure;
    }

    /// A protocol has been layered over the connection.
    pub fn layer_protocol(&mut self, secure: bool) {
        assert!(
            self.connected,
            "no layered protocol unless connected"
        );
        self.layered = LayerType::Layered;
        self.secure = secure;
    }

    /// Forget everything established so far.
    pub fn reset(&mut self) {
        self.connected = false;
        self.proxy_chain.clear();
        self.tunnelled = TunnelType::Plain;
        self.layered = LayerType::Plain;
        self.secure = false;
    }

    /// The established route, or `None` if nothing is connected yet.
    pub fn to_route(&self) -> Option<HttpRoute> {
        if !self.connected {
            return None;
        }
        HttpRoute::new(
            self.target.clone(),
            self.local_address,
            self.proxy_chain.clone(),
            self.secure,
            self.tunnelled,
            self.layered,
        )
        .ok()
    }
}

impl RouteInfo for RouteTracker {
    fn target_host(&self) -> &HttpHost {
        &self.target
    }

    fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    fn hop_count(&self) -> usize {
        if self.connected {
            self.proxy_chain.len() + 1
        } else {
            0
        }
    }

    fn hop_target(&self, hop: usize) -> &HttpHost {
        let count = self.hop_count();
        assert!(hop < count, "hop index {hop} exceeds tracked hop count {count}");
        if hop < self.proxy_chain.len() {
            &self.proxy_chain[hop]
        } else {
            &self.target
        }
    }

    fn proxy_host(&self) -> Option<&HttpHost> {
        self.proxy_chain.first()
    }

    fn tunnel_type(&self) -> TunnelType {
        self.tunnelled
    }

    fn layer_type(&self) -> LayerType {
        self.layered
    }

    fn is_secure(&self) -> bool {
        self.secure
    }
}

impl fmt::Display for RouteTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.connected {
            f.write_str("[disconnected] ")?;
        }
        write_route(f, self, self.local_address, &self.proxy_chain)
    }
}

impl fmt::Debug for RouteTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteTracker({self})")
    }
}
