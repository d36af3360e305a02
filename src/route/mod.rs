//! Routes: planning, tracking and establishing the path to a target.
//!
//! A [`HttpRoute`] is the immutable plan: the target, an optional chain of
//! proxies, and whether the connection must be tunnelled and layered. A
//! [`RouteTracker`] records what has actually been established on one
//! connection, and a [`RouteDirector`] decides the next [`Step`] that brings
//! the tracked route closer to the plan.

use std::net::IpAddr;

use crate::host::HttpHost;

mod director;
mod http_route;
mod planner;
mod tracker;

pub use self::director::{BasicRouteDirector, RouteDirector, Step};
pub use self::http_route::HttpRoute;
pub use self::planner::{DefaultRoutePlanner, RoutePlanner};
pub use self::tracker::RouteTracker;

/// Whether a route is tunnelled through its proxy chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TunnelType {
    /// Requests are sent to the last proxy in plain form.
    Plain,
    /// An end-to-end tunnel is opened with `CONNECT`.
    Tunnelled,
}

/// Whether a protocol is layered over the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerType {
    /// Nothing layered.
    Plain,
    /// A secure protocol (TLS) runs over the (tunnelled) connection.
    Layered,
}

/// Read access to the shape of a route.
///
/// Implemented by both the planned [`HttpRoute`] and the [`RouteTracker`],
/// so a [`RouteDirector`] can compare the two hop by hop.
pub trait RouteInfo {
    /// The final target host.
    fn target_host(&self) -> &HttpHost;

    /// The local address to bind to, if any.
    fn local_address(&self) -> Option<IpAddr>;

    /// The number of hops: proxies plus the target.
    ///
    /// A tracker that is not yet connected has zero hops.
    fn hop_count(&self) -> usize;

    /// The host at hop `hop`; the last hop is the target.
    ///
    /// # Panics
    ///
    /// Panics if `hop` is not less than [`hop_count`](RouteInfo::hop_count).
    fn hop_target(&self, hop: usize) -> &HttpHost;

    /// The first proxy, if there are proxies.
    fn proxy_host(&self) -> Option<&HttpHost>;

    /// The tunnel type.
    fn tunnel_type(&self) -> TunnelType;

    /// The layering type.
    fn layer_type(&self) -> LayerType;

    /// Whether the route is (to be) secure.
    fn is_secure(&self) -> bool;

    /// Returns true if the route is tunnelled.
    fn is_tunnelled(&self) -> bool {
        self.tunnel_type() == TunnelType::Tunnelled
    }

    /// Returns true if the route is layered.
    fn is_layered(&self) -> bool {
        self.layer_type() == LayerType::Layered
    }
}
