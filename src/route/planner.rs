use std::sync::Arc;

use http::Request;

use super::HttpRoute;
use crate::context::ClientContext;
use crate::host::{DefaultSchemePortResolver, HttpHost, SchemePortResolver};
use crate::proxy::{self, Proxy};
use crate::Body;

/// Picks the route a request to a target host should take.
pub trait RoutePlanner: Send + Sync {
    /// Determine the route for `request` to `target`.
    fn determine_route(
        &self,
        target: &HttpHost,
        request: &Request<Body>,
        ctx: &ClientContext,
    ) -> crate::Result<HttpRoute>;
}

/// Plans direct routes, or routes through a proxy picked by [`Proxy`] rules.
///
/// A proxy set on the request's [`RequestConfig`](crate::RequestConfig)
/// takes precedence over the rules. Targets with the `https` scheme are
/// secure, and secure routes through a proxy are tunnelled.
#[derive(Clone)]
pub struct DefaultRoutePlanner {
    port_resolver: Arc<dyn SchemePortResolver>,
    proxies: Arc<Vec<Proxy>>,
}

impl DefaultRoutePlanner {
    /// A planner that never uses a proxy unless a request asks for one.
    pub fn new() -> DefaultRoutePlanner {
        DefaultRoutePlanner::with_proxies(Vec::new())
    }

    /// A planner that consults `proxies`, in order.
    pub fn with_proxies(proxies: Vec<Proxy>) -> DefaultRoutePlanner {
        DefaultRoutePlanner {
            port_resolver: Arc::new(DefaultSchemePortResolver),
            proxies: Arc::new(proxies),
        }
    }

    /// Use `resolver` to fill in missing ports.
    pub fn port_resolver(mut self, resolver: Arc<dyn SchemePortResolver>) -> DefaultRoutePlanner {
        self.port_resolver = resolver;
        self
    }

    fn determine_proxy(&self, target: &HttpHost, ctx: &ClientContext) -> Option<HttpHost> {
        if let Some(proxy) = ctx.request_config().proxy() {
            return Some(proxy.clone());
        }
        proxy::intercept(&self.proxies, target)
    }
}

impl Default for DefaultRoutePlanner {
    fn default() -> DefaultRoutePlanner {
        DefaultRoutePlanner::new()
    }
}

impl RoutePlanner for DefaultRoutePlanner {
    fn determine_route(
        &self,
        target: &HttpHost,
        _request: &Request<Body>,
        ctx: &ClientContext,
    ) -> crate::Result<HttpRoute> {
        let port = self
            .port_resolver
            .resolve(target)
            .map_err(crate::error::builder)?;
        let target = target.with_port(port);
        let secure = target.is_secure();
        let local = ctx.request_config().local_address();

        let route = match self.determine_proxy(&target, ctx) {
            Some(proxy) => HttpRoute::proxied(target, local, proxy, secure),
            None => HttpRoute::direct(target, local, secure),
        };
        log::trace!("planned route {route}");
        Ok(route)
    }
}

impl std::fmt::Debug for DefaultRoutePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultRoutePlanner")
            .field("proxies", &self.proxies)
            .finish()
    }
}
