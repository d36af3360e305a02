use std::fmt;
use std::net::IpAddr;

use super::{LayerType, RouteInfo, TunnelType};
use crate::host::{default_port, HttpHost};

/// The planned route to a target host.
///
/// Routes are immutable and cheap to compare; they are also the key by
/// which the connection pool partitions its connections.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpRoute {
    target: HttpHost,
    local_address: Option<IpAddr>,
    proxies: Vec<HttpHost>,
    tunnelled: TunnelType,
    layered: LayerType,
    secure: bool,
}

impl HttpRoute {
    /// A direct route to `target`.
    pub fn direct(target: HttpHost, local_address: Option<IpAddr>, secure: bool) -> HttpRoute {
        HttpRoute {
            target: normalize(target),
            local_address,
            proxies: Vec::new(),
            tunnelled: TunnelType::Plain,
            layered: LayerType::Plain,
            secure,
        }
    }

    /// A route through one proxy.
    ///
    /// Secure routes through a proxy are tunnelled and layered; plain ones
    /// send their requests to the proxy.
    pub fn proxied(
        target: HttpHost,
        local_address: Option<IpAddr>,
        proxy: HttpHost,
        secure: bool,
    ) -> HttpRoute {
        let (tunnelled, layered) = if secure {
            (TunnelType::Tunnelled, LayerType::Layered)
        } else {
            (TunnelType::Plain, LayerType::Plain)
        };
        HttpRoute {
            target: normalize(target),
            local_address,
            proxies: vec![normalize(proxy)],
            tunnelled,
            layered,
            secure,
        }
    }

    /// A route with full control over every property.
    ///
    /// # Errors
    ///
    /// A tunnelled route without any proxy is rejected.
    pub fn new(
        target: HttpHost,
        local_address: Option<IpAddr>,
        proxies: Vec<HttpHost>,
        secure: bool,
        tunnelled: TunnelType,
        layered: LayerType,
    ) -> crate::Result<HttpRoute> {
        if tunnelled == TunnelType::Tunnelled && proxies.is_empty() {
            return Err(crate::error::builder("proxy required if tunnelled"));
        }
        Ok(HttpRoute {
            target: normalize(target),
            local_address,
            proxies: proxies.into_iter().map(normalize).collect(),
            tunnelled,
            layered,
            secure,
        })
    }

    /// The proxies, in the order they are passed through.
    pub fn proxies(&self) -> &[HttpHost] {
        &self.proxies
    }
}

// An explicit default port keeps `http://a` and `http://a:80` on one route.
fn normalize(host: HttpHost) -> HttpHost {
    if host.port().is_some() {
        return host;
    }
    match default_port(host.scheme()) {
        Some(port) => host.with_port(port),
        None => host,
    }
}

impl RouteInfo for HttpRoute {
    fn target_host(&self) -> &HttpHost {
        &self.target
    }

    fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    fn hop_count(&self) -> usize {
        self.proxies.len() + 1
    }

    fn hop_target(&self, hop: usize) -> &HttpHost {
        let count = self.hop_count();
        assert!(hop < count, "hop index {hop} exceeds hop count {count}");
        if hop < self.proxies.len() {
            &self.proxies[hop]
        } else {
            &self.target
        }
    }

    fn proxy_host(&self) -> Option<&HttpHost> {
        self.proxies.first()
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

impl fmt::Display for HttpRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_route(f, self, self.local_address, &self.proxies)
    }
}

impl fmt::Debug for HttpRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpRoute({self})")
    }
}

// {tls}->proxy->target, the shape used in logs and route errors
pub(super) fn write_route<R: RouteInfo>(
    f: &mut fmt::Formatter<'_>,
    route: &R,
    local: Option<IpAddr>,
    proxies: &[HttpHost],
) -> fmt::Result {
    if let Some(local) = local {
        write!(f, "{local}->")?;
    }
    f.write_str("{")?;
    if route.is_tunnelled() {
        f.write_str("t")?;
    }
    if route.is_layered() {
        f.write_str("l")?;
    }
    if route.is_secure() {
        f.write_str("s")?;
    }
    f.write_str("}->")?;
    for proxy in proxies {
        write!(f, "{proxy}->")?;
    }
    write!(f, "{}", route.target_host())
}
