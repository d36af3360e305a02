use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpSocket;

use super::Transport;
use crate::error::BoxError;
use crate::host::HttpHost;

/// The future of a socket connect or a layering handshake.
pub type Connecting<'a> = Pin<Box<dyn Future<Output = Result<Transport, BoxError>> + Send + 'a>>;

/// Socket options applied to new connections.
#[derive(Clone, Debug)]
pub struct SocketConfig {
    so_timeout: Option<Duration>,
    tcp_nodelay: bool,
    so_keepalive: bool,
    so_linger: Option<Duration>,
}

impl SocketConfig {
    /// The defaults: `TCP_NODELAY` on, everything else off.
    pub fn new() -> SocketConfig {
        SocketConfig {
            so_timeout: None,
            tcp_nodelay: true,
            so_keepalive: false,
            so_linger: None,
        }
    }

    /// Set the read timeout of new connections.
    pub fn so_timeout(mut self, timeout: Duration) -> SocketConfig {
        self.so_timeout = Some(timeout);
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    pub fn tcp_nodelay(mut self, enabled: bool) -> SocketConfig {
        self.tcp_nodelay = enabled;
        self
    }

    /// Enable or disable `SO_KEEPALIVE`.
    pub fn so_keepalive(mut self, enabled: bool) -> SocketConfig {
        self.so_keepalive = enabled;
        self
    }

    /// Set `SO_LINGER`.
    pub fn so_linger(mut self, linger: Duration) -> SocketConfig {
        self.so_linger = Some(linger);
        self
    }

    /// The read timeout.
    pub fn get_so_timeout(&self) -> Option<Duration> {
        self.so_timeout
    }

    /// Whether `TCP_NODELAY` is set.
    pub fn is_tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }

    /// Whether `SO_KEEPALIVE` is set.
    pub fn is_so_keepalive(&self) -> bool {
        self.so_keepalive
    }

    /// The `SO_LINGER` duration.
    pub fn get_so_linger(&self) -> Option<Duration> {
        self.so_linger
    }
}

impl Default for SocketConfig {
    fn default() -> SocketConfig {
        SocketConfig::new()
    }
}

/// Opens transports for one URI scheme.
pub trait SocketFactory: Send + Sync {
    /// Connect to `remote`, optionally from `local`, on behalf of `host`.
    fn connect<'a>(
        &'a self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        host: &'a HttpHost,
        config: &'a SocketConfig,
    ) -> Connecting<'a>;

    /// This factory as a layering one, if it can layer over a tunnel.
    fn as_layered(&self) -> Option<&dyn LayeredSocketFactory> {
        None
    }
}

/// A [`SocketFactory`] that can also layer a protocol such as TLS over an
/// existing transport.
pub trait LayeredSocketFactory: SocketFactory {
    /// Layer over `transport`, which leads to `host`.
    fn create_layered<'a>(&'a self, transport: Transport, host: &'a HttpHost) -> Connecting<'a>;
}

/// Plain TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainSocketFactory;

impl SocketFactory for PlainSocketFactory {
    fn connect<'a>(
        &'a self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        _host: &'a HttpHost,
        config: &'a SocketConfig,
    ) -> Connecting<'a> {
        Box::pin(async move {
            let socket = if remote.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(config.so_keepalive)?;
            if let Some(local) = local {
                socket.bind(local)?;
            }
            let stream = socket.connect(remote).await?;
            stream.set_nodelay(config.tcp_nodelay)?;
            if config.so_linger.is_some() {
                stream.set_linger(config.so_linger)?;
            }
            Ok(Box::new(stream) as Transport)
        })
    }
}

/// Socket factories by lower-cased URI scheme.
#[derive(Clone)]
pub struct SocketFactoryRegistry {
    factories: HashMap<String, Arc<dyn SocketFactory>>,
}

impl SocketFactoryRegistry {
    /// A registry without any factory.
    pub fn empty() -> SocketFactoryRegistry {
        SocketFactoryRegistry {
            factories: HashMap::new(),
        }
    }

    /// Register `factory` for `scheme`.
    pub fn register<F>(mut self, scheme: &str, factory: F) -> SocketFactoryRegistry
    where
        F: SocketFactory + 'static,
    {
        self.factories
            .insert(scheme.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    /// The factory for `scheme`.
    pub fn lookup(&self, scheme: &str) -> Option<&dyn SocketFactory> {
        self.factories
            .get(&scheme.to_ascii_lowercase())
            .map(|f| &**f)
    }
}

impl Default for SocketFactoryRegistry {
    /// Knows `http`.
    fn default() -> SocketFactoryRegistry {
        SocketFactoryRegistry::empty().register("http", PlainSocketFactory)
    }
}

impl fmt::Debug for SocketFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
