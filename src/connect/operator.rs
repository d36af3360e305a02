use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use super::{Exchanging, HttpConnection, SocketConfig, SocketFactoryRegistry};
use crate::context::ClientContext;
use crate::dns::DynResolver;
use crate::error::{self, BoxError, TimedOut};
use crate::host::{DefaultSchemePortResolver, HttpHost, SchemePortResolver};

/// Opens the transport of a connection and layers protocols over it.
pub trait ConnectionOperator: Send + Sync {
    /// Connect `conn` to `host`, trying each resolved address in turn.
    fn connect<'a>(
        &'a self,
        conn: &'a mut dyn HttpConnection,
        host: &'a HttpHost,
        local_address: Option<IpAddr>,
        connect_timeout: Option<Duration>,
        config: &'a SocketConfig,
        ctx: &'a ClientContext,
    ) -> Exchanging<'a, ()>;

    /// Layer the protocol of `host`'s scheme over the open transport of
    /// `conn`.
    fn upgrade<'a>(
        &'a self,
        conn: &'a mut dyn HttpConnection,
        host: &'a HttpHost,
        ctx: &'a ClientContext,
    ) -> Exchanging<'a, ()>;
}

/// A [`ConnectionOperator`] over a [`SocketFactoryRegistry`] and a resolver.
#[derive(Clone)]
pub struct DefaultConnectionOperator {
    registry: Arc<SocketFactoryRegistry>,
    resolver: DynResolver,
    port_resolver: Arc<dyn SchemePortResolver>,
}

impl DefaultConnectionOperator {
    /// An operator using the system resolver.
    pub fn new(registry: SocketFactoryRegistry) -> DefaultConnectionOperator {
        DefaultConnectionOperator {
            registry: Arc::new(registry),
            resolver: DynResolver::gai(),
            port_resolver: Arc::new(DefaultSchemePortResolver),
        }
    }

    /// Resolve host names with `resolver`.
    pub fn resolver(mut self, resolver: Arc<dyn crate::dns::Resolve>) -> DefaultConnectionOperator {
        self.resolver = DynResolver::new(resolver);
        self
    }

    /// Fill in missing ports with `port_resolver`.
    pub fn port_resolver(
        mut self,
        port_resolver: Arc<dyn SchemePortResolver>,
    ) -> DefaultConnectionOperator {
        self.port_resolver = port_resolver;
        self
    }

    async fn addresses(&self, host: &HttpHost, port: u16) -> crate::Result<Vec<SocketAddr>> {
        if let Some(ip) = host.address() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }
        if let Ok(ip) = host.hostname().parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }
        self.resolver
            .resolve_with_port(host.hostname(), port)
            .await
            .map_err(error::connect)
    }
}

impl Default for DefaultConnectionOperator {
    fn default() -> DefaultConnectionOperator {
        DefaultConnectionOperator::new(SocketFactoryRegistry::default())
    }
}

impl ConnectionOperator for DefaultConnectionOperator {
    fn connect<'a>(
        &'a self,
        conn: &'a mut dyn HttpConnection,
        host: &'a HttpHost,
        local_address: Option<IpAddr>,
        connect_timeout: Option<Duration>,
        config: &'a SocketConfig,
        _ctx: &'a ClientContext,
    ) -> Exchanging<'a, ()> {
        Box::pin(async move {
            let factory = self.registry.lookup(host.scheme()).ok_or_else(|| {
                error::builder(format!("{} protocol is not supported", host.scheme()))
            })?;
            let port = self.port_resolver.resolve(host).map_err(error::builder)?;
            let addrs = self.addresses(host, port).await?;
            let local = local_address.map(|ip| SocketAddr::new(ip, 0));

            let last = addrs.len().saturating_sub(1);
            for (i, addr) in addrs.into_iter().enumerate() {
                log::debug!("connecting to {addr}");
                let attempt = factory.connect(addr, local, host, config);
                let result = match connect_timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(Box::new(TimedOut) as BoxError),
                    },
                    None => attempt.await,
                };
                match result {
                    Ok(transport) => {
                        conn.bind(transport);
                        conn.set_socket_timeout(config.get_so_timeout());
                        log::debug!("connection established to {addr}");
                        return Ok(());
                    }
                    Err(err) if i == last => {
                        return Err(error::connect(err));
                    }
                    Err(err) => {
                        log::debug!("connect to {addr} failed ({err}); trying the next address");
                    }
                }
            }
            Err(error::connect(format!("no address to connect to {host}")))
        })
    }

    fn upgrade<'a>(
        &'a self,
        conn: &'a mut dyn HttpConnection,
        host: &'a HttpHost,
        _ctx: &'a ClientContext,
    ) -> Exchanging<'a, ()> {
        Box::pin(async move {
            let factory = self.registry.lookup(host.scheme()).ok_or_else(|| {
                error::builder(format!("{} protocol is not supported", host.scheme()))
            })?;
            let layered = factory.as_layered().ok_or_else(|| {
                error::builder(format!(
                    "{} protocol does not support connection upgrade",
                    host.scheme()
                ))
            })?;
            let transport = conn
                .take_transport()
                .ok_or_else(|| error::connect("connection is not open"))?;
            let transport = layered
                .create_layered(transport, host)
                .await
                .map_err(error::connect)?;
            conn.bind(transport);
            log::debug!("layered {} over connection to {}", host.scheme(), host);
            Ok(())
        })
    }
}

impl std::fmt::Debug for DefaultConnectionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultConnectionOperator")
            .field("registry", &self.registry)
            .field("resolver", &self.resolver)
            .finish()
    }
}
