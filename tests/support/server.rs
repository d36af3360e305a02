//! An in-memory network for integration tests.
//!
//! Connections created by a [`Server`] never touch a socket: every request
//! sent on them is recorded as an [`Exchange`] and answered by the test's
//! handler. Socket connects go through a registered socket factory and the
//! resolver, so routing, pooling and tunnelling run for real.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use ferry::connect::{
    Connecting, ConnectionConfig, ConnectionFactory, HttpConnection, LayeredSocketFactory,
    SocketConfig, SocketFactory, SocketFactoryRegistry, Transmitting, Transport,
};
use ferry::dns::InMemoryResolver;
use ferry::route::{HttpRoute, RouteInfo};
use ferry::{Body, HttpClientBuilder, HttpHost};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use http::{Method, Request, Response, StatusCode, Uri};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Hosts the resolver knows; all of them live on the loopback address.
pub const HOSTS: &[&str] = &[
    "api.test",
    "origin.test",
    "other.test",
    "proxy.test",
    "secure.test",
];

/// A request as it arrived at a host.
#[derive(Clone, Debug)]
pub struct Exchange {
    pub conn: usize,
    pub host: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A socket connect made by the client.
#[derive(Clone, Debug)]
pub struct Connect {
    pub host: String,
    pub remote: SocketAddr,
}

/// How a host answers an exchange.
pub enum Reply {
    Response(Response<Body>),
    /// Reading the response fails.
    Fail(io::ErrorKind),
    /// No response arrives; reads time out if the connection has a socket
    /// timeout.
    Hang,
}

impl From<Response<Body>> for Reply {
    fn from(res: Response<Body>) -> Reply {
        Reply::Response(res)
    }
}

type Handler = dyn Fn(&Exchange) -> Reply + Send + Sync;

struct State {
    handler: Box<Handler>,
    exchanges: Mutex<Vec<Exchange>>,
    connects: Mutex<Vec<Connect>>,
    layered: Mutex<Vec<String>>,
    refused: Mutex<HashSet<String>>,
    next_conn: AtomicUsize,
}

#[derive(Clone)]
pub struct Server {
    state: Arc<State>,
    resolver: InMemoryResolver,
}

pub fn http<F>(handler: F) -> Server
where
    F: Fn(&Exchange) -> Reply + Send + Sync + 'static,
{
    let resolver = InMemoryResolver::new();
    for host in HOSTS {
        resolver.add(host, [IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    }
    Server {
        state: Arc::new(State {
            handler: Box::new(handler),
            exchanges: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            layered: Mutex::new(Vec::new()),
            refused: Mutex::new(HashSet::new()),
            next_conn: AtomicUsize::new(0),
        }),
        resolver,
    }
}

impl Server {
    /// A client builder wired to this server's network.
    pub fn client(&self) -> HttpClientBuilder {
        ferry::HttpClient::builder()
            .connection_factory(self.connection_factory())
            .socket_factory_registry(self.sockets())
            .resolver(Arc::new(self.resolver.clone()))
    }

    pub fn connection_factory(&self) -> Arc<dyn ConnectionFactory> {
        let state = self.state.clone();
        let factory = move |route: &HttpRoute,
                            _: &ConnectionConfig|
              -> Result<Box<dyn HttpConnection>, BoxError> {
            let id = state.next_conn.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockConnection {
                id,
                route: route.clone(),
                state: state.clone(),
                transport: None,
                tunnels: 0,
                socket_timeout: None,
                pending: None,
            }))
        };
        Arc::new(factory)
    }

    pub fn sockets(&self) -> SocketFactoryRegistry {
        let sockets = MemorySockets {
            state: self.state.clone(),
        };
        SocketFactoryRegistry::empty()
            .register("http", sockets.clone())
            .register("https", sockets)
    }

    pub fn resolver(&self) -> InMemoryResolver {
        self.resolver.clone()
    }

    /// Make connects to `host` fail.
    pub fn refuse(&self, host: &str) {
        self.state.refused.lock().unwrap().insert(host.to_owned());
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.state.exchanges.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<Connect> {
        self.state.connects.lock().unwrap().clone()
    }

    /// Hosts a secure protocol was layered for.
    pub fn layered(&self) -> Vec<String> {
        self.state.layered.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct MemorySockets {
    state: Arc<State>,
}

impl SocketFactory for MemorySockets {
    fn connect<'a>(
        &'a self,
        remote: SocketAddr,
        _local: Option<SocketAddr>,
        host: &'a HttpHost,
        _config: &'a SocketConfig,
    ) -> Connecting<'a> {
        Box::pin(async move {
            if self.state.refused.lock().unwrap().contains(host.hostname()) {
                let err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
                return Err(err.into());
            }
            self.state.connects.lock().unwrap().push(Connect {
                host: host.hostname().to_owned(),
                remote,
            });
            let (local, _peer) = tokio::io::duplex(1024);
            Ok(Box::new(local) as Transport)
        })
    }

    fn as_layered(&self) -> Option<&dyn LayeredSocketFactory> {
        Some(self)
    }
}

impl LayeredSocketFactory for MemorySockets {
    fn create_layered<'a>(&'a self, transport: Transport, host: &'a HttpHost) -> Connecting<'a> {
        Box::pin(async move {
            self.state
                .layered
                .lock()
                .unwrap()
                .push(host.hostname().to_owned());
            Ok(transport)
        })
    }
}

struct MockConnection {
    id: usize,
    route: HttpRoute,
    state: Arc<State>,
    transport: Option<Transport>,
    // CONNECTs answered with 2xx on the current transport
    tunnels: usize,
    socket_timeout: Option<Duration>,
    pending: Option<Reply>,
}

impl MockConnection {
    // each open tunnel moves requests one hop further along the route
    fn landing_host(&self) -> String {
        match self.route.proxies().get(self.tunnels) {
            Some(proxy) => proxy.hostname().to_owned(),
            None => self.route.target_host().hostname().to_owned(),
        }
    }
}

impl HttpConnection for MockConnection {
    fn bind(&mut self, transport: Transport) {
        self.transport = Some(transport);
    }

    fn take_transport(&mut self) -> Option<Transport> {
        self.transport.take()
    }

    fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn is_stale(&mut self) -> bool {
        false
    }

    fn set_socket_timeout(&mut self, timeout: Option<Duration>) {
        self.socket_timeout = timeout;
    }

    fn socket_timeout(&self) -> Option<Duration> {
        self.socket_timeout
    }

    fn close(&mut self) -> Transmitting<'_, ()> {
        Box::pin(async move {
            self.shutdown();
            Ok(())
        })
    }

    fn shutdown(&mut self) {
        self.transport = None;
        self.tunnels = 0;
    }

    fn send_request(&mut self, request: Request<Body>) -> Transmitting<'_, ()> {
        Box::pin(async move {
            if self.transport.is_none() {
                return Err("connection is not open".into());
            }
            let (parts, body) = request.into_parts();
            let body = body.bytes().await?;
            let exchange = Exchange {
                conn: self.id,
                host: self.landing_host(),
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            };
            let reply = (self.state.handler)(&exchange);
            if exchange.method == Method::CONNECT {
                match reply {
                    Reply::Response(ref res) if res.status().is_success() => self.tunnels += 1,
                    _ => {}
                }
            }
            self.state.exchanges.lock().unwrap().push(exchange);
            self.pending = Some(reply);
            Ok(())
        })
    }

    fn receive_response(&mut self) -> Transmitting<'_, Response<Body>> {
        Box::pin(async move {
            match self.pending.take() {
                Some(Reply::Response(res)) => Ok(res),
                Some(Reply::Fail(kind)) => {
                    self.shutdown();
                    Err(io::Error::new(kind, "connection failed").into())
                }
                Some(Reply::Hang) => match self.socket_timeout {
                    Some(timeout) => {
                        tokio::time::sleep(timeout).await;
                        Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out").into())
                    }
                    None => std::future::pending().await,
                },
                None => Err("no request was sent".into()),
            }
        })
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("open", &self.transport.is_some())
            .field("tunnels", &self.tunnels)
            .finish()
    }
}

/// An empty response that keeps the connection reusable.
pub fn reply(status: u16) -> Reply {
    reply_with(status, &[])
}

pub fn reply_with(status: u16, headers: &[(&str, &str)]) -> Reply {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = StatusCode::from_u16(status).unwrap();
    res.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    for (name, value) in headers {
        res.headers_mut().append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    res.into()
}

pub fn reply_text(status: u16, text: &'static str) -> Reply {
    let mut res = Response::new(Body::from(text));
    *res.status_mut() = StatusCode::from_u16(status).unwrap();
    res.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(text.len()));
    res.into()
}

pub fn get(uri: &str) -> Request<Body> {
    let mut req = Request::new(Body::empty());
    *req.uri_mut() = uri.parse().unwrap();
    req
}
