use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use http::{Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::BoxError;
use crate::route::HttpRoute;
use crate::Body;

/// A byte stream a connection runs over: a TCP socket, or a TLS session
/// layered on one.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// A boxed [`Io`].
pub type Transport = Box<dyn Io>;

/// The future of establishing a connection's route.
pub type Exchanging<'a, T> = Pin<Box<dyn Future<Output = crate::Result<T>> + Send + 'a>>;

/// The future of an I/O operation of an [`HttpConnection`].
///
/// The client reports its errors as request errors, unless the
/// implementation returns a `ferry::Error` itself.
pub type Transmitting<'a, T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send + 'a>>;

/// An HTTP/1.1 client connection.
///
/// The connection frames messages over whatever [`Transport`] it is bound
/// to. An unbound connection is not open. Implementations own the message
/// framing; the client only decides what is sent and when.
///
/// A response body returned by
/// [`receive_response`](HttpConnection::receive_response) streams from the
/// connection. The connection must not be used for another exchange until
/// that body has ended.
pub trait HttpConnection: Send + fmt::Debug {
    /// Bind to an open transport.
    fn bind(&mut self, transport: Transport);

    /// Unbind the transport, so it can be layered over.
    fn take_transport(&mut self) -> Option<Transport>;

    /// Returns true while bound to an open transport.
    fn is_open(&self) -> bool;

    /// Returns true if the peer appears to have closed the connection.
    fn is_stale(&mut self) -> bool;

    /// Set the read timeout; `None` waits indefinitely.
    fn set_socket_timeout(&mut self, timeout: Option<Duration>);

    /// The read timeout.
    fn socket_timeout(&self) -> Option<Duration>;

    /// Close gracefully, flushing what was written.
    fn close(&mut self) -> Transmitting<'_, ()>;

    /// Close immediately, without flushing or draining.
    fn shutdown(&mut self);

    /// Write a request. The body is streamed after the head.
    fn send_request(&mut self, request: Request<Body>) -> Transmitting<'_, ()>;

    /// Read the next response head; the body streams lazily.
    fn receive_response(&mut self) -> Transmitting<'_, Response<Body>>;
}

/// Buffer and message limits of new connections.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    buffer_size: usize,
    max_header_count: Option<usize>,
    max_line_length: Option<usize>,
}

impl ConnectionConfig {
    /// The defaults: 8 KiB buffers and no message limits.
    pub fn new() -> ConnectionConfig {
        ConnectionConfig {
            buffer_size: 8 * 1024,
            max_header_count: None,
            max_line_length: None,
        }
    }

    /// Set the buffer size.
    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size;
    }

    /// Limit the number of header lines of a response.
    pub fn set_max_header_count(&mut self, max: Option<usize>) {
        self.max_header_count = max;
    }

    /// Limit the length of one line of a response head.
    pub fn set_max_line_length(&mut self, max: Option<usize>) {
        self.max_line_length = max;
    }

    /// The buffer size.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// The header line limit.
    pub fn max_header_count(&self) -> Option<usize> {
        self.max_header_count
    }

    /// The line length limit.
    pub fn max_line_length(&self) -> Option<usize> {
        self.max_line_length
    }
}

impl Default for ConnectionConfig {
    fn default() -> ConnectionConfig {
        ConnectionConfig::new()
    }
}

/// Creates unbound connections for a route.
pub trait ConnectionFactory: Send + Sync {
    /// A new connection, not yet bound to a transport.
    fn create(
        &self,
        route: &HttpRoute,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn HttpConnection>, BoxError>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(&HttpRoute, &ConnectionConfig) -> Result<Box<dyn HttpConnection>, BoxError>
        + Send
        + Sync,
{
    fn create(
        &self,
        route: &HttpRoute,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn HttpConnection>, BoxError> {
        self(route, config)
    }
}
