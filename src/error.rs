use std::error::Error as StdError;
use std::fmt;
use std::io;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use url::Url;

/// A `Result` alias where the `Err` case is `ferry::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The Errors that may occur while executing a request.
///
/// Note: Errors may include the full URL used to make the request. If the URL
/// contains sensitive information (e.g. an API key as a query parameter), be
/// sure to remove it ([`without_url`](Error::without_url)).
pub struct Error {
    inner: Box<Inner>,
}

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    url: Option<Url>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                url: None,
            }),
        }
    }

    /// Returns a possible URL related to this error.
    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Returns a mutable reference to the URL related to this error.
    pub fn url_mut(&mut self) -> Option<&mut Url> {
        self.inner.url.as_mut()
    }

    /// Add a url related to this error (overwriting any existing)
    pub fn with_url(mut self, url: Url) -> Self {
        self.inner.url = Some(url);
        self
    }

    /// Strip the related url from this error (if, for example, it contains
    /// sensitive information)
    pub fn without_url(mut self) -> Self {
        self.inner.url = None;
        self
    }

    /// Returns true if the error came from invalid configuration or an
    /// invalid request.
    pub fn is_builder(&self) -> bool {
        matches!(self.inner.kind, Kind::Builder)
    }

    /// Returns true if the planned route could not be reached from the
    /// route established so far.
    pub fn is_route(&self) -> bool {
        matches!(self.inner.kind, Kind::Route)
    }

    /// Returns true if a proxy refused to open a tunnel.
    ///
    /// The proxy's answer is available through [`tunnel_response`](Error::tunnel_response).
    pub fn is_tunnel_refused(&self) -> bool {
        matches!(self.inner.kind, Kind::TunnelRefused(_))
    }

    /// The buffered response a proxy sent when it refused a `CONNECT`.
    pub fn tunnel_response(&self) -> Option<&TunnelResponse> {
        match self.inner.kind {
            Kind::TunnelRefused(ref res) => Some(res),
            _ => None,
        }
    }

    /// Returns true if no pooled connection became available before the
    /// connection request timeout.
    pub fn is_pool_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::PoolTimeout)
    }

    /// Returns true if the request would have had to be re-sent but its body
    /// cannot be replayed.
    pub fn is_non_repeatable(&self) -> bool {
        matches!(self.inner.kind, Kind::NonRepeatable)
    }

    /// Returns true if the error happened while opening a connection.
    pub fn is_connect(&self) -> bool {
        matches!(self.inner.kind, Kind::Connect)
    }

    /// Returns true if the error happened while sending the request or
    /// receiving the response.
    pub fn is_request(&self) -> bool {
        matches!(self.inner.kind, Kind::Request)
    }

    /// Returns true for I/O level failures: connecting, exchanging, or waiting
    /// on the pool.
    ///
    /// These are the errors the retry stage will offer to its retry handler.
    pub fn is_io(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::Connect | Kind::Request | Kind::PoolTimeout
        )
    }

    /// Returns true if the error came from following redirects.
    pub fn is_redirect(&self) -> bool {
        matches!(self.inner.kind, Kind::Redirect)
    }

    /// Returns true if a peer violated the protocol.
    pub fn is_protocol(&self) -> bool {
        matches!(self.inner.kind, Kind::Protocol)
    }

    /// Returns true if the request was aborted by the caller.
    pub fn is_canceled(&self) -> bool {
        matches!(self.inner.kind, Kind::Canceled)
    }

    /// Returns true if the connection manager was shut down.
    pub fn is_shutdown(&self) -> bool {
        matches!(self.inner.kind, Kind::Shutdown)
    }

    /// Returns true if the error is related to a timeout.
    pub fn is_timeout(&self) -> bool {
        if self.is_pool_timeout() {
            return true;
        }

        let mut source = self.source();

        while let Some(err) = source {
            if err.is::<TimedOut>() {
                return true;
            }
            if let Some(io) = err.downcast_ref::<io::Error>() {
                if io.kind() == io::ErrorKind::TimedOut {
                    return true;
                }
            }
            source = err.source();
        }

        false
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("ferry::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref url) = self.inner.url {
            builder.field("url", &url.as_str());
        }
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Route => f.write_str("route error")?,
            Kind::TunnelRefused(ref res) => {
                write!(f, "CONNECT refused by proxy: {}", res.status())?;
            }
            Kind::PoolTimeout => f.write_str("timeout waiting for connection from pool")?,
            Kind::NonRepeatable => {
                f.write_str("cannot retry request with a non-repeatable request body")?
            }
            Kind::Connect => f.write_str("error trying to connect")?,
            Kind::Request => f.write_str("error sending request")?,
            Kind::Redirect => f.write_str("error following redirect")?,
            Kind::Protocol => f.write_str("protocol error")?,
            Kind::Canceled => f.write_str("request aborted")?,
            Kind::Shutdown => f.write_str("connection manager shut down")?,
        }

        if let Some(url) = &self.inner.url {
            write!(f, " for url ({url})")?;
        }

        if let Some(e) = &self.inner.source {
            write!(f, ": {e}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    Builder,
    Route,
    TunnelRefused(TunnelResponse),
    PoolTimeout,
    NonRepeatable,
    Connect,
    Request,
    Redirect,
    Protocol,
    Canceled,
    Shutdown,
}

/// The answer a proxy gave to a refused `CONNECT`, with the body buffered.
#[derive(Clone, Debug)]
pub struct TunnelResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TunnelResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> TunnelResponse {
        TunnelResponse {
            status,
            headers,
            body,
        }
    }

    /// The status code of the proxy's response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The headers of the proxy's response.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The buffered body of the proxy's response.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

// constructors

pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Builder, Some(e))
}

pub(crate) fn route<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Route, Some(e))
}

pub(crate) fn tunnel_refused(res: TunnelResponse) -> Error {
    Error::new(Kind::TunnelRefused(res), None::<Error>)
}

pub(crate) fn pool_timeout() -> Error {
    Error::new(Kind::PoolTimeout, None::<Error>)
}

pub(crate) fn non_repeatable<E: Into<BoxError>>(e: Option<E>) -> Error {
    Error::new(Kind::NonRepeatable, e)
}

pub(crate) fn connect<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Connect, Some(e))
}

pub(crate) fn request<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Request, Some(e))
}

pub(crate) fn redirect<E: Into<BoxError>>(e: E, url: Url) -> Error {
    Error::new(Kind::Redirect, Some(e)).with_url(url)
}

pub(crate) fn protocol<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Protocol, Some(e))
}

pub(crate) fn canceled() -> Error {
    Error::new(Kind::Canceled, None::<Error>)
}

pub(crate) fn shutdown() -> Error {
    Error::new(Kind::Shutdown, None::<Error>)
}

/// Keeps a crate error raised inside a body stream as it was.
pub(crate) fn cast(e: BoxError) -> Error {
    match e.downcast::<Error>() {
        Ok(e) => *e,
        Err(e) => request(e),
    }
}

// internal Error "sources"

#[derive(Debug)]
pub(crate) struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("operation timed out")
    }
}

impl StdError for TimedOut {}
