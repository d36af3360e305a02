//! Hosts and default ports.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use http::Uri;

use crate::error::BoxError;

/// The name, port and scheme of a host a connection can be made to.
///
/// Host names and schemes are compared case-insensitively; both are stored
/// lower-cased. A missing port means "the scheme's default".
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpHost {
    scheme: String,
    hostname: String,
    port: Option<u16>,
    address: Option<IpAddr>,
}

impl HttpHost {
    /// Create a host from a scheme, name and optional port.
    pub fn new(scheme: &str, hostname: &str, port: Option<u16>) -> HttpHost {
        HttpHost {
            scheme: scheme.to_ascii_lowercase(),
            hostname: hostname.to_ascii_lowercase(),
            port,
            address: None,
        }
    }

    /// Create an `http` host.
    pub fn http(hostname: &str, port: Option<u16>) -> HttpHost {
        HttpHost::new("http", hostname, port)
    }

    /// Create an `https` host.
    pub fn https(hostname: &str, port: Option<u16>) -> HttpHost {
        HttpHost::new("https", hostname, port)
    }

    /// Pin this host to an already resolved address.
    ///
    /// Connections to a host with an address skip name resolution.
    pub fn with_address(mut self, address: IpAddr) -> HttpHost {
        self.address = Some(address);
        self
    }

    /// Extract the host part of an absolute URI.
    ///
    /// Returns `None` for relative URIs.
    pub fn from_uri(uri: &Uri) -> Option<HttpHost> {
        let host = uri.host()?;
        let scheme = uri.scheme_str().unwrap_or("http");
        // bracketed IPv6 literal
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        Some(HttpHost::new(scheme, host, uri.port_u16()))
    }

    /// The lower-cased scheme name.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The lower-cased host name.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The pre-resolved address, if any.
    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    /// Returns true if the scheme is `https`.
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    pub(crate) fn with_port(&self, port: u16) -> HttpHost {
        HttpHost {
            port: Some(port),
            ..self.clone()
        }
    }

    /// `host` or `host:port`, the form used in `Host` headers and `CONNECT`
    /// request targets.
    pub fn to_host_string(&self) -> String {
        let name = if self.hostname.contains(':') {
            format!("[{}]", self.hostname)
        } else {
            self.hostname.clone()
        };
        match self.port {
            Some(port) => format!("{name}:{port}"),
            None => name,
        }
    }

    pub(crate) fn to_uri_prefix(&self) -> String {
        format!("{}://{}", self.scheme, self.to_host_string())
    }
}

impl fmt::Display for HttpHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri_prefix())
    }
}

impl fmt::Debug for HttpHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut t = f.debug_tuple("HttpHost");
        t.field(&format_args!("{}", self));
        if let Some(addr) = self.address {
            t.field(&addr);
        }
        t.finish()
    }
}

impl FromStr for HttpHost {
    type Err = crate::Error;

    /// Parses `scheme://host[:port]` or `host[:port]` (scheme defaults to `http`).
    fn from_str(s: &str) -> crate::Result<HttpHost> {
        let s = if s.contains("://") {
            s.to_owned()
        } else {
            format!("http://{s}")
        };
        let uri = s.parse::<Uri>().map_err(crate::error::builder)?;
        HttpHost::from_uri(&uri).ok_or_else(|| crate::error::builder("host name missing"))
    }
}

/// Maps a host to the port a connection should actually be made on.
pub trait SchemePortResolver: Send + Sync {
    /// Returns the explicit port of `host`, or its scheme's default.
    fn resolve(&self, host: &HttpHost) -> Result<u16, BoxError>;
}

/// Knows the default ports of `http` and `https`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSchemePortResolver;

impl SchemePortResolver for DefaultSchemePortResolver {
    fn resolve(&self, host: &HttpHost) -> Result<u16, BoxError> {
        if let Some(port) = host.port() {
            return Ok(port);
        }
        default_port(host.scheme())
            .ok_or_else(|| format!("{} protocol is not supported", host.scheme()).into())
    }
}

pub(crate) fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}
