//! Request-scoped configuration.
//!
//! A client carries a default [`RequestConfig`]. A single request can replace
//! it by inserting its own `RequestConfig` into the request's
//! [`http::Extensions`]:
//!
//! ```
//! # use std::time::Duration;
//! let mut req = http::Request::new(ferry::Body::empty());
//! req.extensions_mut().insert(
//!     ferry::RequestConfig::builder()
//!         .connection_request_timeout(Duration::from_secs(1))
//!         .max_redirects(5)
//!         .build(),
//! );
//! ```
//!
//! The override is all-or-nothing: fields are not merged with the client's
//! default.

use std::net::IpAddr;
use std::time::Duration;

use http::Extensions;

use crate::host::HttpHost;

/// Timeouts and switches for executing one request.
#[derive(Clone, Debug)]
pub struct RequestConfig {
    connect_timeout: Option<Duration>,
    socket_timeout: Option<Duration>,
    connection_request_timeout: Option<Duration>,
    redirects_enabled: bool,
    max_redirects: usize,
    relative_redirects_allowed: bool,
    circular_redirects_allowed: bool,
    authentication_enabled: bool,
    stale_connection_check: bool,
    target_preferred_auth_schemes: Option<Vec<String>>,
    proxy_preferred_auth_schemes: Option<Vec<String>>,
    local_address: Option<IpAddr>,
    proxy: Option<HttpHost>,
}

impl Default for RequestConfig {
    fn default() -> RequestConfig {
        RequestConfig {
            connect_timeout: None,
            socket_timeout: None,
            connection_request_timeout: None,
            redirects_enabled: true,
            max_redirects: 50,
            relative_redirects_allowed: true,
            circular_redirects_allowed: false,
            authentication_enabled: true,
            stale_connection_check: false,
            target_preferred_auth_schemes: None,
            proxy_preferred_auth_schemes: None,
            local_address: None,
            proxy: None,
        }
    }
}

impl RequestConfig {
    /// Start building a config from the defaults.
    pub fn builder() -> RequestConfigBuilder {
        RequestConfigBuilder {
            config: RequestConfig::default(),
        }
    }

    /// Start building a config from this one.
    pub fn to_builder(&self) -> RequestConfigBuilder {
        RequestConfigBuilder {
            config: self.clone(),
        }
    }

    /// Timeout for opening a connection. `None` waits indefinitely.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Timeout for each read on an established connection.
    pub fn socket_timeout(&self) -> Option<Duration> {
        self.socket_timeout
    }

    /// Timeout for leasing a connection from the pool.
    pub fn connection_request_timeout(&self) -> Option<Duration> {
        self.connection_request_timeout
    }

    /// Whether redirects are followed.
    pub fn redirects_enabled(&self) -> bool {
        self.redirects_enabled
    }

    /// How many redirects are followed before giving up.
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Whether a relative `Location` is accepted.
    pub fn relative_redirects_allowed(&self) -> bool {
        self.relative_redirects_allowed
    }

    /// Whether a redirect may revisit a location.
    pub fn circular_redirects_allowed(&self) -> bool {
        self.circular_redirects_allowed
    }

    /// Whether authentication challenges are answered.
    pub fn authentication_enabled(&self) -> bool {
        self.authentication_enabled
    }

    /// Whether a leased pooled connection is checked for staleness.
    pub fn stale_connection_check(&self) -> bool {
        self.stale_connection_check
    }

    /// Auth scheme names in order of preference for targets.
    pub fn target_preferred_auth_schemes(&self) -> Option<&[String]> {
        self.target_preferred_auth_schemes.as_deref()
    }

    /// Auth scheme names in order of preference for proxies.
    pub fn proxy_preferred_auth_schemes(&self) -> Option<&[String]> {
        self.proxy_preferred_auth_schemes.as_deref()
    }

    /// The local address connections bind to.
    pub fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    /// A proxy that overrides the client's proxy rules.
    pub fn proxy(&self) -> Option<&HttpHost> {
        self.proxy.as_ref()
    }

    /// The config of a request: its own if it carries one, else `self`.
    pub(crate) fn fetch<'a>(&'a self, ext: &'a Extensions) -> &'a RequestConfig {
        ext.get::<RequestConfig>().unwrap_or(self)
    }
}

/// Builds a [`RequestConfig`].
#[must_use]
#[derive(Clone, Debug)]
pub struct RequestConfigBuilder {
    config: RequestConfig,
}

impl RequestConfigBuilder {
    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the socket (read) timeout.
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_timeout = Some(timeout);
        self
    }

    /// Set how long to wait for a pooled connection.
    pub fn connection_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_request_timeout = Some(timeout);
        self
    }

    /// Enable or disable following redirects. Default is enabled.
    pub fn redirects_enabled(mut self, enabled: bool) -> Self {
        self.config.redirects_enabled = enabled;
        self
    }

    /// Set the maximum number of redirects. Default is 50.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Accept or reject relative `Location` headers. Default is accept.
    pub fn relative_redirects_allowed(mut self, allowed: bool) -> Self {
        self.config.relative_redirects_allowed = allowed;
        self
    }

    /// Allow redirects to revisit a location. Default is false.
    pub fn circular_redirects_allowed(mut self, allowed: bool) -> Self {
        self.config.circular_redirects_allowed = allowed;
        self
    }

    /// Enable or disable answering auth challenges. Default is enabled.
    pub fn authentication_enabled(mut self, enabled: bool) -> Self {
        self.config.authentication_enabled = enabled;
        self
    }

    /// Check pooled connections for staleness when leased. Default is false.
    pub fn stale_connection_check(mut self, enabled: bool) -> Self {
        self.config.stale_connection_check = enabled;
        self
    }

    /// Prefer these auth schemes, in order, when a target challenges.
    pub fn target_preferred_auth_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.target_preferred_auth_schemes = Some(lower(schemes));
        self
    }

    /// Prefer these auth schemes, in order, when a proxy challenges.
    pub fn proxy_preferred_auth_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.proxy_preferred_auth_schemes = Some(lower(schemes));
        self
    }

    /// Bind connections to a local address.
    pub fn local_address(mut self, addr: IpAddr) -> Self {
        self.config.local_address = Some(addr);
        self
    }

    /// Send the request through `proxy`, ignoring the client's proxy rules.
    pub fn proxy(mut self, proxy: HttpHost) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Finish the config.
    pub fn build(self) -> RequestConfig {
        self.config
    }
}

fn lower<I, S>(schemes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    schemes
        .into_iter()
        .map(|s| s.into().to_ascii_lowercase())
        .collect()
}
