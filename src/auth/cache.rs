use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use super::AuthScheme;
use crate::host::{default_port, HttpHost};

/// Schemes that completed against a host, kept for preemptive use.
pub trait AuthCache: Send + Sync {
    /// Remember `scheme` for `host`.
    fn put(&self, host: &HttpHost, scheme: Box<dyn AuthScheme>);

    /// A copy of the scheme remembered for `host`.
    fn get(&self, host: &HttpHost) -> Option<Box<dyn AuthScheme>>;

    /// Forget the scheme of `host`.
    fn remove(&self, host: &HttpHost);

    /// Forget everything.
    fn clear(&self);
}

/// An in-memory [`AuthCache`].
///
/// Hosts without an explicit port are stored under the scheme's default
/// port, so `http://a` and `http://a:80` share an entry.
#[derive(Default)]
pub struct BasicAuthCache {
    map: Mutex<HashMap<HttpHost, Box<dyn AuthScheme>>>,
}

impl BasicAuthCache {
    /// An empty cache.
    pub fn new() -> BasicAuthCache {
        BasicAuthCache::default()
    }
}

fn key(host: &HttpHost) -> HttpHost {
    let port = host.port().or_else(|| default_port(host.scheme()));
    HttpHost::new(host.scheme(), host.hostname(), port)
}

impl AuthCache for BasicAuthCache {
    fn put(&self, host: &HttpHost, scheme: Box<dyn AuthScheme>) {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key(host), scheme);
    }

    fn get(&self, host: &HttpHost) -> Option<Box<dyn AuthScheme>> {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key(host))
            .map(|scheme| scheme.box_clone())
    }

    fn remove(&self, host: &HttpHost) {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key(host));
    }

    fn clear(&self) {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl fmt::Debug for BasicAuthCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_map()
            .entries(map.iter().map(|(host, scheme)| (host, scheme.name())))
            .finish()
    }
}
