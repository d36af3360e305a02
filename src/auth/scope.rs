use std::fmt;

use crate::host::{default_port, HttpHost};

/// The host, port, realm and scheme credentials apply to.
///
/// Any component can be a wildcard (`None`), matching everything. Host
/// names are compared case-insensitively, scheme names likewise.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AuthScope {
    host: Option<String>,
    port: Option<u16>,
    realm: Option<String>,
    scheme: Option<String>,
}

impl AuthScope {
    /// The scope that matches everything.
    pub fn any() -> AuthScope {
        AuthScope::default()
    }

    /// A scope for one host and port.
    pub fn new(host: &str, port: Option<u16>) -> AuthScope {
        AuthScope {
            host: Some(host.to_ascii_lowercase()),
            port,
            realm: None,
            scheme: None,
        }
    }

    /// A scope for a host, port and realm, and optionally scheme.
    pub fn with_realm(
        host: &str,
        port: Option<u16>,
        realm: Option<&str>,
        scheme: Option<&str>,
    ) -> AuthScope {
        AuthScope {
            host: Some(host.to_ascii_lowercase()),
            port,
            realm: realm.map(str::to_owned),
            scheme: scheme.map(str::to_ascii_lowercase),
        }
    }

    /// The scope of a host; a missing port becomes the scheme's default.
    pub fn for_host(host: &HttpHost) -> AuthScope {
        let port = host.port().or_else(|| default_port(host.scheme()));
        AuthScope::new(host.hostname(), port)
    }

    /// Restrict this scope to a realm.
    pub fn realm(mut self, realm: &str) -> AuthScope {
        self.realm = Some(realm.to_owned());
        self
    }

    /// Restrict this scope to an auth scheme.
    pub fn scheme(mut self, scheme: &str) -> AuthScope {
        self.scheme = Some(scheme.to_ascii_lowercase());
        self
    }

    /// The host name, if not a wildcard.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The port, if not a wildcard.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// How well `other` matches this scope.
    ///
    /// Each matching component adds its weight (scheme 1, realm 2, port 4,
    /// host 8). A component where both sides are concrete and differ
    /// disqualifies the match, returning -1. A wildcard on either side
    /// neither adds nor disqualifies.
    pub fn match_score(&self, other: &AuthScope) -> i32 {
        let mut score = 0;
        match component(&self.scheme, &other.scheme) {
            Some(true) => score += 1,
            Some(false) => return -1,
            None => {}
        }
        match component(&self.realm, &other.realm) {
            Some(true) => score += 2,
            Some(false) => return -1,
            None => {}
        }
        match component(&self.port, &other.port) {
            Some(true) => score += 4,
            Some(false) => return -1,
            None => {}
        }
        match component(&self.host, &other.host) {
            Some(true) => score += 8,
            Some(false) => return -1,
            None => {}
        }
        score
    }
}

// Some(equal) when both are concrete
fn component<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a == b),
        _ => None,
    }
}

impl fmt::Display for AuthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Some(ref scheme) => write!(f, "{} ", scheme.to_ascii_uppercase())?,
            None => f.write_str("<any auth scheme> ")?,
        }
        match self.realm {
            Some(ref realm) => write!(f, "'{realm}'")?,
            None => f.write_str("<any realm>")?,
        }
        match self.host {
            Some(ref host) => write!(f, "@{host}")?,
            None => f.write_str("@<any host>")?,
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights() {
        let full = AuthScope::with_realm("h", Some(80), Some("r"), Some("basic"));
        assert_eq!(full.match_score(&full), 15);
        assert_eq!(full.match_score(&AuthScope::any()), 0);
        assert_eq!(full.match_score(&AuthScope::new("h", None)), 8);
        assert_eq!(full.match_score(&AuthScope::new("h", Some(80))), 12);
        assert_eq!(full.match_score(&AuthScope::new("h", Some(80)).realm("r")), 14);
    }

    #[test]
    fn concrete_mismatch_disqualifies() {
        let scope = AuthScope::new("h", Some(80)).scheme("basic");
        assert_eq!(scope.match_score(&AuthScope::new("other", Some(80))), -1);
        assert_eq!(scope.match_score(&AuthScope::new("h", Some(81))), -1);
        assert_eq!(scope.match_score(&AuthScope::any().scheme("digest")), -1);
        assert_eq!(scope.match_score(&AuthScope::any().realm("x")), 0);
    }

    #[test]
    fn symmetric_and_monotonic() {
        let scopes = [
            AuthScope::any(),
            AuthScope::new("h", None),
            AuthScope::new("h", Some(80)),
            AuthScope::new("h", Some(80)).realm("r"),
            AuthScope::new("h", Some(80)).realm("r").scheme("basic"),
        ];
        let target = AuthScope::with_realm("h", Some(80), Some("r"), Some("basic"));
        let mut last = -1;
        for scope in &scopes {
            assert_eq!(scope.match_score(&target), target.match_score(scope));
            let score = target.match_score(scope);
            assert!(score > last);
            last = score;
        }
    }

    #[test]
    fn case_insensitive() {
        let a = AuthScope::new("Host.Test", Some(1)).scheme("Basic");
        let b = AuthScope::new("host.test", Some(1)).scheme("BASIC");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "BASIC <any realm>@host.test:1");
    }
}
