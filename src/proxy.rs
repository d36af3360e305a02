use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::host::HttpHost;
use crate::into_url::IntoUrl;

/// Configuration of a proxy that a `HttpClient` should pass requests to.
///
/// A `Proxy` has a couple pieces to it:
///
/// - the host of the proxy
/// - rules on what requests should be directed to the proxy
///
/// For instance, let's look at `Proxy::http`:
///
/// ```
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let proxy = ferry::Proxy::http("http://proxy.example:3128")?;
/// # Ok(())
/// # }
/// ```
///
/// This proxy will intercept all HTTP requests, and make use of the proxy
/// at `proxy.example:3128`. A request to `http://origin.example` will talk to
/// your proxy. A request to `https://origin.example` will not.
///
/// Multiple `Proxy` rules can be configured for a client. The route planner
/// checks each `Proxy` in the order it was added. This could mean that a
/// `Proxy` added first with eager intercept rules, such as `Proxy::all`,
/// would prevent a `Proxy` later in the list from ever working, so take care.
#[derive(Clone, Debug)]
pub struct Proxy {
    intercept: Intercept,
}

impl Proxy {
    /// Proxy all HTTP traffic to the passed URL.
    pub fn http<U: IntoUrl>(url: U) -> crate::Result<Proxy> {
        Ok(Proxy::new(Intercept::Http(proxy_host(url)?)))
    }

    /// Proxy all HTTPS traffic to the passed URL.
    ///
    /// HTTPS requests are tunnelled through the proxy with `CONNECT`.
    pub fn https<U: IntoUrl>(url: U) -> crate::Result<Proxy> {
        Ok(Proxy::new(Intercept::Https(proxy_host(url)?)))
    }

    /// Proxy **all** traffic to the passed URL.
    pub fn all<U: IntoUrl>(url: U) -> crate::Result<Proxy> {
        Ok(Proxy::new(Intercept::All(proxy_host(url)?)))
    }

    /// Provide a custom function to determine what traffic to proxy to where.
    ///
    /// # Example
    ///
    /// ```
    /// # fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let target = url::Url::parse("http://my.prox:3128")?;
    /// let proxy = ferry::Proxy::custom(move |url| {
    ///     if url.host_str() == Some("origin.example") {
    ///         Some(target.clone())
    ///     } else {
    ///         None
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn custom<F>(fun: F) -> Proxy
    where
        F: Fn(&Url) -> Option<Url> + Send + Sync + 'static,
    {
        Proxy::new(Intercept::Custom(Custom(Arc::new(fun))))
    }

    fn new(intercept: Intercept) -> Proxy {
        Proxy { intercept }
    }

    /// The proxy to use for `target`, if this rule intercepts it.
    pub(crate) fn intercept(&self, target: &HttpHost) -> Option<HttpHost> {
        match self.intercept {
            Intercept::All(ref proxy) => Some(proxy.clone()),
            Intercept::Http(ref proxy) => (target.scheme() == "http").then(|| proxy.clone()),
            Intercept::Https(ref proxy) => (target.scheme() == "https").then(|| proxy.clone()),
            Intercept::Custom(ref fun) => {
                let url = Url::parse(&target.to_uri_prefix()).ok()?;
                let proxy = (fun.0)(&url)?;
                HttpHost::from_uri(&proxy.as_str().parse().ok()?)
            }
        }
    }
}

fn proxy_host<U: IntoUrl>(url: U) -> crate::Result<HttpHost> {
    let url = url.into_url()?;
    let host = url
        .host_str()
        .ok_or_else(|| crate::error::builder("proxy URL has no host"))?;
    Ok(HttpHost::new(url.scheme(), host, url.port()))
}

#[derive(Clone, Debug)]
enum Intercept {
    All(HttpHost),
    Http(HttpHost),
    Https(HttpHost),
    Custom(Custom),
}

#[derive(Clone)]
struct Custom(Arc<dyn Fn(&Url) -> Option<Url> + Send + Sync + 'static>);

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("_")
    }
}

/// The first proxy any of `proxies` picks for `target`.
pub(crate) fn intercept(proxies: &[Proxy], target: &HttpHost) -> Option<HttpHost> {
    proxies.iter().find_map(|p| p.intercept(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(s: &str) -> HttpHost {
        s.parse().unwrap()
    }

    #[test]
    fn test_http() {
        let target = host("http://example.domain:3128");
        let p = Proxy::http("http://example.domain:3128").unwrap();

        let http = host("http://origin.example");
        let other = host("https://origin.example");

        assert_eq!(p.intercept(&http).unwrap(), target);
        assert!(p.intercept(&other).is_none());
    }

    #[test]
    fn test_https() {
        let target = host("http://example.domain:3128");
        let p = Proxy::https("http://example.domain:3128").unwrap();

        let http = host("http://origin.example");
        let other = host("https://origin.example");

        assert!(p.intercept(&http).is_none());
        assert_eq!(p.intercept(&other).unwrap(), target);
    }

    #[test]
    fn test_all() {
        let target = host("http://example.domain");
        let p = Proxy::all("http://example.domain").unwrap();

        let http = host("http://origin.example");
        let https = host("https://origin.example");
        let other = host("x-youve-never-heard-of-me-mr-proxy://origin.example");

        assert_eq!(p.intercept(&http).unwrap(), target);
        assert_eq!(p.intercept(&https).unwrap(), target);
        assert_eq!(p.intercept(&other).unwrap(), target);
    }

    #[test]
    fn test_custom() {
        let p = Proxy::custom(move |url| {
            if url.host_str() == Some("origin.example") {
                "http://example.domain:1".parse().ok()
            } else if url.scheme() == "http" {
                "http://example.domain:2".parse().ok()
            } else {
                None
            }
        });

        let http = host("http://other.example");
        let https = host("https://origin.example");
        let other = host("x-youve-never-heard-of-me-mr-proxy://other.example");

        assert_eq!(p.intercept(&http).unwrap().port(), Some(2));
        assert_eq!(p.intercept(&https).unwrap().port(), Some(1));
        assert!(p.intercept(&other).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let proxies = vec![
            Proxy::http("http://example.domain").unwrap(),
            Proxy::all("http://other.domain").unwrap(),
        ];

        let http = host("http://origin.example");
        let https = host("https://origin.example");

        assert_eq!(
            intercept(&proxies, &http).unwrap().hostname(),
            "example.domain"
        );
        assert_eq!(
            intercept(&proxies, &https).unwrap().hostname(),
            "other.domain"
        );
        assert!(intercept(&[], &http).is_none());
    }
}
