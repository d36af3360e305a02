//! Request and response interceptors.
//!
//! The protocol stage runs every request through the client's request
//! interceptors after it rewrote the request target, and every response
//! through its response interceptors before handing it outward.

use std::fmt;
use std::sync::Arc;

use http::header::{HeaderMap, HeaderValue, CONNECTION, HOST, USER_AGENT};
use http::{Method, Request, Response, Version};

use crate::auth::{AuthProtocolState, AuthScope, ChallengeType};
use crate::context::ClientContext;
use crate::host::{default_port, HttpHost};
use crate::route::RouteInfo;
use crate::Body;

const PROXY_CONNECTION: &str = "proxy-connection";

/// Looks at or changes a request before it is sent.
pub trait RequestInterceptor: Send + Sync {
    /// Process `request`.
    fn process(&self, request: &mut Request<Body>, ctx: &mut ClientContext) -> crate::Result<()>;
}

/// Looks at or changes a response before it is returned.
pub trait ResponseInterceptor: Send + Sync {
    /// Process `response`.
    fn process(&self, response: &mut Response<Body>, ctx: &mut ClientContext)
        -> crate::Result<()>;
}

/// Runs interceptors in the order they were added.
#[derive(Clone, Default)]
pub struct HttpProcessor {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
}

impl HttpProcessor {
    /// A processor without interceptors.
    pub fn new() -> HttpProcessor {
        HttpProcessor::default()
    }

    /// Append a request interceptor.
    pub fn add_request_interceptor<I>(mut self, interceptor: I) -> HttpProcessor
    where
        I: RequestInterceptor + 'static,
    {
        self.request.push(Arc::new(interceptor));
        self
    }

    /// Append a response interceptor.
    pub fn add_response_interceptor<I>(mut self, interceptor: I) -> HttpProcessor
    where
        I: ResponseInterceptor + 'static,
    {
        self.response.push(Arc::new(interceptor));
        self
    }

    pub(crate) fn push_request(&mut self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request.push(interceptor);
    }

    pub(crate) fn push_response(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response.push(interceptor);
    }

    /// Run the request interceptors; the first error stops the run.
    pub fn process_request(
        &self,
        request: &mut Request<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<()> {
        for interceptor in &self.request {
            interceptor.process(request, ctx)?;
        }
        Ok(())
    }

    /// Run the response interceptors; the first error stops the run.
    pub fn process_response(
        &self,
        response: &mut Response<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<()> {
        for interceptor in &self.response {
            interceptor.process(response, ctx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HttpProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProcessor")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .finish()
    }
}

/// Adds default headers the request does not set itself.
#[derive(Clone, Debug, Default)]
pub struct RequestDefaultHeaders {
    headers: HeaderMap,
}

impl RequestDefaultHeaders {
    /// Add `headers` to every request.
    pub fn new(headers: HeaderMap) -> RequestDefaultHeaders {
        RequestDefaultHeaders { headers }
    }
}

impl RequestInterceptor for RequestDefaultHeaders {
    fn process(&self, request: &mut Request<Body>, _ctx: &mut ClientContext) -> crate::Result<()> {
        if request.method() == Method::CONNECT {
            return Ok(());
        }
        let headers = request.headers_mut();
        for name in self.headers.keys() {
            if !headers.contains_key(name) {
                for value in self.headers.get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

/// Sets the `Host` header from the target host.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestTargetHost;

impl RequestInterceptor for RequestTargetHost {
    fn process(&self, request: &mut Request<Body>, ctx: &mut ClientContext) -> crate::Result<()> {
        if request.headers().contains_key(HOST) {
            return Ok(());
        }
        if request.method() == Method::CONNECT && request.version() < Version::HTTP_11 {
            return Ok(());
        }
        let target = ctx
            .target_host()
            .or_else(|| ctx.route().map(|route| route.target_host()))
            .ok_or_else(|| crate::error::protocol("target host missing"))?;
        let value = HeaderValue::from_str(&target.to_host_string()).map_err(crate::error::builder)?;
        request.headers_mut().insert(HOST, value);
        Ok(())
    }
}

/// Sets a `User-Agent` unless the request has one.
#[derive(Clone, Debug)]
pub struct RequestUserAgent {
    user_agent: HeaderValue,
}

impl RequestUserAgent {
    /// Send `user_agent`.
    pub fn new(user_agent: HeaderValue) -> RequestUserAgent {
        RequestUserAgent { user_agent }
    }
}

impl RequestInterceptor for RequestUserAgent {
    fn process(&self, request: &mut Request<Body>, _ctx: &mut ClientContext) -> crate::Result<()> {
        if !request.headers().contains_key(USER_AGENT) {
            request
                .headers_mut()
                .insert(USER_AGENT, self.user_agent.clone());
        }
        Ok(())
    }
}

/// Asks the next hop to keep the connection alive.
///
/// Direct and tunnelled routes get `Connection: Keep-Alive`; a plain
/// proxied route and `CONNECT` requests get `Proxy-Connection: Keep-Alive`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestClientConnControl;

impl RequestInterceptor for RequestClientConnControl {
    fn process(&self, request: &mut Request<Body>, ctx: &mut ClientContext) -> crate::Result<()> {
        if request.method() == Method::CONNECT {
            request
                .headers_mut()
                .insert(PROXY_CONNECTION, HeaderValue::from_static("Keep-Alive"));
            return Ok(());
        }
        let route = match ctx.route() {
            Some(route) => route,
            None => {
                log::debug!("connection route not set in the context");
                return Ok(());
            }
        };
        let headers = request.headers_mut();
        if route.hop_count() == 1 || route.is_tunnelled() {
            if !headers.contains_key(CONNECTION) {
                headers.insert(CONNECTION, HeaderValue::from_static("Keep-Alive"));
            }
        } else if route.hop_count() == 2 && !headers.contains_key(PROXY_CONNECTION) {
            headers.insert(PROXY_CONNECTION, HeaderValue::from_static("Keep-Alive"));
        }
        Ok(())
    }
}

/// Answers challenges before they are issued, from the auth cache.
///
/// An unchallenged target or proxy whose scheme was cached, and for which
/// the credentials provider still has credentials, is primed with that
/// scheme so the first request already carries its answer.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestAuthCache;

impl RequestAuthCache {
    fn preempt(kind: ChallengeType, host: &HttpHost, ctx: &mut ClientContext) {
        let (cache, provider) = match (ctx.auth_cache(), ctx.credentials_provider()) {
            (Some(cache), Some(provider)) => (cache.clone(), provider.clone()),
            _ => return,
        };
        if ctx.auth_state_mut(kind).state() != AuthProtocolState::Unchallenged {
            return;
        }
        let scheme = match cache.get(host) {
            Some(scheme) => scheme,
            None => return,
        };
        let mut scope = AuthScope::for_host(host).scheme(scheme.name());
        if let Some(realm) = scheme.realm() {
            scope = scope.realm(realm);
        }
        match provider.credentials(&scope) {
            Some(credentials) => {
                log::debug!("re-using cached '{}' auth scheme for {host}", scheme.name());
                let state = ctx.auth_state_mut(kind);
                state.update(scheme, credentials);
                state.set_state(AuthProtocolState::Success);
            }
            None => log::debug!("no credentials for preemptive {} authentication", scheme.name()),
        }
    }
}

impl RequestInterceptor for RequestAuthCache {
    fn process(&self, _request: &mut Request<Body>, ctx: &mut ClientContext) -> crate::Result<()> {
        let route = match ctx.route() {
            Some(route) => route.clone(),
            None => {
                log::debug!("connection route not set in the context");
                return Ok(());
            }
        };
        let target = ctx
            .target_host()
            .cloned()
            .unwrap_or_else(|| route.target_host().clone());
        let target = match target.port() {
            Some(_) => target,
            None => match route.target_host().port().or_else(|| default_port(target.scheme())) {
                Some(port) => target.with_port(port),
                None => target,
            },
        };
        RequestAuthCache::preempt(ChallengeType::Target, &target, ctx);
        if let Some(proxy) = route.proxy_host() {
            RequestAuthCache::preempt(ChallengeType::Proxy, proxy, ctx);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::header::ACCEPT;

    use super::*;
    use crate::auth::{
        AuthCache, AuthScheme, BasicAuthCache, BasicCredentialsProvider, BasicScheme, Credentials,
        CredentialsProvider,
    };
    use crate::route::HttpRoute;

    fn request(method: Method) -> Request<Body> {
        let mut req = Request::new(Body::empty());
        *req.method_mut() = method;
        req
    }

    fn target() -> HttpHost {
        HttpHost::http("example.test", None)
    }

    fn proxy() -> HttpHost {
        HttpHost::http("proxy.test", Some(3128))
    }

    #[test]
    fn default_headers_do_not_override() {
        let mut defaults = HeaderMap::new();
        defaults.insert(ACCEPT, HeaderValue::from_static("*/*"));
        defaults.insert("x-one", HeaderValue::from_static("1"));
        let interceptor = RequestDefaultHeaders::new(defaults);

        let mut ctx = ClientContext::new();
        let mut req = request(Method::GET);
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("text/html"));
        interceptor.process(&mut req, &mut ctx).unwrap();
        assert_eq!(req.headers()[ACCEPT], "text/html");
        assert_eq!(req.headers()["x-one"], "1");

        let mut connect = request(Method::CONNECT);
        interceptor.process(&mut connect, &mut ctx).unwrap();
        assert!(connect.headers().is_empty());
    }

    #[test]
    fn target_host_header() {
        let mut ctx = ClientContext::new();
        let mut req = request(Method::GET);
        let err = RequestTargetHost.process(&mut req, &mut ctx).unwrap_err();
        assert!(err.is_protocol());

        ctx.set_target_host(HttpHost::http("example.test", Some(8080)));
        RequestTargetHost.process(&mut req, &mut ctx).unwrap();
        assert_eq!(req.headers()[HOST], "example.test:8080");

        ctx.set_target_host(target());
        RequestTargetHost.process(&mut req, &mut ctx).unwrap();
        assert_eq!(req.headers()[HOST], "example.test:8080");
    }

    #[test]
    fn user_agent() {
        let interceptor = RequestUserAgent::new(HeaderValue::from_static("ferry/test"));
        let mut ctx = ClientContext::new();
        let mut req = request(Method::GET);
        interceptor.process(&mut req, &mut ctx).unwrap();
        assert_eq!(req.headers()[USER_AGENT], "ferry/test");
    }

    #[test]
    fn conn_control_by_route() {
        let mut ctx = ClientContext::new();
        ctx.set_route(HttpRoute::direct(target(), None, false));
        let mut req = request(Method::GET);
        RequestClientConnControl.process(&mut req, &mut ctx).unwrap();
        assert_eq!(req.headers()[CONNECTION], "Keep-Alive");

        ctx.set_route(HttpRoute::proxied(target(), None, proxy(), false));
        let mut req = request(Method::GET);
        RequestClientConnControl.process(&mut req, &mut ctx).unwrap();
        assert!(req.headers().get(CONNECTION).is_none());
        assert_eq!(req.headers()[PROXY_CONNECTION], "Keep-Alive");

        let mut connect = request(Method::CONNECT);
        RequestClientConnControl
            .process(&mut connect, &mut ctx)
            .unwrap();
        assert_eq!(connect.headers()[PROXY_CONNECTION], "Keep-Alive");
    }

    #[test]
    fn auth_cache_primes_target() {
        let host = HttpHost::http("example.test", Some(80));
        let cache = Arc::new(BasicAuthCache::new());
        let mut scheme = BasicScheme::new();
        scheme
            .process_challenge(&crate::auth::AuthChallenge::new("Basic").with_param("realm", "r"))
            .unwrap();
        cache.put(&host, Box::new(scheme));
        let provider = Arc::new(BasicCredentialsProvider::new());
        provider.set_credentials(AuthScope::any(), Credentials::new("user", "pass"));

        let mut ctx = ClientContext::new();
        ctx.set_route(HttpRoute::direct(target(), None, false));
        ctx.set_target_host(target());
        RequestAuthCache.process(&mut request(Method::GET), &mut ctx).unwrap();
        assert_eq!(ctx.target_auth_state().state(), AuthProtocolState::Unchallenged);

        ctx.set_auth_cache(cache);
        ctx.set_credentials_provider(provider);
        RequestAuthCache.process(&mut request(Method::GET), &mut ctx).unwrap();
        let state = ctx.target_auth_state();
        assert_eq!(state.state(), AuthProtocolState::Success);
        assert_eq!(state.scheme().map(|s| s.name()), Some("basic"));
        assert_eq!(state.credentials().map(Credentials::username), Some("user"));
        assert_eq!(ctx.proxy_auth_state().state(), AuthProtocolState::Unchallenged);
    }
}
