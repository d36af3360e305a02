use std::convert::TryInto;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderMap, HeaderValue};
use http::{Request, Response};

use crate::auth::{
    AuthSchemeRegistry, AuthenticationStrategy, BasicAuthCache, BasicCredentialsProvider,
    CredentialsProvider, ProxyAuthenticationStrategy, TargetAuthenticationStrategy,
};
use crate::backoff::{BackoffManager, BackoffStrategy};
use crate::config::RequestConfig;
use crate::connect::{
    ConnectionConfig, ConnectionFactory, ConnectionManager, DefaultConnectionOperator,
    PoolingConnectionManager, SocketConfig, SocketFactoryRegistry,
};
use crate::context::ClientContext;
use crate::dns::Resolve;
use crate::error;
use crate::evict::IdleConnectionEvictor;
use crate::exec::{
    BackoffExec, ExecChain, MainExec, MinimalExec, ProtocolExec, RedirectExec, RetryExec,
    ServiceUnavailableRetryExec,
};
use crate::host::{HttpHost, SchemePortResolver};
use crate::interceptor::{
    HttpProcessor, RequestAuthCache, RequestClientConnControl, RequestDefaultHeaders,
    RequestInterceptor, RequestTargetHost, RequestUserAgent, ResponseInterceptor,
};
use crate::into_url::try_url;
use crate::pool::ConnPoolControl;
use crate::proxy::Proxy;
use crate::redirect::{DefaultRedirectStrategy, RedirectStrategy};
use crate::retry::{DefaultRetryHandler, RetryHandler, ServiceUnavailableRetryStrategy};
use crate::route::{DefaultRoutePlanner, RoutePlanner};
use crate::strategy::{
    ConnectionReuseStrategy, DefaultConnectionReuseStrategy, DefaultKeepAliveStrategy,
    DefaultUserTokenHandler, KeepAliveStrategy, UserTokenHandler,
};
use crate::Body;

static DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// An HTTP client executing requests through the execution chain.
///
/// The `HttpClient` holds a connection pool internally, so it is advised
/// that you create one and **reuse** it. Cloning is cheap; clones share the
/// pool.
///
/// # Examples
///
/// ```no_run
/// # async fn run(factory: std::sync::Arc<dyn ferry::connect::ConnectionFactory>) -> ferry::Result<()> {
/// let client = ferry::HttpClient::builder()
///     .connection_factory(factory)
///     .max_per_route(4)
///     .build()?;
///
/// let mut req = http::Request::new(ferry::Body::empty());
/// *req.uri_mut() = http::Uri::from_static("http://example.com/");
/// let res = client.execute(req).await?;
/// let body = res.into_body().bytes().await?;
/// # drop(body);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientRef>,
}

struct ClientRef {
    chain: Box<dyn ExecChain>,
    planner: Arc<dyn RoutePlanner>,
    manager: Arc<dyn ConnectionManager>,
    default_config: RequestConfig,
    credentials_provider: Arc<dyn CredentialsProvider>,
    auth_scheme_registry: Arc<AuthSchemeRegistry>,
    auth_caching: bool,
    evictor: Option<IdleConnectionEvictor>,
}

/// A `HttpClientBuilder` can be used to create a `HttpClient` with custom
/// configuration.
///
/// Every connection is created by a [`ConnectionFactory`], which owns the
/// HTTP/1.1 message framing. Either a factory or a complete
/// [`ConnectionManager`] must be given.
#[must_use]
pub struct HttpClientBuilder {
    config: Config,
}

struct Config {
    error: Option<crate::Error>,
    connection_manager: Option<Arc<dyn ConnectionManager>>,
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
    connection_config: ConnectionConfig,
    max_total: Option<usize>,
    max_per_route: Option<usize>,
    time_to_live: Option<Duration>,
    validate_after_inactivity: Option<Duration>,
    socket_config: Option<SocketConfig>,
    socket_factory_registry: Option<SocketFactoryRegistry>,
    resolver: Option<Arc<dyn Resolve>>,
    port_resolver: Option<Arc<dyn SchemePortResolver>>,
    route_planner: Option<Arc<dyn RoutePlanner>>,
    proxies: Vec<Proxy>,
    default_request_config: RequestConfig,
    default_headers: HeaderMap,
    user_agent: HeaderValue,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    credentials_provider: Option<Arc<dyn CredentialsProvider>>,
    auth_scheme_registry: Option<Arc<AuthSchemeRegistry>>,
    target_auth_strategy: Arc<dyn AuthenticationStrategy>,
    proxy_auth_strategy: Arc<dyn AuthenticationStrategy>,
    retry_handler: Option<Arc<dyn RetryHandler>>,
    automatic_retries: bool,
    redirect_strategy: Option<Arc<dyn RedirectStrategy>>,
    redirect_handling: bool,
    service_unavailable_strategy: Option<Arc<dyn ServiceUnavailableRetryStrategy>>,
    backoff_strategy: Option<Arc<dyn BackoffStrategy>>,
    backoff_manager: Option<Arc<dyn BackoffManager>>,
    reuse_strategy: Arc<dyn ConnectionReuseStrategy>,
    keep_alive_strategy: Arc<dyn KeepAliveStrategy>,
    user_token_handler: Arc<dyn UserTokenHandler>,
    auth_caching: bool,
    evict_expired: bool,
    evict_idle: Option<Duration>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientBuilder {
    /// Constructs a new `HttpClientBuilder`.
    ///
    /// This is the same as `HttpClient::builder()`.
    pub fn new() -> HttpClientBuilder {
        HttpClientBuilder {
            config: Config {
                error: None,
                connection_manager: None,
                connection_factory: None,
                connection_config: ConnectionConfig::default(),
                max_total: None,
                max_per_route: None,
                time_to_live: None,
                validate_after_inactivity: None,
                socket_config: None,
                socket_factory_registry: None,
                resolver: None,
                port_resolver: None,
                route_planner: None,
                proxies: Vec::new(),
                default_request_config: RequestConfig::default(),
                default_headers: HeaderMap::new(),
                user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
                request_interceptors: Vec::new(),
                response_interceptors: Vec::new(),
                credentials_provider: None,
                auth_scheme_registry: None,
                target_auth_strategy: Arc::new(TargetAuthenticationStrategy),
                proxy_auth_strategy: Arc::new(ProxyAuthenticationStrategy),
                retry_handler: None,
                automatic_retries: true,
                redirect_strategy: None,
                redirect_handling: true,
                service_unavailable_strategy: None,
                backoff_strategy: None,
                backoff_manager: None,
                reuse_strategy: Arc::new(DefaultConnectionReuseStrategy),
                keep_alive_strategy: Arc::new(DefaultKeepAliveStrategy),
                user_token_handler: Arc::new(DefaultUserTokenHandler),
                auth_caching: true,
                evict_expired: false,
                evict_idle: None,
            },
        }
    }

    /// Returns a `HttpClient` that uses this `HttpClientBuilder`
    /// configuration.
    ///
    /// # Errors
    ///
    /// This method fails if neither a connection factory nor a connection
    /// manager was given, if a setter was given an invalid value, or if
    /// connection eviction was asked for outside a tokio runtime.
    pub fn build(self) -> crate::Result<HttpClient> {
        let mut config = self.config;
        if let Some(err) = config.error.take() {
            return Err(err);
        }
        let manager = config.connection_manager()?;
        let planner = config.route_planner();

        let mut proxy_processor = HttpProcessor::new()
            .add_request_interceptor(RequestClientConnControl)
            .add_request_interceptor(RequestUserAgent::new(config.user_agent.clone()));
        for interceptor in &config.request_interceptors {
            proxy_processor.push_request(interceptor.clone());
        }

        let mut processor = HttpProcessor::new();
        if !config.default_headers.is_empty() {
            processor.push_request(Arc::new(RequestDefaultHeaders::new(
                config.default_headers.clone(),
            )));
        }
        processor = processor
            .add_request_interceptor(RequestTargetHost)
            .add_request_interceptor(RequestClientConnControl)
            .add_request_interceptor(RequestUserAgent::new(config.user_agent.clone()));
        if config.auth_caching {
            processor = processor.add_request_interceptor(RequestAuthCache);
        }
        for interceptor in config.request_interceptors.drain(..) {
            processor.push_request(interceptor);
        }
        for interceptor in config.response_interceptors.drain(..) {
            processor.push_response(interceptor);
        }

        let mut chain: Box<dyn ExecChain> = Box::new(MainExec::new(
            manager.clone(),
            config.reuse_strategy.clone(),
            config.keep_alive_strategy.clone(),
            Some(proxy_processor),
            config.target_auth_strategy.clone(),
            config.proxy_auth_strategy.clone(),
            config.user_token_handler.clone(),
        ));
        chain = Box::new(ProtocolExec::new(chain, processor));
        if let Some(strategy) = config.service_unavailable_strategy.take() {
            chain = Box::new(ServiceUnavailableRetryExec::new(chain, strategy));
        }
        if let (Some(strategy), Some(backoff)) =
            (config.backoff_strategy.take(), config.backoff_manager.take())
        {
            chain = Box::new(BackoffExec::new(chain, strategy, backoff));
        }
        if config.redirect_handling {
            let strategy = config
                .redirect_strategy
                .take()
                .unwrap_or_else(|| Arc::new(DefaultRedirectStrategy::new()));
            chain = Box::new(RedirectExec::new(chain, planner.clone(), strategy));
        }
        if config.automatic_retries {
            let handler = config
                .retry_handler
                .take()
                .unwrap_or_else(|| Arc::new(DefaultRetryHandler::default()));
            chain = Box::new(RetryExec::new(chain, handler));
        }

        config.finish(chain, planner, manager)
    }

    /// Returns a `HttpClient` that only executes requests over direct
    /// routes, without authentication, redirect handling, retries or
    /// tunnelling.
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`build`](HttpClientBuilder::build).
    pub fn build_minimal(self) -> crate::Result<HttpClient> {
        let mut config = self.config;
        if let Some(err) = config.error.take() {
            return Err(err);
        }
        let manager = config.connection_manager()?;
        config.proxies.clear();
        let planner = config.route_planner();

        let mut processor = HttpProcessor::new();
        if !config.default_headers.is_empty() {
            processor.push_request(Arc::new(RequestDefaultHeaders::new(
                config.default_headers.clone(),
            )));
        }
        processor = processor
            .add_request_interceptor(RequestTargetHost)
            .add_request_interceptor(RequestClientConnControl)
            .add_request_interceptor(RequestUserAgent::new(config.user_agent.clone()));
        for interceptor in config.request_interceptors.drain(..) {
            processor.push_request(interceptor);
        }
        for interceptor in config.response_interceptors.drain(..) {
            processor.push_response(interceptor);
        }
        config.auth_caching = false;

        let chain = Box::new(MinimalExec::new(
            manager.clone(),
            config.reuse_strategy.clone(),
            config.keep_alive_strategy.clone(),
            processor,
        ));
        config.finish(chain, planner, manager)
    }

    // Connections

    /// Create connections with `factory`.
    pub fn connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> HttpClientBuilder {
        self.config.connection_factory = Some(factory);
        self
    }

    /// Use `manager` for all connections.
    ///
    /// The pool settings of this builder do not apply to a given manager.
    pub fn connection_manager(mut self, manager: Arc<dyn ConnectionManager>) -> HttpClientBuilder {
        self.config.connection_manager = Some(manager);
        self
    }

    /// Set the buffer and message limits of new connections.
    pub fn connection_config(mut self, config: ConnectionConfig) -> HttpClientBuilder {
        self.config.connection_config = config;
        self
    }

    /// Cap the number of connections in total. Default is 20.
    pub fn max_total(mut self, max: usize) -> HttpClientBuilder {
        self.config.max_total = Some(max);
        self
    }

    /// Cap the number of connections per route. Default is 2.
    pub fn max_per_route(mut self, max: usize) -> HttpClientBuilder {
        self.config.max_per_route = Some(max);
        self
    }

    /// Close connections older than `ttl`.
    pub fn time_to_live(mut self, ttl: Duration) -> HttpClientBuilder {
        self.config.time_to_live = Some(ttl);
        self
    }

    /// Check pooled connections idle longer than `period` before reusing
    /// them.
    pub fn validate_after_inactivity(mut self, period: Duration) -> HttpClientBuilder {
        self.config.validate_after_inactivity = Some(period);
        self
    }

    /// Set the socket config of new connections.
    pub fn default_socket_config(mut self, config: SocketConfig) -> HttpClientBuilder {
        self.config.socket_config = Some(config);
        self
    }

    /// Open transports with the socket factories of `registry`.
    pub fn socket_factory_registry(mut self, registry: SocketFactoryRegistry) -> HttpClientBuilder {
        self.config.socket_factory_registry = Some(registry);
        self
    }

    /// Resolve host names with `resolver`.
    pub fn resolver(mut self, resolver: Arc<dyn Resolve>) -> HttpClientBuilder {
        self.config.resolver = Some(resolver);
        self
    }

    /// Fill in missing ports with `resolver`.
    pub fn scheme_port_resolver(mut self, resolver: Arc<dyn SchemePortResolver>) -> HttpClientBuilder {
        self.config.port_resolver = Some(resolver);
        self
    }

    /// Evict expired connections in the background.
    pub fn evict_expired_connections(mut self) -> HttpClientBuilder {
        self.config.evict_expired = true;
        self
    }

    /// Evict connections idle longer than `max_idle` in the background.
    pub fn evict_idle_connections(mut self, max_idle: Duration) -> HttpClientBuilder {
        self.config.evict_idle = Some(max_idle);
        self
    }

    // Routing

    /// Plan routes with `planner` instead of the proxy rules.
    pub fn route_planner(mut self, planner: Arc<dyn RoutePlanner>) -> HttpClientBuilder {
        self.config.route_planner = Some(planner);
        self
    }

    /// Add a `Proxy` to the list of proxies the client will use.
    ///
    /// Proxies are consulted in the order they were added.
    pub fn proxy(mut self, proxy: Proxy) -> HttpClientBuilder {
        self.config.proxies.push(proxy);
        self
    }

    // Requests

    /// Use `config` for requests that carry no config of their own.
    pub fn default_request_config(mut self, config: RequestConfig) -> HttpClientBuilder {
        self.config.default_request_config = config;
        self
    }

    /// Sets the default headers for every request.
    pub fn default_headers(mut self, headers: HeaderMap) -> HttpClientBuilder {
        for (key, value) in headers.iter() {
            self.config.default_headers.insert(key, value.clone());
        }
        self
    }

    /// Sets the `User-Agent` header to be used by this client.
    pub fn user_agent<V>(mut self, value: V) -> HttpClientBuilder
    where
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        match value.try_into() {
            Ok(value) => self.config.user_agent = value,
            Err(e) => self.config.error = Some(error::builder(e.into())),
        }
        self
    }

    /// Run `interceptor` on every request, after the built-in ones.
    pub fn request_interceptor<I>(mut self, interceptor: I) -> HttpClientBuilder
    where
        I: RequestInterceptor + 'static,
    {
        self.config.request_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Run `interceptor` on every response.
    pub fn response_interceptor<I>(mut self, interceptor: I) -> HttpClientBuilder
    where
        I: ResponseInterceptor + 'static,
    {
        self.config.response_interceptors.push(Arc::new(interceptor));
        self
    }

    // Authentication

    /// Look credentials up in `provider` for contexts without their own.
    pub fn credentials_provider(mut self, provider: Arc<dyn CredentialsProvider>) -> HttpClientBuilder {
        self.config.credentials_provider = Some(provider);
        self
    }

    /// Create auth schemes from `registry` for contexts without their own.
    pub fn auth_scheme_registry(mut self, registry: AuthSchemeRegistry) -> HttpClientBuilder {
        self.config.auth_scheme_registry = Some(Arc::new(registry));
        self
    }

    /// Answer target challenges with `strategy`.
    pub fn target_authentication_strategy(
        mut self,
        strategy: Arc<dyn AuthenticationStrategy>,
    ) -> HttpClientBuilder {
        self.config.target_auth_strategy = strategy;
        self
    }

    /// Answer proxy challenges with `strategy`.
    pub fn proxy_authentication_strategy(
        mut self,
        strategy: Arc<dyn AuthenticationStrategy>,
    ) -> HttpClientBuilder {
        self.config.proxy_auth_strategy = strategy;
        self
    }

    /// Do not answer challenges preemptively from schemes that completed
    /// before.
    pub fn disable_auth_caching(mut self) -> HttpClientBuilder {
        self.config.auth_caching = false;
        self
    }

    // Retries and redirects

    /// Decide retries after I/O errors with `handler`.
    pub fn retry_handler(mut self, handler: Arc<dyn RetryHandler>) -> HttpClientBuilder {
        self.config.retry_handler = Some(handler);
        self
    }

    /// Never retry after I/O errors.
    pub fn disable_automatic_retries(mut self) -> HttpClientBuilder {
        self.config.automatic_retries = false;
        self
    }

    /// Follow redirects as `strategy` decides.
    pub fn redirect_strategy(mut self, strategy: Arc<dyn RedirectStrategy>) -> HttpClientBuilder {
        self.config.redirect_strategy = Some(strategy);
        self
    }

    /// Never follow redirects.
    pub fn disable_redirect_handling(mut self) -> HttpClientBuilder {
        self.config.redirect_handling = false;
        self
    }

    /// Send requests again when `strategy` says the service was
    /// unavailable.
    pub fn service_unavailable_retry_strategy(
        mut self,
        strategy: Arc<dyn ServiceUnavailableRetryStrategy>,
    ) -> HttpClientBuilder {
        self.config.service_unavailable_strategy = Some(strategy);
        self
    }

    /// Report overload, as `strategy` detects it, to `manager`.
    pub fn backoff(
        mut self,
        strategy: Arc<dyn BackoffStrategy>,
        manager: Arc<dyn BackoffManager>,
    ) -> HttpClientBuilder {
        self.config.backoff_strategy = Some(strategy);
        self.config.backoff_manager = Some(manager);
        self
    }

    // Connection reuse

    /// Decide whether connections are kept with `strategy`.
    pub fn connection_reuse_strategy(
        mut self,
        strategy: Arc<dyn ConnectionReuseStrategy>,
    ) -> HttpClientBuilder {
        self.config.reuse_strategy = strategy;
        self
    }

    /// Decide how long kept connections stay valid with `strategy`.
    pub fn keep_alive_strategy(mut self, strategy: Arc<dyn KeepAliveStrategy>) -> HttpClientBuilder {
        self.config.keep_alive_strategy = strategy;
        self
    }

    /// Bind connections to the user tokens `handler` derives.
    pub fn user_token_handler(mut self, handler: Arc<dyn UserTokenHandler>) -> HttpClientBuilder {
        self.config.user_token_handler = handler;
        self
    }
}

impl Config {
    fn connection_manager(&mut self) -> crate::Result<Arc<dyn ConnectionManager>> {
        if let Some(manager) = self.connection_manager.take() {
            return Ok(manager);
        }
        let factory = self.connection_factory.take().ok_or_else(|| {
            error::builder("a connection factory or a connection manager is required")
        })?;
        let mut operator =
            DefaultConnectionOperator::new(self.socket_factory_registry.take().unwrap_or_default());
        if let Some(resolver) = self.resolver.take() {
            operator = operator.resolver(resolver);
        }
        if let Some(ref resolver) = self.port_resolver {
            operator = operator.port_resolver(resolver.clone());
        }
        let manager = PoolingConnectionManager::with_operator(
            factory,
            self.connection_config.clone(),
            Arc::new(operator),
        );
        if let Some(max) = self.max_total {
            manager.set_max_total(max);
        }
        if let Some(max) = self.max_per_route {
            manager.set_default_max_per_route(max);
        }
        if self.time_to_live.is_some() {
            manager.set_time_to_live(self.time_to_live);
        }
        if self.validate_after_inactivity.is_some() {
            manager.set_validate_after_inactivity(self.validate_after_inactivity);
        }
        if let Some(config) = self.socket_config.take() {
            manager.set_default_socket_config(config);
        }
        Ok(Arc::new(manager))
    }

    fn route_planner(&mut self) -> Arc<dyn RoutePlanner> {
        if let Some(planner) = self.route_planner.take() {
            return planner;
        }
        let mut planner = DefaultRoutePlanner::with_proxies(std::mem::take(&mut self.proxies));
        if let Some(ref resolver) = self.port_resolver {
            planner = planner.port_resolver(resolver.clone());
        }
        Arc::new(planner)
    }

    fn finish(
        self,
        chain: Box<dyn ExecChain>,
        planner: Arc<dyn RoutePlanner>,
        manager: Arc<dyn ConnectionManager>,
    ) -> crate::Result<HttpClient> {
        let evictor = if self.evict_expired || self.evict_idle.is_some() {
            let sleep_time = self.evict_idle.unwrap_or(Duration::from_secs(10));
            let evictor = IdleConnectionEvictor::new(manager.clone(), sleep_time, self.evict_idle);
            evictor.start()?;
            Some(evictor)
        } else {
            None
        };
        Ok(HttpClient {
            inner: Arc::new(ClientRef {
                chain,
                planner,
                manager,
                default_config: self.default_request_config,
                credentials_provider: self
                    .credentials_provider
                    .unwrap_or_else(|| Arc::new(BasicCredentialsProvider::new())),
                auth_scheme_registry: self
                    .auth_scheme_registry
                    .unwrap_or_else(|| Arc::new(AuthSchemeRegistry::default())),
                auth_caching: self.auth_caching,
                evictor,
            }),
        })
    }
}

impl HttpClient {
    /// Creates a `HttpClientBuilder` to configure a `HttpClient`.
    ///
    /// This is the same as `HttpClientBuilder::new()`.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Executes a `Request` in a fresh context.
    ///
    /// # Errors
    ///
    /// This method fails if the request URI is not absolute, if the route
    /// cannot be established, if an exchange fails after all retries, or
    /// if a redirect cannot be followed.
    pub async fn execute(&self, request: Request<Body>) -> crate::Result<Response<Body>> {
        let mut ctx = ClientContext::new();
        self.execute_with(request, &mut ctx).await
    }

    /// Executes a `Request` in `ctx`.
    ///
    /// Reusing a context keeps authentication state and connection
    /// affinity between requests. Fails like [`execute`](HttpClient::execute).
    pub async fn execute_with(
        &self,
        request: Request<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Response<Body>> {
        let url = try_url(request.uri());
        let target = match HttpHost::from_uri(request.uri()) {
            Some(target) if request.uri().scheme().is_some() => target,
            _ => {
                return Err(error::builder(format!(
                    "request URI must be absolute: {}",
                    request.uri()
                )))
            }
        };
        self.setup_context(&request, ctx);
        let route = self.inner.planner.determine_route(&target, &request, ctx)?;

        match self.inner.chain.execute(route, request, ctx).await {
            Ok(res) => Ok(res),
            Err(err) => match url {
                Some(url) if err.url().is_none() => Err(err.with_url(url)),
                _ => Err(err),
            },
        }
    }

    fn setup_context(&self, request: &Request<Body>, ctx: &mut ClientContext) {
        let ext = request.extensions();
        if ext.get::<RequestConfig>().is_some() || !ctx.has_request_config() {
            ctx.set_request_config(self.inner.default_config.fetch(ext).clone());
        }
        if ctx.credentials_provider().is_none() {
            ctx.set_credentials_provider(self.inner.credentials_provider.clone());
        }
        if ctx.auth_scheme_registry().is_none() {
            ctx.set_auth_scheme_registry(self.inner.auth_scheme_registry.clone());
        }
        if self.inner.auth_caching && ctx.auth_cache().is_none() {
            ctx.set_auth_cache(Arc::new(BasicAuthCache::new()));
        }
    }

    /// The connection manager of this client.
    pub fn connection_manager(&self) -> &Arc<dyn ConnectionManager> {
        &self.inner.manager
    }

    /// Stop eviction and close every connection.
    ///
    /// Requests executed afterwards fail with an error for which
    /// [`Error::is_shutdown`](crate::Error::is_shutdown) is true.
    pub fn shutdown(&self) {
        if let Some(ref evictor) = self.inner.evictor {
            evictor.shutdown();
        }
        self.inner.manager.shutdown();
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("default_config", &self.inner.default_config)
            .field("auth_caching", &self.inner.auth_caching)
            .field("evictor", &self.inner.evictor)
            .finish()
    }
}

impl fmt::Debug for HttpClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("proxies", &self.config.proxies)
            .field("default_request_config", &self.config.default_request_config)
            .field("default_headers", &self.config.default_headers)
            .field("user_agent", &self.config.user_agent)
            .finish()
    }
}
