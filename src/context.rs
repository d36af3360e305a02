//! Per-request execution state.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::{AuthCache, AuthSchemeRegistry, AuthState, ChallengeType, CredentialsProvider};
use crate::config::RequestConfig;
use crate::host::HttpHost;
use crate::route::HttpRoute;

/// The opaque identity a connection is bound to.
///
/// A pooled connection that carries a token is only handed to a request
/// whose context carries an equal token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserToken(String);

impl UserToken {
    /// A token from any string that identifies the user.
    pub fn new(id: impl Into<String>) -> UserToken {
        UserToken(id.into())
    }

    /// The identifying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The state of one logical session of requests.
///
/// A context carries authentication progress for the target and the proxy,
/// the user token connections are bound to, and the redirects followed so
/// far. Reusing a context for a sequence of requests keeps authentication
/// and connection affinity between them; concurrent requests should each
/// have their own.
pub struct ClientContext {
    request_config: Option<RequestConfig>,
    target_auth_state: AuthState,
    proxy_auth_state: AuthState,
    credentials_provider: Option<Arc<dyn CredentialsProvider>>,
    auth_cache: Option<Arc<dyn AuthCache>>,
    auth_scheme_registry: Option<Arc<AuthSchemeRegistry>>,
    user_token: Option<UserToken>,
    redirect_locations: Vec<Url>,
    request_sent: bool,
    target_host: Option<HttpHost>,
    route: Option<HttpRoute>,
    cancel: CancellationToken,
}

impl ClientContext {
    /// An empty context.
    pub fn new() -> ClientContext {
        ClientContext::with_cancellation(CancellationToken::new())
    }

    /// An empty context that is aborted when `token` is cancelled.
    pub fn with_cancellation(token: CancellationToken) -> ClientContext {
        ClientContext {
            request_config: None,
            target_auth_state: AuthState::new(),
            proxy_auth_state: AuthState::new(),
            credentials_provider: None,
            auth_cache: None,
            auth_scheme_registry: None,
            user_token: None,
            redirect_locations: Vec::new(),
            request_sent: false,
            target_host: None,
            route: None,
            cancel: token,
        }
    }

    /// The config in effect for the request being executed.
    pub fn request_config(&self) -> &RequestConfig {
        static DEFAULT: OnceLock<RequestConfig> = OnceLock::new();
        match self.request_config {
            Some(ref config) => config,
            None => DEFAULT.get_or_init(RequestConfig::default),
        }
    }

    /// Set the config for requests executed with this context.
    pub fn set_request_config(&mut self, config: RequestConfig) {
        self.request_config = Some(config);
    }

    pub(crate) fn has_request_config(&self) -> bool {
        self.request_config.is_some()
    }

    /// Authentication state against the target.
    pub fn target_auth_state(&self) -> &AuthState {
        &self.target_auth_state
    }

    /// Authentication state against the proxy.
    pub fn proxy_auth_state(&self) -> &AuthState {
        &self.proxy_auth_state
    }

    pub(crate) fn auth_state_mut(&mut self, kind: ChallengeType) -> &mut AuthState {
        match kind {
            ChallengeType::Target => &mut self.target_auth_state,
            ChallengeType::Proxy => &mut self.proxy_auth_state,
        }
    }

    /// Run `f` with the auth state of `kind` moved out of the context, so
    /// both can be used at once.
    pub(crate) fn with_auth_state<R>(
        &mut self,
        kind: ChallengeType,
        f: impl FnOnce(&mut AuthState, &mut ClientContext) -> R,
    ) -> R {
        let mut state = std::mem::take(self.auth_state_mut(kind));
        let out = f(&mut state, self);
        *self.auth_state_mut(kind) = state;
        out
    }

    /// The credentials provider.
    pub fn credentials_provider(&self) -> Option<&Arc<dyn CredentialsProvider>> {
        self.credentials_provider.as_ref()
    }

    /// Set the credentials provider.
    pub fn set_credentials_provider(&mut self, provider: Arc<dyn CredentialsProvider>) {
        self.credentials_provider = Some(provider);
    }

    /// The cache of completed auth schemes.
    pub fn auth_cache(&self) -> Option<&Arc<dyn AuthCache>> {
        self.auth_cache.as_ref()
    }

    /// Set the cache of completed auth schemes.
    pub fn set_auth_cache(&mut self, cache: Arc<dyn AuthCache>) {
        self.auth_cache = Some(cache);
    }

    /// The auth scheme registry.
    pub fn auth_scheme_registry(&self) -> Option<&Arc<AuthSchemeRegistry>> {
        self.auth_scheme_registry.as_ref()
    }

    /// Set the auth scheme registry.
    pub fn set_auth_scheme_registry(&mut self, registry: Arc<AuthSchemeRegistry>) {
        self.auth_scheme_registry = Some(registry);
    }

    /// The user token connections of this context are bound to.
    pub fn user_token(&self) -> Option<&UserToken> {
        self.user_token.as_ref()
    }

    /// Bind connections of this context to `token`.
    pub fn set_user_token(&mut self, token: UserToken) {
        self.user_token = Some(token);
    }

    /// The locations redirected to while executing the last request.
    pub fn redirect_locations(&self) -> &[Url] {
        &self.redirect_locations
    }

    pub(crate) fn redirect_locations_mut(&mut self) -> &mut Vec<Url> {
        &mut self.redirect_locations
    }

    /// Whether the request was written out completely on the last attempt.
    pub fn is_request_sent(&self) -> bool {
        self.request_sent
    }

    pub(crate) fn set_request_sent(&mut self, sent: bool) {
        self.request_sent = sent;
    }

    /// The effective target of the request being executed.
    pub fn target_host(&self) -> Option<&HttpHost> {
        self.target_host.as_ref()
    }

    pub(crate) fn set_target_host(&mut self, host: HttpHost) {
        self.target_host = Some(host);
    }

    /// The route of the request being executed.
    pub fn route(&self) -> Option<&HttpRoute> {
        self.route.as_ref()
    }

    pub(crate) fn set_route(&mut self, route: HttpRoute) {
        self.route = Some(route);
    }

    /// A handle that aborts whatever this context is executing.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            token: self.cancel.clone(),
        }
    }

    /// Returns true once the context was aborted.
    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for ClientContext {
    fn default() -> ClientContext {
        ClientContext::new()
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("target_auth_state", &self.target_auth_state.state())
            .field("proxy_auth_state", &self.proxy_auth_state.state())
            .field("user_token", &self.user_token)
            .field("route", &self.route)
            .field("aborted", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Aborts an executing request.
///
/// Aborting shuts the connection down without draining it. It can be done
/// from any thread, any number of times.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    /// Abort.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Returns true once aborted.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}
