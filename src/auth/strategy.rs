use std::collections::VecDeque;

use http::Response;

use super::{AuthChallenge, AuthOption, AuthScheme, AuthScope, ChallengeType, MalformedChallenge};
use crate::context::ClientContext;
use crate::host::{default_port, HttpHost};
use crate::Body;

/// Decides how the challenges of a target or of a proxy are answered.
pub trait AuthenticationStrategy: Send + Sync {
    /// Whether this strategy handles target or proxy challenges.
    fn challenge_type(&self) -> ChallengeType;

    /// Returns true if `response` asks for authentication.
    fn is_authentication_requested(
        &self,
        host: &HttpHost,
        response: &Response<Body>,
        ctx: &ClientContext,
    ) -> bool;

    /// The challenges of `response`, one per scheme, in header order.
    fn challenges(
        &self,
        host: &HttpHost,
        response: &Response<Body>,
        ctx: &ClientContext,
    ) -> Result<Vec<AuthChallenge>, MalformedChallenge>;

    /// The schemes to try, most preferred first, each paired with the
    /// credentials it would use. Challenges without credentials are left
    /// out.
    fn select(
        &self,
        challenges: &[AuthChallenge],
        host: &HttpHost,
        response: &Response<Body>,
        ctx: &ClientContext,
    ) -> VecDeque<AuthOption>;

    /// Called once `scheme` has been accepted by `host`.
    fn auth_succeeded(&self, host: &HttpHost, scheme: &dyn AuthScheme, ctx: &ClientContext);

    /// Called once `scheme` has been rejected by `host`.
    fn auth_failed(&self, host: &HttpHost, scheme: &dyn AuthScheme, ctx: &ClientContext);
}

/// Answers `401` challenges with `Authorization`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TargetAuthenticationStrategy;

/// Answers `407` challenges with `Proxy-Authorization`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProxyAuthenticationStrategy;

impl AuthenticationStrategy for TargetAuthenticationStrategy {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Target
    }

    fn is_authentication_requested(
        &self,
        _host: &HttpHost,
        response: &Response<Body>,
        _ctx: &ClientContext,
    ) -> bool {
        response.status() == ChallengeType::Target.status()
    }

    fn challenges(
        &self,
        _host: &HttpHost,
        response: &Response<Body>,
        _ctx: &ClientContext,
    ) -> Result<Vec<AuthChallenge>, MalformedChallenge> {
        AuthChallenge::from_headers(response.headers(), ChallengeType::Target)
    }

    fn select(
        &self,
        challenges: &[AuthChallenge],
        host: &HttpHost,
        _response: &Response<Body>,
        ctx: &ClientContext,
    ) -> VecDeque<AuthOption> {
        let preferred = ctx.request_config().target_preferred_auth_schemes();
        select(challenges, preferred, host, ctx)
    }

    fn auth_succeeded(&self, host: &HttpHost, scheme: &dyn AuthScheme, ctx: &ClientContext) {
        cache_scheme(host, scheme, ctx);
    }

    fn auth_failed(&self, host: &HttpHost, scheme: &dyn AuthScheme, ctx: &ClientContext) {
        evict_scheme(host, scheme, ctx);
    }
}

impl AuthenticationStrategy for ProxyAuthenticationStrategy {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Proxy
    }

    fn is_authentication_requested(
        &self,
        _host: &HttpHost,
        response: &Response<Body>,
        _ctx: &ClientContext,
    ) -> bool {
        response.status() == ChallengeType::Proxy.status()
    }

    fn challenges(
        &self,
        _host: &HttpHost,
        response: &Response<Body>,
        _ctx: &ClientContext,
    ) -> Result<Vec<AuthChallenge>, MalformedChallenge> {
        AuthChallenge::from_headers(response.headers(), ChallengeType::Proxy)
    }

    fn select(
        &self,
        challenges: &[AuthChallenge],
        host: &HttpHost,
        _response: &Response<Body>,
        ctx: &ClientContext,
    ) -> VecDeque<AuthOption> {
        let preferred = ctx.request_config().proxy_preferred_auth_schemes();
        select(challenges, preferred, host, ctx)
    }

    fn auth_succeeded(&self, host: &HttpHost, scheme: &dyn AuthScheme, ctx: &ClientContext) {
        cache_scheme(host, scheme, ctx);
    }

    fn auth_failed(&self, host: &HttpHost, scheme: &dyn AuthScheme, ctx: &ClientContext) {
        evict_scheme(host, scheme, ctx);
    }
}

fn select(
    challenges: &[AuthChallenge],
    preferred: Option<&[String]>,
    host: &HttpHost,
    ctx: &ClientContext,
) -> VecDeque<AuthOption> {
    let mut options = VecDeque::new();
    let (registry, provider) = match (ctx.auth_scheme_registry(), ctx.credentials_provider()) {
        (Some(registry), Some(provider)) => (registry, provider),
        (None, _) => {
            log::debug!("auth scheme registry not set in the context");
            return options;
        }
        (_, None) => {
            log::debug!("credentials provider not set in the context");
            return options;
        }
    };

    let ordered: Vec<&AuthChallenge> = match preferred {
        Some(preferred) => preferred
            .iter()
            .filter_map(|name| challenges.iter().find(|c| c.scheme() == name.as_str()))
            .collect(),
        None => challenges.iter().collect(),
    };

    let port = host.port().or_else(|| default_port(host.scheme()));
    for challenge in ordered {
        let factory = match registry.lookup(challenge.scheme()) {
            Some(factory) => factory,
            None => {
                log::debug!("challenge for {} scheme not supported", challenge.scheme());
                continue;
            }
        };
        let mut scheme = factory.create();
        if let Err(err) = scheme.process_challenge(challenge) {
            log::warn!("malformed {} challenge: {}", challenge.scheme(), err);
            continue;
        }
        let scope = AuthScope::with_realm(
            host.hostname(),
            port,
            scheme.realm(),
            Some(scheme.name()),
        );
        match provider.credentials(&scope) {
            Some(credentials) => options.push_back(AuthOption::new(scheme, credentials)),
            None => log::debug!("no credentials for {scope}"),
        }
    }
    options
}

// only schemes that can be replayed without a handshake are cached
fn is_cachable(scheme: &dyn AuthScheme) -> bool {
    scheme.is_complete() && scheme.name() == "basic"
}

fn cache_scheme(host: &HttpHost, scheme: &dyn AuthScheme, ctx: &ClientContext) {
    if !is_cachable(scheme) {
        return;
    }
    if let Some(cache) = ctx.auth_cache() {
        log::debug!("caching '{}' auth scheme for {}", scheme.name(), host);
        cache.put(host, scheme.box_clone());
    }
}

fn evict_scheme(host: &HttpHost, _scheme: &dyn AuthScheme, ctx: &ClientContext) {
    if let Some(cache) = ctx.auth_cache() {
        log::debug!("clearing cached auth scheme for {host}");
        cache.remove(host);
    }
}
