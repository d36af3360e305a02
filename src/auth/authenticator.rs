use http::{Request, Response};

use super::{AuthProtocolState, AuthState, AuthenticationStrategy, ChallengeType};
use crate::context::ClientContext;
use crate::host::HttpHost;
use crate::Body;

/// Drives an [`AuthState`] through a challenge/response exchange.
///
/// For each response the executor first asks whether authentication was
/// requested, which also settles the outcome of the previous answer. If it
/// was, [`handle_auth_challenge`](HttpAuthenticator::handle_auth_challenge)
/// decides whether the request is worth sending again, and before sending,
/// [`generate_auth_response`](HttpAuthenticator::generate_auth_response)
/// attaches the answer.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpAuthenticator;

impl HttpAuthenticator {
    /// A new authenticator.
    pub fn new() -> HttpAuthenticator {
        HttpAuthenticator
    }

    /// Returns true if `response` carries a challenge for `strategy`.
    ///
    /// A response without a challenge turns a pending `Challenged` or
    /// `Handshake` state into `Success`.
    pub fn is_authentication_requested(
        &self,
        host: &HttpHost,
        response: &Response<Body>,
        strategy: &dyn AuthenticationStrategy,
        state: &mut AuthState,
        ctx: &ClientContext,
    ) -> bool {
        if strategy.is_authentication_requested(host, response, ctx) {
            log::debug!("{host} requested authentication");
            if state.state() == AuthProtocolState::Success {
                if let Some(scheme) = state.scheme() {
                    strategy.auth_failed(host, scheme, ctx);
                }
            }
            return true;
        }

        match state.state() {
            AuthProtocolState::Challenged | AuthProtocolState::Handshake => {
                log::debug!("{host} authentication succeeded");
                state.set_state(AuthProtocolState::Success);
                if let Some(scheme) = state.scheme() {
                    strategy.auth_succeeded(host, scheme, ctx);
                }
            }
            AuthProtocolState::Success => {}
            _ => state.set_state(AuthProtocolState::Unchallenged),
        }
        false
    }

    /// Process the challenges of `response`.
    ///
    /// Returns true if the request should be sent again with a (new)
    /// answer. Moves `state` to `Failure` when the selected scheme was
    /// rejected, or when no scheme can answer the challenges.
    pub fn handle_auth_challenge(
        &self,
        host: &HttpHost,
        response: &Response<Body>,
        strategy: &dyn AuthenticationStrategy,
        state: &mut AuthState,
        ctx: &ClientContext,
    ) -> bool {
        let challenges = match strategy.challenges(host, response, ctx) {
            Ok(challenges) => challenges,
            Err(err) => {
                log::warn!("malformed challenge from {host}: {err}");
                state.reset();
                return false;
            }
        };
        if challenges.is_empty() {
            log::debug!("{host} sent no supported challenge");
            return false;
        }

        match state.state() {
            AuthProtocolState::Failure => return false,
            AuthProtocolState::Success => state.reset(),
            AuthProtocolState::Challenged | AuthProtocolState::Handshake
                if state.scheme().is_none() =>
            {
                return false;
            }
            AuthProtocolState::Challenged
            | AuthProtocolState::Handshake
            | AuthProtocolState::Unchallenged => {
                if let Some(scheme) = state.scheme_mut() {
                    let name = scheme.name().to_owned();
                    match challenges.iter().find(|c| c.scheme() == name) {
                        Some(challenge) => {
                            log::debug!("authorization challenge processed");
                            if let Err(err) = scheme.process_challenge(challenge) {
                                log::warn!("malformed {name} challenge from {host}: {err}");
                                state.reset();
                                return false;
                            }
                            if scheme.is_complete() {
                                log::debug!("authentication failed");
                                strategy.auth_failed(host, &*scheme, ctx);
                                state.reset();
                                state.set_state(AuthProtocolState::Failure);
                                return false;
                            }
                            state.set_state(AuthProtocolState::Handshake);
                            return true;
                        }
                        None => state.reset(),
                    }
                }
            }
        }

        let options = strategy.select(&challenges, host, response, ctx);
        if options.is_empty() {
            log::debug!("no usable credentials for {host}");
            state.set_state(AuthProtocolState::Failure);
            return false;
        }
        log::debug!("selected authentication options: {options:?}");
        state.set_state(AuthProtocolState::Challenged);
        state.update_options(options);
        true
    }

    /// Attach the answer of `state` to `request`, replacing any previous
    /// answer header of `kind`.
    pub fn generate_auth_response(
        &self,
        request: &mut Request<Body>,
        state: &mut AuthState,
        kind: ChallengeType,
    ) {
        match state.state() {
            AuthProtocolState::Failure => return,
            AuthProtocolState::Success if state.is_connection_based() => return,
            AuthProtocolState::Challenged => {
                if let Some(mut options) = state.take_options() {
                    while let Some(option) = options.pop_front() {
                        let (mut scheme, credentials) = option.into_parts();
                        match scheme.authenticate(&credentials, request) {
                            Ok(value) => {
                                request.headers_mut().insert(kind.response_header(), value);
                                state.update(scheme, credentials);
                                return;
                            }
                            Err(err) => {
                                log::warn!("{} authentication error: {}", scheme.name(), err);
                                state.update(scheme, credentials);
                            }
                        }
                    }
                    return;
                }
            }
            _ => {}
        }

        if let Some((scheme, credentials)) = state.selected_mut() {
            match scheme.authenticate(credentials, request) {
                Ok(value) => {
                    request.headers_mut().insert(kind.response_header(), value);
                }
                Err(err) => log::error!("{} authentication error: {}", scheme.name(), err),
            }
        }
    }
}
