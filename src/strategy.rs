//! Connection reuse, keep-alive and user token policies.

use std::time::Duration;

use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method, Request, Response, StatusCode, Version};

use crate::auth::AuthState;
use crate::context::{ClientContext, UserToken};
use crate::Body;

/// Decides whether a connection can carry another exchange.
pub trait ConnectionReuseStrategy: Send + Sync {
    /// Returns true if the connection that carried `request` and `response`
    /// may be reused once the response body was read.
    fn keep_alive(
        &self,
        request: &Request<Body>,
        response: &Response<Body>,
        ctx: &ClientContext,
    ) -> bool;
}

/// Reuses HTTP/1.1 connections unless either side asked to close or the
/// response's framing cannot be trusted.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConnectionReuseStrategy;

impl ConnectionReuseStrategy for DefaultConnectionReuseStrategy {
    fn keep_alive(
        &self,
        request: &Request<Body>,
        response: &Response<Body>,
        _ctx: &ClientContext,
    ) -> bool {
        if has_token(request.headers(), "close") {
            return false;
        }

        let headers = response.headers();
        let mut encodings = headers.get_all(TRANSFER_ENCODING).iter();
        let chunked = match encodings.next() {
            Some(value) => {
                if encodings.next().is_some() || !value.as_bytes().eq_ignore_ascii_case(b"chunked")
                {
                    return false;
                }
                true
            }
            None => false,
        };
        if !chunked && can_have_body(request.method(), response.status()) {
            let mut lengths = headers.get_all(CONTENT_LENGTH).iter();
            match (lengths.next(), lengths.next()) {
                (Some(len), None) => {
                    let valid = len
                        .to_str()
                        .ok()
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .is_some();
                    if !valid {
                        return false;
                    }
                }
                // delimited by close
                (None, _) => return false,
                (Some(_), Some(_)) => return false,
            }
        }

        if headers.contains_key(CONNECTION) {
            if has_token(headers, "close") {
                return false;
            }
            if has_token(headers, "keep-alive") {
                return true;
            }
        }
        response.version() >= Version::HTTP_11
    }
}

fn can_have_body(method: &Method, status: StatusCode) -> bool {
    method != Method::HEAD
        && !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
        && status != StatusCode::RESET_CONTENT
}

fn has_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Decides how long an idle connection may be kept.
pub trait KeepAliveStrategy: Send + Sync {
    /// The keep-alive duration announced by `response`; `None` is
    /// indefinite.
    fn keep_alive_duration(&self, response: &Response<Body>, ctx: &ClientContext)
        -> Option<Duration>;
}

/// Honours `Keep-Alive: timeout=N`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultKeepAliveStrategy;

impl KeepAliveStrategy for DefaultKeepAliveStrategy {
    fn keep_alive_duration(
        &self,
        response: &Response<Body>,
        _ctx: &ClientContext,
    ) -> Option<Duration> {
        response
            .headers()
            .get_all("keep-alive")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|param| {
                let (name, value) = param.split_once('=')?;
                if !name.trim().eq_ignore_ascii_case("timeout") {
                    return None;
                }
                value.trim().trim_matches('"').parse::<u64>().ok()
            })
            .next()
            .map(Duration::from_secs)
    }
}

/// Picks the user token a connection is bound to after an exchange.
pub trait UserTokenHandler: Send + Sync {
    /// The token for the connection that served `ctx`'s request.
    fn user_token(&self, ctx: &ClientContext) -> Option<UserToken>;
}

/// Binds connections to the user of a connection based auth scheme.
///
/// Connections that completed such a handshake carry the identity of the
/// user who authenticated; other connections stay unbound.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultUserTokenHandler;

impl UserTokenHandler for DefaultUserTokenHandler {
    fn user_token(&self, ctx: &ClientContext) -> Option<UserToken> {
        principal(ctx.target_auth_state()).or_else(|| principal(ctx.proxy_auth_state()))
    }
}

fn principal(state: &AuthState) -> Option<UserToken> {
    let scheme = state.scheme()?;
    if scheme.is_connection_based() && scheme.is_complete() {
        state.credentials().map(|c| UserToken::new(c.username()))
    } else {
        None
    }
}
