//! HTTP authentication.
//!
//! A 401 or 407 response carries challenges. An [`AuthenticationStrategy`]
//! parses them and picks the schemes to answer with, looking credentials up
//! in a [`CredentialsProvider`] by [`AuthScope`]. The [`HttpAuthenticator`]
//! moves the per-target or per-proxy [`AuthState`] through
//! `Unchallenged → Challenged → Handshake → Success | Failure`.
//!
//! Schemes that completed are kept in an [`AuthCache`] so later requests to
//! the same host can answer before being challenged.

mod authenticator;
mod basic;
mod cache;
mod challenge;
mod credentials;
mod scheme;
mod scope;
mod state;
mod strategy;

pub use self::authenticator::HttpAuthenticator;
pub use self::basic::BasicScheme;
pub use self::cache::{AuthCache, BasicAuthCache};
pub use self::challenge::{AuthChallenge, ChallengeType, MalformedChallenge};
pub use self::credentials::{BasicCredentialsProvider, Credentials, CredentialsProvider};
pub use self::scheme::{AuthScheme, AuthSchemeFactory, AuthSchemeRegistry};
pub use self::scope::AuthScope;
pub use self::state::{AuthOption, AuthProtocolState, AuthState};
pub use self::strategy::{
    AuthenticationStrategy, ProxyAuthenticationStrategy, TargetAuthenticationStrategy,
};
