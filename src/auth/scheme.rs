use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::{HeaderValue, Request};

use super::{AuthChallenge, BasicScheme, Credentials};
use crate::error::BoxError;
use crate::Body;

/// An authentication scheme, such as `Basic`.
///
/// Schemes may keep state between rounds of a multi-step handshake. A scheme
/// whose authority is bound to one connection rather than to each request
/// reports itself as [connection based](AuthScheme::is_connection_based).
pub trait AuthScheme: Send + Sync + fmt::Debug {
    /// The lower-cased scheme name.
    fn name(&self) -> &str;

    /// Consume a challenge addressed to this scheme.
    fn process_challenge(&mut self, challenge: &AuthChallenge) -> Result<(), BoxError>;

    /// The realm of the last challenge, if the scheme uses realms.
    fn realm(&self) -> Option<&str>;

    /// Whether the authority granted lasts for the connection.
    fn is_connection_based(&self) -> bool;

    /// Whether the handshake has completed, successfully or not.
    fn is_complete(&self) -> bool;

    /// Produce the value of the `Authorization` (or `Proxy-Authorization`)
    /// header for `request`.
    fn authenticate(
        &mut self,
        credentials: &Credentials,
        request: &Request<Body>,
    ) -> Result<HeaderValue, BoxError>;

    /// A copy of this scheme, used to cache it for preemptive use.
    fn box_clone(&self) -> Box<dyn AuthScheme>;
}

/// Creates fresh scheme instances.
pub trait AuthSchemeFactory: Send + Sync {
    /// A new scheme instance.
    fn create(&self) -> Box<dyn AuthScheme>;
}

impl<F> AuthSchemeFactory for F
where
    F: Fn() -> Box<dyn AuthScheme> + Send + Sync,
{
    fn create(&self) -> Box<dyn AuthScheme> {
        self()
    }
}

/// Scheme factories by lower-cased scheme name.
#[derive(Clone)]
pub struct AuthSchemeRegistry {
    factories: HashMap<String, Arc<dyn AuthSchemeFactory>>,
}

impl AuthSchemeRegistry {
    /// A registry without any scheme.
    pub fn empty() -> AuthSchemeRegistry {
        AuthSchemeRegistry {
            factories: HashMap::new(),
        }
    }

    /// Register `factory` for `name`, replacing any previous factory.
    pub fn register<F>(mut self, name: &str, factory: F) -> AuthSchemeRegistry
    where
        F: AuthSchemeFactory + 'static,
    {
        self.factories
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    /// The factory for `name`.
    pub fn lookup(&self, name: &str) -> Option<&dyn AuthSchemeFactory> {
        self.factories
            .get(&name.to_ascii_lowercase())
            .map(|f| &**f)
    }
}

impl Default for AuthSchemeRegistry {
    /// Knows `basic`.
    fn default() -> AuthSchemeRegistry {
        AuthSchemeRegistry::empty()
            .register("basic", || -> Box<dyn AuthScheme> { Box::new(BasicScheme::new()) })
    }
}

impl fmt::Debug for AuthSchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
