use http::{HeaderValue, Request};

use super::{AuthChallenge, AuthScheme, Credentials};
use crate::error::BoxError;
use crate::Body;

/// The `Basic` scheme: the user name and password, base64 encoded.
///
/// One challenge completes the scheme; a second challenge after answering
/// means the credentials were rejected.
#[derive(Clone, Debug, Default)]
pub struct BasicScheme {
    realm: Option<String>,
    complete: bool,
}

impl BasicScheme {
    /// A scheme that has not seen a challenge.
    pub fn new() -> BasicScheme {
        BasicScheme::default()
    }
}

impl AuthScheme for BasicScheme {
    fn name(&self) -> &str {
        "basic"
    }

    fn process_challenge(&mut self, challenge: &AuthChallenge) -> Result<(), BoxError> {
        if challenge.scheme() != "basic" {
            return Err(format!("invalid scheme for basic: {}", challenge.scheme()).into());
        }
        self.realm = challenge.realm().map(str::to_owned);
        self.complete = true;
        Ok(())
    }

    fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    fn is_connection_based(&self) -> bool {
        false
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn authenticate(
        &mut self,
        credentials: &Credentials,
        _request: &Request<Body>,
    ) -> Result<HeaderValue, BoxError> {
        Ok(crate::util::basic_auth(
            credentials.username(),
            credentials.password(),
        ))
    }

    fn box_clone(&self) -> Box<dyn AuthScheme> {
        Box::new(self.clone())
    }
}
