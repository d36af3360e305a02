use std::collections::VecDeque;
use std::fmt;

use super::{AuthScheme, Credentials};

/// Progress of authentication against one target or proxy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthProtocolState {
    /// No challenge seen.
    #[default]
    Unchallenged,
    /// Challenged; options or a scheme are selected.
    Challenged,
    /// A multi-step scheme is mid-handshake.
    Handshake,
    /// The last answer was accepted.
    Success,
    /// Authentication failed; further challenges are not answered.
    Failure,
}

/// A candidate scheme together with the credentials it would use.
pub struct AuthOption {
    scheme: Box<dyn AuthScheme>,
    credentials: Credentials,
}

impl AuthOption {
    /// Pair a scheme with credentials.
    pub fn new(scheme: Box<dyn AuthScheme>, credentials: Credentials) -> AuthOption {
        AuthOption {
            scheme,
            credentials,
        }
    }

    /// The scheme.
    pub fn scheme(&self) -> &dyn AuthScheme {
        &*self.scheme
    }

    /// The credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn into_parts(self) -> (Box<dyn AuthScheme>, Credentials) {
        (self.scheme, self.credentials)
    }
}

impl fmt::Debug for AuthOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthOption")
            .field(&self.scheme.name())
            .field(&self.credentials)
            .finish()
    }
}

/// Authentication state for one target or one proxy.
///
/// Either a selected scheme with its credentials, or a queue of options
/// still to try, never both: setting one clears the other.
#[derive(Debug, Default)]
pub struct AuthState {
    state: AuthProtocolState,
    scheme: Option<Box<dyn AuthScheme>>,
    credentials: Option<Credentials>,
    options: Option<VecDeque<AuthOption>>,
}

impl AuthState {
    /// An unchallenged state.
    pub fn new() -> AuthState {
        AuthState::default()
    }

    /// Forget everything, back to unchallenged.
    pub fn reset(&mut self) {
        self.state = AuthProtocolState::Unchallenged;
        self.scheme = None;
        self.credentials = None;
        self.options = None;
    }

    /// The protocol state.
    pub fn state(&self) -> AuthProtocolState {
        self.state
    }

    /// Set the protocol state.
    pub fn set_state(&mut self, state: AuthProtocolState) {
        self.state = state;
    }

    /// The selected scheme.
    pub fn scheme(&self) -> Option<&dyn AuthScheme> {
        self.scheme.as_deref()
    }

    pub(crate) fn scheme_mut(&mut self) -> Option<&mut (dyn AuthScheme + 'static)> {
        self.scheme.as_deref_mut()
    }

    pub(crate) fn selected_mut(
        &mut self,
    ) -> Option<(&mut (dyn AuthScheme + 'static), &Credentials)> {
        match (self.scheme.as_deref_mut(), self.credentials.as_ref()) {
            (Some(scheme), Some(credentials)) => Some((scheme, credentials)),
            _ => None,
        }
    }

    /// The credentials of the selected scheme.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// The options still to try.
    pub fn options(&self) -> Option<&VecDeque<AuthOption>> {
        self.options.as_ref()
    }

    pub(crate) fn take_options(&mut self) -> Option<VecDeque<AuthOption>> {
        self.options.take()
    }

    /// Returns true if options are queued.
    pub fn has_options(&self) -> bool {
        self.options.as_ref().map_or(false, |o| !o.is_empty())
    }

    /// Select a scheme and credentials, dropping any queued options.
    ///
    /// The protocol state is left as it is.
    pub fn update(&mut self, scheme: Box<dyn AuthScheme>, credentials: Credentials) {
        self.scheme = Some(scheme);
        self.credentials = Some(credentials);
        self.options = None;
    }

    /// Queue options, dropping any selected scheme and credentials.
    pub fn update_options(&mut self, options: VecDeque<AuthOption>) {
        self.options = if options.is_empty() {
            None
        } else {
            Some(options)
        };
        self.scheme = None;
        self.credentials = None;
    }

    /// Returns true if the selected scheme is bound to its connection.
    pub fn is_connection_based(&self) -> bool {
        self.scheme
            .as_ref()
            .map_or(false, |s| s.is_connection_based())
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state:{:?};", self.state)?;
        if let Some(ref scheme) = self.scheme {
            write!(f, "auth scheme:{};", scheme.name())?;
        }
        if self.credentials.is_some() {
            f.write_str("credentials present")?;
        }
        Ok(())
    }
}
