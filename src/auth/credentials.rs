use std::fmt;
use std::sync::Mutex;

use super::AuthScope;

/// A user name and optional password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: Option<String>,
}

impl Credentials {
    /// Create credentials from a user name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Credentials {
        Credentials {
            username: username.into(),
            password: Some(password.into()),
        }
    }

    /// Credentials with a user name only.
    pub fn username_only(username: impl Into<String>) -> Credentials {
        Credentials {
            username: username.into(),
            password: None,
        }
    }

    pub(crate) fn from_parts(username: String, password: Option<String>) -> Credentials {
        Credentials { username, password }
    }

    /// The user name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "Sensitive"))
            .finish()
    }
}

/// Looks up credentials for an auth scope.
pub trait CredentialsProvider: Send + Sync {
    /// Store credentials for `scope`, replacing any for an equal scope.
    fn set_credentials(&self, scope: AuthScope, credentials: Credentials);

    /// The credentials that best match `scope`, if any match at all.
    fn credentials(&self, scope: &AuthScope) -> Option<Credentials>;

    /// Forget all credentials.
    fn clear(&self);
}

/// An in-memory [`CredentialsProvider`].
///
/// A lookup returns the credentials of an equal scope, or else of the
/// stored scope with the highest [`match_score`](AuthScope::match_score).
/// Ties go to the scope stored first.
#[derive(Default)]
pub struct BasicCredentialsProvider {
    entries: Mutex<Vec<(AuthScope, Credentials)>>,
}

impl BasicCredentialsProvider {
    /// An empty provider.
    pub fn new() -> BasicCredentialsProvider {
        BasicCredentialsProvider::default()
    }
}

impl CredentialsProvider for BasicCredentialsProvider {
    fn set_credentials(&self, scope: AuthScope, credentials: Credentials) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|(s, _)| *s == scope) {
            Some(entry) => entry.1 = credentials,
            None => entries.push((scope, credentials)),
        }
    }

    fn credentials(&self, scope: &AuthScope) -> Option<Credentials> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, creds)) = entries.iter().find(|(s, _)| s == scope) {
            return Some(creds.clone());
        }
        let mut best: Option<(i32, &Credentials)> = None;
        for (stored, creds) in entries.iter() {
            let score = scope.match_score(stored);
            if score < 0 {
                continue;
            }
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, creds));
            }
        }
        best.map(|(_, creds)| creds.clone())
    }

    fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl fmt::Debug for BasicCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_list()
            .entries(entries.iter().map(|(scope, _)| scope.to_string()))
            .finish()
    }
}
