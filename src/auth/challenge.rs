use std::fmt;

use http::header::{
    HeaderName, AUTHORIZATION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE,
};
use http::{HeaderMap, StatusCode};

/// Whether a challenge came from the target or from a proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    /// `401` with `WWW-Authenticate`.
    Target,
    /// `407` with `Proxy-Authenticate`.
    Proxy,
}

impl ChallengeType {
    /// The status code that carries this kind of challenge.
    pub fn status(self) -> StatusCode {
        match self {
            ChallengeType::Target => StatusCode::UNAUTHORIZED,
            ChallengeType::Proxy => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
        }
    }

    /// The header the challenge arrives in.
    pub fn challenge_header(self) -> HeaderName {
        match self {
            ChallengeType::Target => WWW_AUTHENTICATE,
            ChallengeType::Proxy => PROXY_AUTHENTICATE,
        }
    }

    /// The header the answer is sent in.
    pub fn response_header(self) -> HeaderName {
        match self {
            ChallengeType::Target => AUTHORIZATION,
            ChallengeType::Proxy => PROXY_AUTHORIZATION,
        }
    }
}

/// One parsed authentication challenge.
///
/// `WWW-Authenticate: Basic realm="x", charset="UTF-8"` parses to the scheme
/// `basic` with two parameters. Schemes and parameter names are lower-cased;
/// parameter values keep their case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthChallenge {
    scheme: String,
    token68: Option<String>,
    params: Vec<(String, String)>,
}

impl AuthChallenge {
    /// A challenge with no parameters.
    pub fn new(scheme: &str) -> AuthChallenge {
        AuthChallenge {
            scheme: scheme.to_ascii_lowercase(),
            token68: None,
            params: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, name: &str, value: &str) -> AuthChallenge {
        self.params
            .push((name.to_ascii_lowercase(), value.to_owned()));
        self
    }

    /// The lower-cased scheme name.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The token68 form, as used by schemes like `Negotiate`.
    pub fn token68(&self) -> Option<&str> {
        self.token68.as_deref()
    }

    /// A parameter value by case-insensitive name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `realm` parameter.
    pub fn realm(&self) -> Option<&str> {
        self.param("realm")
    }

    /// Parse every challenge in one header value.
    pub fn parse(value: &str) -> Result<Vec<AuthChallenge>, MalformedChallenge> {
        Parser {
            input: value.as_bytes(),
            pos: 0,
        }
        .challenges()
    }

    /// Parse every challenge of `kind` in `headers`, keeping the first
    /// challenge per scheme, in header order.
    pub fn from_headers(
        headers: &HeaderMap,
        kind: ChallengeType,
    ) -> Result<Vec<AuthChallenge>, MalformedChallenge> {
        let mut out: Vec<AuthChallenge> = Vec::new();
        for value in headers.get_all(kind.challenge_header()) {
            let value = value.to_str().map_err(|_| MalformedChallenge::new("not visible ASCII"))?;
            for challenge in AuthChallenge::parse(value)? {
                if !out.iter().any(|c| c.scheme == challenge.scheme) {
                    out.push(challenge);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for AuthChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scheme)?;
        if let Some(ref token) = self.token68 {
            write!(f, " {token}")?;
        }
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{name}=\"{value}\"")?;
        }
        Ok(())
    }
}

/// A challenge header that could not be parsed.
#[derive(Debug)]
pub struct MalformedChallenge {
    reason: &'static str,
}

impl MalformedChallenge {
    pub(crate) fn new(reason: &'static str) -> MalformedChallenge {
        MalformedChallenge { reason }
    }
}

impl fmt::Display for MalformedChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed auth challenge: {}", self.reason)
    }
}

impl std::error::Error for MalformedChallenge {}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn skip_ws_and_commas(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b',')) {
            self.pos += 1;
        }
    }

    fn token(&mut self) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while self.peek().map_or(false, is_tchar) {
            self.pos += 1;
        }
        // tchars are ASCII
        std::str::from_utf8(&input[start..self.pos]).unwrap_or_default()
    }

    fn quoted(&mut self) -> Result<String, MalformedChallenge> {
        // opening quote already consumed
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(MalformedChallenge::new("unterminated quoted string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b) => {
                            out.push(b as char);
                            self.pos += 1;
                        }
                        None => return Err(MalformedChallenge::new("dangling escape")),
                    }
                }
                Some(b) => {
                    out.push(b as char);
                    self.pos += 1;
                }
            }
        }
    }

    // `=` padding directly after a token, followed by the end of the
    // challenge, makes it a token68
    fn token68_padding(&self) -> Option<usize> {
        let mut end = self.pos;
        while self.input.get(end) == Some(&b'=') {
            end += 1;
        }
        if end == self.pos {
            return None;
        }
        let mut rest = end;
        while matches!(self.input.get(rest), Some(b' ' | b'\t')) {
            rest += 1;
        }
        match self.input.get(rest) {
            None | Some(b',') => Some(end),
            _ => None,
        }
    }

    fn challenges(mut self) -> Result<Vec<AuthChallenge>, MalformedChallenge> {
        let mut out = Vec::new();
        loop {
            self.skip_ws_and_commas();
            if self.peek().is_none() {
                break;
            }
            let scheme = self.token();
            if scheme.is_empty() {
                return Err(MalformedChallenge::new("expected scheme name"));
            }
            let mut challenge = AuthChallenge::new(scheme);
            self.skip_ws();
            self.params(&mut challenge)?;
            out.push(challenge);
        }
        Ok(out)
    }

    fn params(&mut self, challenge: &mut AuthChallenge) -> Result<(), MalformedChallenge> {
        let mut first = true;
        loop {
            if first {
                self.skip_ws();
                if self.peek() == Some(b',') {
                    return Ok(());
                }
            } else {
                self.skip_ws_and_commas();
            }
            let start = self.pos;
            let name = self.token();
            if first && (name.is_empty() || self.peek() == Some(b'/')) {
                if self.peek().is_none() {
                    return Ok(());
                }
                // token68 may use `/`, which is not a tchar
                self.pos = start;
                return self.token68_slow(challenge);
            }
            if name.is_empty() {
                return Ok(());
            }
            if first {
                if let Some(end) = self.token68_padding() {
                    let token = std::str::from_utf8(&self.input[start..end]).unwrap_or_default();
                    challenge.token68 = Some(token.to_owned());
                    self.pos = end;
                    return Ok(());
                }
            }
            self.skip_ws();
            if self.peek() != Some(b'=') {
                if first && matches!(self.peek(), None | Some(b',')) {
                    challenge.token68 = Some(name.to_owned());
                    return Ok(());
                }
                // the next challenge's scheme
                self.pos = start;
                return Ok(());
            }
            self.pos += 1;
            self.skip_ws();
            let value = if self.peek() == Some(b'"') {
                self.pos += 1;
                self.quoted()?
            } else {
                self.token().to_owned()
            };
            challenge
                .params
                .push((name.to_ascii_lowercase(), value));
            first = false;
        }
    }

    fn token68_slow(&mut self, challenge: &mut AuthChallenge) -> Result<(), MalformedChallenge> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_tchar(b) || b == b'/' || b == b'=') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(MalformedChallenge::new("unexpected character"));
        }
        let token = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or_default();
        challenge.token68 = Some(token.to_owned());
        Ok(())
    }
}
