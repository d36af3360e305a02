//! Retry policies
//!
//! Two policies decide whether a request is sent again. A [`RetryHandler`]
//! looks at an I/O error that ended an attempt; a
//! [`ServiceUnavailableRetryStrategy`] looks at a response that arrived.
//!
//! # Defaults
//!
//! The [`DefaultRetryHandler`] retries up to 3 times, and only when it is
//! known to be safe: the method is idempotent, or the request never made it
//! onto the wire. Timeouts, connect failures and cancelled requests are never
//! retried. Independently of the handler, a request whose body cannot be
//! replayed is never retried.
//!
//! The [`DefaultServiceUnavailableRetryStrategy`] retries a `503` once,
//! after a second.

use std::time::Duration;

use http::{Method, Request, Response, StatusCode};

use crate::context::ClientContext;
use crate::Body;

/// Decides whether a request that failed with an I/O error is retried.
pub trait RetryHandler: Send + Sync {
    /// Returns true if `request` should be sent again after `error`.
    ///
    /// `exec_count` is the number of attempts made so far, starting at 1.
    fn retry_request(
        &self,
        error: &crate::Error,
        exec_count: u32,
        request: &Request<Body>,
        ctx: &ClientContext,
    ) -> bool;
}

/// Retries idempotent or unsent requests after transient I/O errors.
#[derive(Clone, Debug)]
pub struct DefaultRetryHandler {
    retry_count: u32,
    request_sent_retry_enabled: bool,
}

impl DefaultRetryHandler {
    /// Retry at most `retry_count` times. With `request_sent_retry_enabled`,
    /// non-idempotent requests are retried even once they were sent.
    pub fn new(retry_count: u32, request_sent_retry_enabled: bool) -> DefaultRetryHandler {
        DefaultRetryHandler {
            retry_count,
            request_sent_retry_enabled,
        }
    }

    /// The number of retries allowed.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn is_retriable(error: &crate::Error) -> bool {
        error.is_request() && !error.is_timeout()
    }
}

impl Default for DefaultRetryHandler {
    fn default() -> DefaultRetryHandler {
        DefaultRetryHandler::new(3, false)
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

impl RetryHandler for DefaultRetryHandler {
    fn retry_request(
        &self,
        error: &crate::Error,
        exec_count: u32,
        request: &Request<Body>,
        ctx: &ClientContext,
    ) -> bool {
        if exec_count > self.retry_count {
            log::trace!("retry count {} hit", self.retry_count);
            return false;
        }
        if !DefaultRetryHandler::is_retriable(error) {
            return false;
        }
        if ctx.is_aborted() {
            return false;
        }
        if is_idempotent(request.method()) {
            return true;
        }
        !ctx.is_request_sent() || self.request_sent_retry_enabled
    }
}

/// Decides whether a response asks for the request to be sent again
/// later.
pub trait ServiceUnavailableRetryStrategy: Send + Sync {
    /// Returns true if `response` should be answered by sending the request
    /// again. `exec_count` counts attempts from 1.
    fn retry_request(&self, response: &Response<Body>, exec_count: u32, ctx: &ClientContext)
        -> bool;

    /// How long to wait before the next attempt.
    fn retry_interval(&self) -> Duration;
}

/// Retries `503 Service Unavailable` a fixed number of times at a fixed
/// interval.
#[derive(Clone, Debug)]
pub struct DefaultServiceUnavailableRetryStrategy {
    max_retries: u32,
    retry_interval: Duration,
}

impl DefaultServiceUnavailableRetryStrategy {
    /// Retry at most `max_retries` times, `retry_interval` apart.
    ///
    /// Zero retries never retries; a zero interval retries right away.
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        DefaultServiceUnavailableRetryStrategy {
            max_retries,
            retry_interval,
        }
    }
}

impl Default for DefaultServiceUnavailableRetryStrategy {
    fn default() -> Self {
        DefaultServiceUnavailableRetryStrategy::new(1, Duration::from_millis(1000))
    }
}

impl ServiceUnavailableRetryStrategy for DefaultServiceUnavailableRetryStrategy {
    fn retry_request(
        &self,
        response: &Response<Body>,
        exec_count: u32,
        _ctx: &ClientContext,
    ) -> bool {
        exec_count <= self.max_retries && response.status() == StatusCode::SERVICE_UNAVAILABLE
    }

    fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}
