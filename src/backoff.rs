//! Backoff on overload.
//!
//! A [`BackoffStrategy`] tells whether an outcome signals that a route is
//! overloaded. A [`BackoffManager`] reacts by adjusting how many concurrent
//! connections the route gets.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{Response, StatusCode};
use tokio::time::Instant;

use crate::pool::ConnPoolControl;
use crate::route::HttpRoute;
use crate::Body;

/// Decides whether an outcome should make the client back off.
pub trait BackoffStrategy: Send + Sync {
    /// Returns true if `error` signals overload.
    fn should_backoff_error(&self, error: &crate::Error) -> bool;

    /// Returns true if `response` signals overload.
    fn should_backoff_response(&self, response: &Response<Body>) -> bool;
}

/// Backs off on connect failures, timeouts, `429` and `503`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultBackoffStrategy;

impl BackoffStrategy for DefaultBackoffStrategy {
    fn should_backoff_error(&self, error: &crate::Error) -> bool {
        error.is_connect() || (error.is_request() && error.is_timeout())
    }

    fn should_backoff_response(&self, response: &Response<Body>) -> bool {
        matches!(
            response.status(),
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        )
    }
}

/// Adjusts per-route concurrency in reaction to overload.
pub trait BackoffManager: Send + Sync {
    /// The route signalled overload.
    fn back_off(&self, route: &HttpRoute);

    /// The route served a request without signalling overload.
    fn recover(&self, route: &HttpRoute);
}

/// Additive increase, multiplicative decrease of the per-route cap.
///
/// Backing off multiplies the route's cap by the backoff factor (at least
/// one connection remains); probing adds one connection up to the cap. Both
/// are rate limited by a cool down period per route.
pub struct AimdBackoffManager {
    pool: Arc<dyn ConnPoolControl>,
    state: Mutex<Timestamps>,
    cool_down: Duration,
    backoff_factor: f64,
    cap: usize,
}

#[derive(Default)]
struct Timestamps {
    backoffs: HashMap<HttpRoute, Instant>,
    recoveries: HashMap<HttpRoute, Instant>,
}

impl AimdBackoffManager {
    /// Manage the per-route caps of `pool`.
    pub fn new(pool: Arc<dyn ConnPoolControl>) -> AimdBackoffManager {
        AimdBackoffManager {
            pool,
            state: Mutex::new(Timestamps::default()),
            cool_down: Duration::from_secs(5),
            backoff_factor: 0.5,
            cap: 2,
        }
    }

    /// Set the minimum time between two adjustments of a route. Default is
    /// 5 seconds.
    pub fn set_cool_down(&mut self, cool_down: Duration) {
        self.cool_down = cool_down;
    }

    /// Set the factor a backoff applies to the cap. Default is 0.5.
    ///
    /// Only factors strictly between 0 and 1 are accepted; any other value
    /// leaves the factor unchanged.
    pub fn set_backoff_factor(&mut self, factor: f64) {
        if factor > 0.0 && factor < 1.0 {
            self.backoff_factor = factor;
        } else {
            log::warn!("ignoring backoff factor {factor}, must be between 0 and 1");
        }
    }

    /// Set the cap probing grows a route to. Default is 2.
    ///
    /// A cap of zero is raised to 1.
    pub fn set_per_host_connection_cap(&mut self, cap: usize) {
        self.cap = cap.max(1);
    }

    fn backed_off_size(&self, current: usize) -> usize {
        if current <= 1 {
            return 1;
        }
        ((self.backoff_factor * current as f64).floor() as usize).max(1)
    }

    fn cooling(&self, last: Option<&Instant>, now: Instant) -> bool {
        last.map_or(false, |last| now.duration_since(*last) < self.cool_down)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamps> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BackoffManager for AimdBackoffManager {
    fn back_off(&self, route: &HttpRoute) {
        let mut state = self.lock();
        let now = Instant::now();
        if self.cooling(state.backoffs.get(route), now) {
            return;
        }
        let current = self.pool.max_per_route(route);
        let next = self.backed_off_size(current);
        log::debug!("backing off {route}: {current} -> {next}");
        self.pool.set_max_per_route(route, next);
        state.backoffs.insert(route.clone(), now);
    }

    fn recover(&self, route: &HttpRoute) {
        let mut state = self.lock();
        let now = Instant::now();
        if self.cooling(state.recoveries.get(route), now) || self.cooling(state.backoffs.get(route), now)
        {
            return;
        }
        let current = self.pool.max_per_route(route);
        let next = if current >= self.cap {
            self.cap
        } else {
            current + 1
        };
        log::trace!("raising cap of {route}: {current} -> {next}");
        self.pool.set_max_per_route(route, next);
        state.recoveries.insert(route.clone(), now);
    }
}

impl fmt::Debug for AimdBackoffManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AimdBackoffManager")
            .field("cool_down", &self.cool_down)
            .field("backoff_factor", &self.backoff_factor)
            .field("cap", &self.cap)
            .finish()
    }
}
