use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::UserToken;
use crate::route::HttpRoute;

/// One pooled connection and its bookkeeping.
///
/// While leased, the entry is owned by its lessee; it goes back to the pool
/// through [`ConnPool::release`](super::ConnPool::release).
pub struct PoolEntry<C> {
    pub(super) id: u64,
    pub(super) route: HttpRoute,
    pub(super) conn: C,
    pub(super) state: Option<UserToken>,
    pub(super) created: Instant,
    pub(super) updated: Instant,
    pub(super) valid_until: Option<Instant>,
    pub(super) expiry: Option<Instant>,
    pub(super) route_complete: bool,
    pub(super) closed: CancellationToken,
}

impl<C> PoolEntry<C> {
    pub(super) fn new(
        id: u64,
        route: HttpRoute,
        conn: C,
        time_to_live: Option<Duration>,
        closed: CancellationToken,
    ) -> PoolEntry<C> {
        let now = Instant::now();
        let valid_until = time_to_live.map(|ttl| now + ttl);
        PoolEntry {
            id,
            route,
            conn,
            state: None,
            created: now,
            updated: now,
            valid_until,
            expiry: valid_until,
            route_complete: false,
            closed,
        }
    }

    /// The id, unique within its pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The route this entry's connection follows.
    pub fn route(&self) -> &HttpRoute {
        &self.route
    }

    /// The connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// The connection, mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// The user token the connection is bound to.
    pub fn state(&self) -> Option<&UserToken> {
        self.state.as_ref()
    }

    /// Bind the connection to a user token.
    pub fn set_state(&mut self, state: Option<UserToken>) {
        self.state = state;
    }

    /// When the entry was created.
    pub fn created(&self) -> Instant {
        self.created
    }

    /// When the entry was last released.
    pub fn updated(&self) -> Instant {
        self.updated
    }

    /// When the entry expires; `None` is never.
    pub fn expiry(&self) -> Option<Instant> {
        self.expiry
    }

    /// Returns true if the entry expired at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expiry.map_or(false, |expiry| expiry <= now)
    }

    /// Set the expiry from a keep-alive duration, capped by the time to
    /// live. `None` keeps the connection until its time to live runs out.
    pub fn update_expiry(&mut self, keep_alive: Option<Duration>) {
        let now = Instant::now();
        self.updated = now;
        let keep_alive = keep_alive.map(|d| now + d);
        self.expiry = match (keep_alive, self.valid_until) {
            (Some(k), Some(v)) => Some(k.min(v)),
            (k, v) => k.or(v),
        };
    }

    /// Returns true once the route was fully established on the connection.
    pub fn is_route_complete(&self) -> bool {
        self.route_complete
    }

    /// Mark the route as fully established.
    pub fn mark_route_complete(&mut self) {
        self.route_complete = true;
    }

    /// Cancelled when the pool shuts down while the entry is leased.
    pub(crate) fn closed_token(&self) -> &CancellationToken {
        &self.closed
    }
}

impl<C> fmt::Debug for PoolEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolEntry")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("state", &self.state)
            .field("route_complete", &self.route_complete)
            .finish()
    }
}

/// Counts of a pool or of one route within it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Entries currently leased.
    pub leased: usize,
    /// Lease requests waiting for an entry.
    pub pending: usize,
    /// Idle entries.
    pub available: usize,
    /// The cap.
    pub max: usize,
}
