//! A bounded pool of connections, partitioned by route.
//!
//! Every connection belongs to exactly one route. A route may hold at most
//! its per-route cap of connections (leased plus idle) and the whole pool at
//! most its total cap. A lease that finds no idle connection and no free
//! capacity waits until a release or an eviction makes room, or until its
//! deadline passes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::UserToken;
use crate::route::HttpRoute;

mod entry;

pub use self::entry::{PoolEntry, PoolStats};

/// A connection that can be kept in a [`ConnPool`].
pub trait Poolable: Send + 'static {
    /// Returns true if the connection is open.
    fn is_open(&self) -> bool;

    /// Returns true if the peer appears to have closed the connection.
    fn is_stale(&mut self) -> bool;

    /// Close the connection without draining it.
    fn shutdown(&mut self);
}

/// Live control over a pool's caps and view of its counts.
pub trait ConnPoolControl: Send + Sync {
    /// The total cap.
    fn max_total(&self) -> usize;

    /// Set the total cap.
    fn set_max_total(&self, max: usize);

    /// The cap of routes without their own.
    fn default_max_per_route(&self) -> usize;

    /// Set the cap of routes without their own.
    fn set_default_max_per_route(&self, max: usize);

    /// The cap of `route`.
    fn max_per_route(&self, route: &HttpRoute) -> usize;

    /// Set the cap of `route`.
    fn set_max_per_route(&self, route: &HttpRoute, max: usize);

    /// Counts over the whole pool.
    fn total_stats(&self) -> PoolStats;

    /// Counts of `route`.
    fn stats(&self, route: &HttpRoute) -> PoolStats;
}

type ConnFactory<C> = dyn Fn(&HttpRoute) -> crate::Result<C> + Send + Sync;

/// A pool of connections of type `C`.
///
/// Cloning the pool gives another handle to the same connections.
pub struct ConnPool<C> {
    shared: Arc<Shared<C>>,
}

struct Shared<C> {
    inner: Mutex<Inner<C>>,
    available: Notify,
    factory: Box<ConnFactory<C>>,
    next_id: AtomicU64,
    closed: CancellationToken,
}

struct Inner<C> {
    routes: HashMap<HttpRoute, RoutePool<C>>,
    max_total: usize,
    default_max_per_route: usize,
    max_per_route: HashMap<HttpRoute, usize>,
    time_to_live: Option<Duration>,
    validate_after_inactivity: Option<Duration>,
    is_shutdown: bool,
}

struct RoutePool<C> {
    // front is the most recently released
    available: VecDeque<PoolEntry<C>>,
    leased: HashSet<u64>,
    pending: usize,
}

impl<C> RoutePool<C> {
    fn new() -> RoutePool<C> {
        RoutePool {
            available: VecDeque::new(),
            leased: HashSet::new(),
            pending: 0,
        }
    }

    fn allocated(&self) -> usize {
        self.available.len() + self.leased.len()
    }

    fn is_unused(&self) -> bool {
        self.allocated() == 0 && self.pending == 0
    }

    // an exact state match first, then an entry bound to no state
    fn take_free(&mut self, state: Option<&UserToken>) -> Option<PoolEntry<C>> {
        if let Some(state) = state {
            if let Some(i) = self
                .available
                .iter()
                .position(|e| e.state.as_ref() == Some(state))
            {
                return self.available.remove(i);
            }
        }
        let i = self.available.iter().position(|e| e.state.is_none())?;
        self.available.remove(i)
    }
}

impl<C: Poolable> Inner<C> {
    fn max_for(&self, route: &HttpRoute) -> usize {
        self.max_per_route
            .get(route)
            .copied()
            .unwrap_or(self.default_max_per_route)
    }

    fn leased_total(&self) -> usize {
        self.routes.values().map(|p| p.leased.len()).sum()
    }

    fn available_total(&self) -> usize {
        self.routes.values().map(|p| p.available.len()).sum()
    }

    // the least recently released idle entry on any route
    fn evict_least_recent(&mut self) {
        let oldest = self
            .routes
            .iter()
            .filter_map(|(route, pool)| pool.available.back().map(|e| (e.updated, route)))
            .min_by_key(|(updated, _)| *updated)
            .map(|(_, route)| route.clone());
        if let Some(route) = oldest {
            if let Some(pool) = self.routes.get_mut(&route) {
                if let Some(mut entry) = pool.available.pop_back() {
                    log::trace!("evicting idle connection {} of {}", entry.id, route);
                    entry.conn.shutdown();
                }
            }
        }
    }

    fn purge_unused(&mut self) {
        self.routes.retain(|_, pool| !pool.is_unused());
    }
}

impl<C: Poolable> ConnPool<C> {
    /// A pool creating connections with `factory`, capped at 2 connections
    /// per route and 20 in total.
    pub fn new<F>(factory: F) -> ConnPool<C>
    where
        F: Fn(&HttpRoute) -> crate::Result<C> + Send + Sync + 'static,
    {
        ConnPool {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    routes: HashMap::new(),
                    max_total: 20,
                    default_max_per_route: 2,
                    max_per_route: HashMap::new(),
                    time_to_live: None,
                    validate_after_inactivity: None,
                    is_shutdown: false,
                }),
                available: Notify::new(),
                factory: Box::new(factory),
                next_id: AtomicU64::new(0),
                closed: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Set the time to live of new connections; `None` is indefinite.
    pub fn set_time_to_live(&self, ttl: Option<Duration>) {
        self.lock().time_to_live = ttl;
    }

    /// Check idle connections unused for longer than `period` for
    /// staleness before leasing them; `None` disables the check.
    pub fn set_validate_after_inactivity(&self, period: Option<Duration>) {
        self.lock().validate_after_inactivity = period;
    }

    /// Lease a connection for `route` bound to `state`.
    ///
    /// Waits for a free slot until `timeout` passes, then fails with an
    /// error for which [`is_pool_timeout`](crate::Error::is_pool_timeout)
    /// is true. `None` waits indefinitely.
    pub async fn lease(
        &self,
        route: &HttpRoute,
        state: Option<&UserToken>,
        timeout: Option<Duration>,
    ) -> crate::Result<PoolEntry<C>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pending: Option<PendingGuard<'_, C>> = None;
        loop {
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(entry) = self.try_lease(&mut inner, route, state)? {
                    drop(inner);
                    drop(pending);
                    return Ok(entry);
                }
                if pending.is_none() {
                    inner
                        .routes
                        .entry(route.clone())
                        .or_insert_with(RoutePool::new)
                        .pending += 1;
                    pending = Some(PendingGuard { pool: self, route });
                }
            }

            log::trace!("waiting for a connection to {route}");
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        log::debug!("timeout waiting for a connection to {route}");
                        return Err(crate::error::pool_timeout());
                    }
                }
                None => notified.await,
            }
        }
    }

    fn try_lease(
        &self,
        inner: &mut Inner<C>,
        route: &HttpRoute,
        state: Option<&UserToken>,
    ) -> crate::Result<Option<PoolEntry<C>>> {
        if inner.is_shutdown {
            return Err(crate::error::shutdown());
        }
        let now = Instant::now();
        let validate = inner.validate_after_inactivity;
        let max_per_route = inner.max_for(route);

        {
            let pool = inner
                .routes
                .entry(route.clone())
                .or_insert_with(RoutePool::new);
            while let Some(mut entry) = pool.take_free(state) {
                if entry.is_expired(now) {
                    log::trace!("closing expired connection {}", entry.id);
                    entry.conn.shutdown();
                    continue;
                }
                if let Some(validate) = validate {
                    if entry.updated + validate <= now && entry.conn.is_stale() {
                        log::debug!("closing stale connection {}", entry.id);
                        entry.conn.shutdown();
                        continue;
                    }
                }
                if !entry.conn.is_open() {
                    entry.conn.shutdown();
                    continue;
                }
                pool.leased.insert(entry.id);
                entry.closed = self.shared.closed.child_token();
                log::trace!("leased connection {} for {}", entry.id, route);
                return Ok(Some(entry));
            }

            // shrink a route that is over its (possibly lowered) cap
            let excess = (pool.allocated() + 1).saturating_sub(max_per_route);
            for _ in 0..excess {
                match pool.available.pop_back() {
                    Some(mut entry) => entry.conn.shutdown(),
                    None => break,
                }
            }
            if pool.allocated() >= max_per_route {
                return Ok(None);
            }
        }

        let free_capacity = inner.max_total.saturating_sub(inner.leased_total());
        if free_capacity == 0 {
            return Ok(None);
        }
        if inner.available_total() > free_capacity - 1 {
            inner.evict_least_recent();
        }

        let conn = (self.shared.factory)(route)?;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = PoolEntry::new(
            id,
            route.clone(),
            conn,
            inner.time_to_live,
            self.shared.closed.child_token(),
        );
        if let Some(pool) = inner.routes.get_mut(route) {
            pool.leased.insert(id);
        }
        log::debug!("created connection {id} for {route}");
        Ok(Some(entry))
    }

    /// Give a leased entry back.
    ///
    /// A `reusable` entry whose connection is still open becomes idle;
    /// any other entry is closed.
    pub fn release(&self, mut entry: PoolEntry<C>, reusable: bool) {
        let mut inner = self.lock();
        let known = match inner.routes.get_mut(&entry.route) {
            Some(pool) => pool.leased.remove(&entry.id),
            None => false,
        };
        if known && reusable && !inner.is_shutdown && entry.conn.is_open() {
            log::trace!("connection {} released as reusable", entry.id);
            entry.updated = Instant::now();
            if let Some(pool) = inner.routes.get_mut(&entry.route) {
                pool.available.push_front(entry);
            }
        } else {
            log::trace!("connection {} released and closed", entry.id);
            entry.conn.shutdown();
            inner.purge_unused();
        }
        drop(inner);
        self.shared.available.notify_waiters();
    }

    /// Close idle connections that expired.
    pub fn close_expired(&self) {
        let now = Instant::now();
        log::trace!("closing expired connections");
        self.close_idle_where(|e| e.is_expired(now));
    }

    /// Close connections idle for longer than `idle`.
    pub fn close_idle(&self, idle: Duration) {
        let now = Instant::now();
        log::trace!("closing connections idle longer than {idle:?}");
        self.close_idle_where(|e| e.updated + idle <= now);
    }

    fn close_idle_where(&self, mut close: impl FnMut(&PoolEntry<C>) -> bool) {
        let mut inner = self.lock();
        for pool in inner.routes.values_mut() {
            let mut kept = VecDeque::with_capacity(pool.available.len());
            for mut entry in pool.available.drain(..) {
                if close(&entry) {
                    entry.conn.shutdown();
                } else {
                    kept.push_back(entry);
                }
            }
            pool.available = kept;
        }
        inner.purge_unused();
        drop(inner);
        self.shared.available.notify_waiters();
    }

    /// Close every idle connection, force-close leased ones, and fail all
    /// further leases.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if inner.is_shutdown {
            return;
        }
        log::debug!("connection pool shut down");
        inner.is_shutdown = true;
        for pool in inner.routes.values_mut() {
            for mut entry in pool.available.drain(..) {
                entry.conn.shutdown();
            }
            pool.leased.clear();
        }
        inner.routes.clear();
        drop(inner);
        self.shared.closed.cancel();
        self.shared.available.notify_waiters();
    }

    /// Returns true once [`shutdown`](ConnPool::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.lock().is_shutdown
    }

    /// The routes that currently hold or wait for connections.
    pub fn routes(&self) -> Vec<HttpRoute> {
        self.lock().routes.keys().cloned().collect()
    }
}

impl<C: Poolable> ConnPoolControl for ConnPool<C> {
    fn max_total(&self) -> usize {
        self.lock().max_total
    }

    fn set_max_total(&self, max: usize) {
        self.lock().max_total = max;
        self.shared.available.notify_waiters();
    }

    fn default_max_per_route(&self) -> usize {
        self.lock().default_max_per_route
    }

    fn set_default_max_per_route(&self, max: usize) {
        self.lock().default_max_per_route = max;
        self.shared.available.notify_waiters();
    }

    fn max_per_route(&self, route: &HttpRoute) -> usize {
        self.lock().max_for(route)
    }

    fn set_max_per_route(&self, route: &HttpRoute, max: usize) {
        self.lock().max_per_route.insert(route.clone(), max);
        self.shared.available.notify_waiters();
    }

    fn total_stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            leased: inner.leased_total(),
            pending: inner.routes.values().map(|p| p.pending).sum(),
            available: inner.available_total(),
            max: inner.max_total,
        }
    }

    fn stats(&self, route: &HttpRoute) -> PoolStats {
        let inner = self.lock();
        let max = inner.max_for(route);
        match inner.routes.get(route) {
            Some(pool) => PoolStats {
                leased: pool.leased.len(),
                pending: pool.pending,
                available: pool.available.len(),
                max,
            },
            None => PoolStats {
                leased: 0,
                pending: 0,
                available: 0,
                max,
            },
        }
    }
}

impl<C> Clone for ConnPool<C> {
    fn clone(&self) -> ConnPool<C> {
        ConnPool {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Poolable> fmt::Debug for ConnPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.total_stats();
        f.debug_struct("ConnPool")
            .field("leased", &stats.leased)
            .field("pending", &stats.pending)
            .field("available", &stats.available)
            .field("max", &stats.max)
            .finish()
    }
}

struct PendingGuard<'a, C: Poolable> {
    pool: &'a ConnPool<C>,
    route: &'a HttpRoute,
}

impl<C: Poolable> Drop for PendingGuard<'_, C> {
    fn drop(&mut self) {
        let mut inner = self.pool.lock();
        if let Some(pool) = inner.routes.get_mut(self.route) {
            pool.pending = pool.pending.saturating_sub(1);
        }
        inner.purge_unused();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::host::HttpHost;

    #[derive(Debug)]
    struct TestConn {
        open: Arc<AtomicBool>,
        stale: bool,
    }

    impl Poolable for TestConn {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn is_stale(&mut self) -> bool {
            self.stale
        }

        fn shutdown(&mut self) {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    fn pool() -> ConnPool<TestConn> {
        ConnPool::new(|_: &HttpRoute| {
            Ok(TestConn {
                open: Arc::new(AtomicBool::new(true)),
                stale: false,
            })
        })
    }

    fn route(host: &str) -> HttpRoute {
        HttpRoute::direct(HttpHost::https(host, None), None, true)
    }

    #[tokio::test]
    async fn reuses_released_entry() {
        let pool = pool();
        let a = route("a");
        let entry = pool.lease(&a, None, None).await.unwrap();
        let id = entry.id();
        pool.release(entry, true);
        let again = pool.lease(&a, None, None).await.unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(pool.stats(&a).leased, 1);
        assert_eq!(pool.stats(&a).available, 0);
    }

    #[tokio::test]
    async fn non_reusable_release_is_not_leased_again() {
        let pool = pool();
        let a = route("a");
        let entry = pool.lease(&a, None, None).await.unwrap();
        let id = entry.id();
        pool.release(entry, false);
        let next = pool.lease(&a, None, None).await.unwrap();
        assert_ne!(next.id(), id);
    }

    #[tokio::test]
    async fn closed_connection_is_discarded() {
        let pool = pool();
        let a = route("a");
        let mut entry = pool.lease(&a, None, None).await.unwrap();
        let id = entry.id();
        pool.release(entry, true);
        entry = pool.lease(&a, None, None).await.unwrap();
        entry.connection_mut().shutdown();
        pool.release(entry, true);
        assert_eq!(pool.stats(&a).available, 0);
        let next = pool.lease(&a, None, None).await.unwrap();
        assert_ne!(next.id(), id);
    }

    #[tokio::test]
    async fn blocks_at_per_route_cap_until_release() {
        let pool = pool();
        pool.set_max_per_route(&route("a"), 1);
        let a = route("a");
        let first = pool.lease(&a, None, None).await.unwrap();
        let id = first.id();

        let waiter = {
            let pool = pool.clone();
            let a = a.clone();
            tokio::spawn(async move { pool.lease(&a, None, None).await.map(|e| e.id()) })
        };
        while pool.stats(&a).pending == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!waiter.is_finished());

        pool.release(first, true);
        assert_eq!(waiter.await.unwrap().unwrap(), id);
        assert_eq!(pool.stats(&a).pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_deadline_is_a_pool_timeout() {
        let pool = pool();
        pool.set_max_total(1);
        let _held = pool.lease(&route("a"), None, None).await.unwrap();
        let err = pool
            .lease(&route("b"), None, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.is_pool_timeout());
        assert!(!err.is_connect());
        assert_eq!(pool.total_stats().pending, 0);
    }

    #[tokio::test]
    async fn total_cap_evicts_idle_of_other_route() {
        let pool = pool();
        pool.set_max_total(1);
        let entry = pool.lease(&route("a"), None, None).await.unwrap();
        let open = entry.connection().open.clone();
        pool.release(entry, true);

        let b = pool.lease(&route("b"), None, None).await.unwrap();
        assert_eq!(b.route(), &route("b"));
        assert!(!open.load(Ordering::SeqCst));
        assert_eq!(pool.stats(&route("a")).available, 0);
    }

    #[tokio::test]
    async fn state_affinity() {
        let pool = pool();
        let a = route("a");
        let alice = UserToken::new("alice");
        let bob = UserToken::new("bob");

        let mut entry = pool.lease(&a, None, None).await.unwrap();
        let id = entry.id();
        entry.set_state(Some(alice.clone()));
        pool.release(entry, true);

        let other = pool.lease(&a, Some(&bob), None).await.unwrap();
        assert_ne!(other.id(), id);
        pool.release(other, false);

        let anon = pool.lease(&a, None, None).await.unwrap();
        assert_ne!(anon.id(), id);
        pool.release(anon, false);

        let same = pool.lease(&a, Some(&alice), None).await.unwrap();
        assert_eq!(same.id(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn close_expired_leaves_leased_alone() {
        let pool = pool();
        let a = route("a");
        let mut idle = pool.lease(&a, None, None).await.unwrap();
        let mut leased = pool.lease(&a, None, None).await.unwrap();
        idle.update_expiry(Some(Duration::from_secs(1)));
        leased.update_expiry(Some(Duration::from_secs(1)));
        let idle_open = idle.connection().open.clone();
        pool.release(idle, true);

        tokio::time::advance(Duration::from_secs(2)).await;
        pool.close_expired();

        assert!(!idle_open.load(Ordering::SeqCst));
        assert!(leased.connection().is_open());
        assert_eq!(pool.stats(&a).available, 0);
        assert_eq!(pool.stats(&a).leased, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_idle() {
        let pool = pool();
        let a = route("a");
        let entry = pool.lease(&a, None, None).await.unwrap();
        pool.release(entry, true);
        tokio::time::advance(Duration::from_secs(5)).await;
        pool.close_idle(Duration::from_secs(10));
        assert_eq!(pool.stats(&a).available, 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        pool.close_idle(Duration::from_secs(10));
        assert_eq!(pool.stats(&a).available, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_check_after_inactivity() {
        let pool = pool();
        pool.set_validate_after_inactivity(Some(Duration::from_secs(2)));
        let a = route("a");
        let mut entry = pool.lease(&a, None, None).await.unwrap();
        let id = entry.id();
        entry.connection_mut().stale = true;
        pool.release(entry, true);

        let fresh = pool.lease(&a, None, None).await.unwrap();
        assert_eq!(fresh.id(), id);
        pool.release(fresh, true);

        tokio::time::advance(Duration::from_secs(3)).await;
        let next = pool.lease(&a, None, None).await.unwrap();
        assert_ne!(next.id(), id);
    }

    #[tokio::test]
    async fn shutdown_fails_leases_and_closes_leased() {
        let pool = pool();
        let a = route("a");
        let entry = pool.lease(&a, None, None).await.unwrap();
        pool.shutdown();
        assert!(entry.closed_token().is_cancelled());
        assert!(pool.lease(&a, None, None).await.unwrap_err().is_shutdown());
        pool.release(entry, true);
        assert_eq!(pool.total_stats().available, 0);
    }
}
