//! Background eviction of expired and idle connections.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connect::ConnectionManager;

/// Periodically closes expired connections, and optionally connections
/// idle for too long.
///
/// The task runs on the tokio runtime it was started from, until
/// [`shutdown`](IdleConnectionEvictor::shutdown) or until the evictor is
/// dropped.
pub struct IdleConnectionEvictor {
    manager: Arc<dyn ConnectionManager>,
    sleep_time: Duration,
    max_idle: Option<Duration>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IdleConnectionEvictor {
    /// An evictor checking `manager` every `sleep_time`, closing
    /// connections idle longer than `max_idle` if given.
    pub fn new(
        manager: Arc<dyn ConnectionManager>,
        sleep_time: Duration,
        max_idle: Option<Duration>,
    ) -> IdleConnectionEvictor {
        IdleConnectionEvictor {
            manager,
            sleep_time,
            max_idle,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Start the task. Starting a running evictor does nothing.
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime.
    pub fn start(&self) -> crate::Result<()> {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().map_or(false, |t| !t.is_finished()) {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(crate::error::builder)?;
        let manager = self.manager.clone();
        let cancel = self.cancel.clone();
        let sleep_time = self.sleep_time;
        let max_idle = self.max_idle;
        *task = Some(handle.spawn(async move {
            let start = tokio::time::Instant::now() + sleep_time;
            let mut ticker = tokio::time::interval_at(start, sleep_time);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        log::trace!("evicting expired connections");
                        manager.close_expired();
                        if let Some(idle) = max_idle {
                            manager.close_idle(idle);
                        }
                    }
                }
            }
            log::debug!("idle connection evictor stopped");
        }));
        Ok(())
    }

    /// Stop the task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Returns true while the task runs.
    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        !self.cancel.is_cancelled() && task.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for IdleConnectionEvictor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for IdleConnectionEvictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleConnectionEvictor")
            .field("sleep_time", &self.sleep_time)
            .field("max_idle", &self.max_idle)
            .field("running", &self.is_running())
            .finish()
    }
}
