use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use http::Response;
use tokio_util::sync::CancellationToken;

use crate::connect::{ConnectionManager, ManagedConnection};
use crate::context::UserToken;
use crate::error::BoxError;
use crate::Body;

/// Owns a leased connection until it is released or aborted.
///
/// Dropping a holder that still owns its connection aborts it: the
/// connection is shut down and not reused.
pub struct ConnectionHolder {
    manager: Arc<dyn ConnectionManager>,
    conn: Option<ManagedConnection>,
    reusable: bool,
    state: Option<UserToken>,
    valid_for: Option<Duration>,
}

impl ConnectionHolder {
    /// Hold `conn`, leased from `manager`.
    pub fn new(manager: Arc<dyn ConnectionManager>, conn: ManagedConnection) -> ConnectionHolder {
        ConnectionHolder {
            manager,
            conn: Some(conn),
            reusable: false,
            state: None,
            valid_for: None,
        }
    }

    /// The held connection.
    ///
    /// # Errors
    ///
    /// Fails once the connection was released or aborted.
    pub fn connection(&mut self) -> crate::Result<&mut ManagedConnection> {
        self.conn.as_mut().ok_or_else(crate::error::shutdown)
    }

    /// Returns true once the connection was released or aborted.
    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    /// Keep the connection when it is released.
    pub fn mark_reusable(&mut self) {
        self.reusable = true;
    }

    /// Close the connection when it is released.
    pub fn mark_non_reusable(&mut self) {
        self.reusable = false;
    }

    /// Returns true if the connection would be kept on release.
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Bind the connection to `state` when it is released.
    pub fn set_state(&mut self, state: Option<UserToken>) {
        self.state = state;
    }

    /// Keep the released connection at most for `valid_for`.
    pub fn set_valid_for(&mut self, valid_for: Option<Duration>) {
        self.valid_for = valid_for;
    }

    /// Give the connection back to the manager, keeping it if it was marked
    /// reusable.
    pub fn release_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if self.reusable {
                self.manager
                    .release_connection(conn, self.state.take(), self.valid_for);
            } else {
                conn.shutdown();
                self.manager.release_connection(conn, None, None);
            }
        }
    }

    /// Shut the connection down and give it back to the manager.
    ///
    /// Calling this more than once, or after a release, does nothing.
    pub fn abort_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            log::debug!("aborting connection {:?}", conn.id());
            conn.shutdown();
            self.manager.release_connection(conn, None, None);
        }
    }
}

impl Drop for ConnectionHolder {
    fn drop(&mut self) {
        self.abort_connection();
    }
}

impl fmt::Debug for ConnectionHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHolder")
            .field("conn", &self.conn)
            .field("reusable", &self.reusable)
            .finish()
    }
}

/// Hand `res` to the caller, releasing `holder` once the body is done.
///
/// A body already held in memory releases the connection right away.
pub(crate) fn attach(
    res: Response<Body>,
    mut holder: ConnectionHolder,
    cancel: CancellationToken,
) -> Response<Body> {
    if res.body().is_repeatable() {
        holder.release_connection();
        return res;
    }
    let closed = match holder.conn {
        Some(ref conn) => conn.closed_token(),
        None => return res,
    };
    let interrupt = Box::pin(async move {
        tokio::select! {
            _ = cancel.cancelled() => crate::error::canceled(),
            _ = closed.cancelled() => crate::error::shutdown(),
        }
    });
    res.map(|body| {
        Body::wrap_stream(ReleasingBody {
            inner: Some(body),
            holder: Some(holder),
            interrupt,
        })
    })
}

// Streams the response body; the connection is released at its end and
// aborted on error, interruption or drop.
struct ReleasingBody {
    inner: Option<Body>,
    holder: Option<ConnectionHolder>,
    interrupt: Pin<Box<dyn Future<Output = crate::Error> + Send>>,
}

impl Stream for ReleasingBody {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let inner = match this.inner {
            Some(ref mut inner) => inner,
            None => return Poll::Ready(None),
        };
        if let Poll::Ready(err) = this.interrupt.as_mut().poll(cx) {
            this.inner = None;
            if let Some(mut holder) = this.holder.take() {
                holder.abort_connection();
            }
            return Poll::Ready(Some(Err(Box::new(err))));
        }
        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(None) => {
                this.inner = None;
                if let Some(mut holder) = this.holder.take() {
                    holder.release_connection();
                }
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                this.inner = None;
                if let Some(mut holder) = this.holder.take() {
                    holder.abort_connection();
                }
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}
