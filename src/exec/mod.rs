//! The execution chain.
//!
//! A request travels through a fixed stack of stages, each one an
//! [`ExecChain`] wrapping the next:
//!
//! ```text
//! RetryExec -> RedirectExec -> BackoffExec -> ServiceUnavailableRetryExec
//!           -> ProtocolExec -> MainExec
//! ```
//!
//! Outer stages see the symptoms inner stages cannot resolve: the retry
//! stage sees I/O errors, the redirect stage sees redirect responses, and
//! so on. [`MainExec`] is terminal; it leases a connection, establishes
//! its route and answers authentication challenges.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::connect::HttpConnection;
use crate::context::ClientContext;
use crate::error::BoxError;
use crate::route::HttpRoute;
use crate::Body;

mod backoff;
mod holder;
mod main;
mod minimal;
mod protocol;
mod redirect;
mod retry;
mod unavailable;

pub use self::backoff::BackoffExec;
pub use self::holder::ConnectionHolder;
pub use self::main::MainExec;
pub use self::minimal::MinimalExec;
pub use self::protocol::ProtocolExec;
pub use self::redirect::RedirectExec;
pub use self::retry::RetryExec;
pub use self::unavailable::ServiceUnavailableRetryExec;

/// The future of a response.
pub type Pending<'a> = Pin<Box<dyn Future<Output = crate::Result<Response<Body>>> + Send + 'a>>;

/// One stage of the execution chain.
pub trait ExecChain: Send + Sync {
    /// Execute `request` over `route`.
    fn execute<'a>(
        &'a self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &'a mut ClientContext,
    ) -> Pending<'a>;
}

/// Split `req` into the copy to send now and the copy kept for a later
/// attempt.
///
/// When the body cannot be replayed, the kept copy carries an already
/// consumed stream, so it reports itself as not repeatable.
pub(crate) fn split_request(req: Request<Body>) -> (Request<Body>, Request<Body>) {
    let body = match req.body().try_clone() {
        Some(body) => body,
        None => Body::wrap_stream(futures_util::stream::empty::<Result<Bytes, BoxError>>()),
    };
    let mut kept = Request::new(body);
    *kept.method_mut() = req.method().clone();
    *kept.uri_mut() = req.uri().clone();
    *kept.version_mut() = req.version();
    *kept.headers_mut() = req.headers().clone();
    *kept.extensions_mut() = req.extensions().clone();
    (req, kept)
}

/// Run `fut` unless the request is aborted or its connection is closed
/// by the pool first.
pub(crate) async fn interruptible<T, F>(
    cancel: &CancellationToken,
    closed: &CancellationToken,
    fut: F,
) -> crate::Result<T>
where
    F: Future<Output = crate::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(crate::error::canceled()),
        _ = closed.cancelled() => Err(crate::error::shutdown()),
        res = fut => res,
    }
}

/// Send `request` on `conn`.
pub(crate) async fn send(
    conn: &mut dyn HttpConnection,
    request: Request<Body>,
) -> crate::Result<()> {
    conn.send_request(request)
        .await
        .map_err(crate::error::cast)
}

/// Read the final response from `conn`, skipping interim `1xx` responses
/// other than `101 Switching Protocols`.
pub(crate) async fn receive(conn: &mut dyn HttpConnection) -> crate::Result<Response<Body>> {
    loop {
        let res = conn
            .receive_response()
            .await
            .map_err(crate::error::cast)?;
        if res.status().is_informational() && res.status() != StatusCode::SWITCHING_PROTOCOLS {
            log::trace!("skipping interim response {}", res.status());
            continue;
        }
        return Ok(res);
    }
}
