use std::fmt;
use std::sync::Arc;

use http::{Request, Response};

use super::holder::{attach, ConnectionHolder};
use super::protocol::rewrite_uri;
use super::{interruptible, receive, send, split_request, ExecChain, Pending};
use crate::connect::ConnectionManager;
use crate::context::ClientContext;
use crate::error;
use crate::host::HttpHost;
use crate::interceptor::HttpProcessor;
use crate::route::{HttpRoute, RouteInfo};
use crate::strategy::{ConnectionReuseStrategy, KeepAliveStrategy};
use crate::Body;

/// A terminal stage for direct routes only.
///
/// It does the work of the protocol stage itself, and does not
/// authenticate, tunnel or bind connections to user tokens.
pub struct MinimalExec {
    manager: Arc<dyn ConnectionManager>,
    reuse_strategy: Arc<dyn ConnectionReuseStrategy>,
    keep_alive_strategy: Arc<dyn KeepAliveStrategy>,
    processor: HttpProcessor,
}

impl MinimalExec {
    /// A stage leasing connections from `manager`.
    pub fn new(
        manager: Arc<dyn ConnectionManager>,
        reuse_strategy: Arc<dyn ConnectionReuseStrategy>,
        keep_alive_strategy: Arc<dyn KeepAliveStrategy>,
        processor: HttpProcessor,
    ) -> MinimalExec {
        MinimalExec {
            manager,
            reuse_strategy,
            keep_alive_strategy,
            processor,
        }
    }

    async fn run(
        &self,
        route: HttpRoute,
        mut request: Request<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Response<Body>> {
        if route.hop_count() > 1 {
            return Err(error::builder(format!(
                "minimal client cannot execute over {route}"
            )));
        }
        let cancel = ctx.cancellation().clone();
        if cancel.is_cancelled() {
            return Err(error::canceled());
        }

        let timeout = ctx.request_config().connection_request_timeout();
        let managed = self
            .manager
            .request_connection(&route, None)
            .with_cancellation(cancel.clone())
            .get(timeout)
            .await?;
        let closed = managed.closed_token();
        let mut holder = ConnectionHolder::new(self.manager.clone(), managed);

        let conn = holder.connection()?;
        if !conn.is_open() {
            let connect_timeout = ctx.request_config().connect_timeout();
            let connecting = self.manager.connect(conn, &route, connect_timeout, ctx);
            interruptible(&cancel, &closed, connecting).await?;
            self.manager.route_complete(conn, &route, ctx);
        }
        if let Some(timeout) = ctx.request_config().socket_timeout() {
            conn.connection()?.set_socket_timeout(Some(timeout));
        }

        let original = request.uri().clone();
        *request.uri_mut() = rewrite_uri(&original, &route)?;
        let target = HttpHost::from_uri(&original).unwrap_or_else(|| route.target_host().clone());
        ctx.set_target_host(target);
        ctx.set_route(route.clone());
        self.processor.process_request(&mut request, ctx)?;

        let (attempt, kept) = split_request(request);
        ctx.set_request_sent(false);
        let inner = conn.connection()?;
        interruptible(&cancel, &closed, send(inner, attempt)).await?;
        ctx.set_request_sent(true);
        let mut res = interruptible(&cancel, &closed, receive(inner)).await?;

        if self.reuse_strategy.keep_alive(&kept, &res, ctx) {
            let duration = self.keep_alive_strategy.keep_alive_duration(&res, ctx);
            holder.set_valid_for(duration);
            holder.mark_reusable();
        } else {
            holder.mark_non_reusable();
        }
        self.processor.process_response(&mut res, ctx)?;
        Ok(attach(res, holder, cancel))
    }
}

impl ExecChain for MinimalExec {
    fn execute<'a>(
        &'a self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &'a mut ClientContext,
    ) -> Pending<'a> {
        Box::pin(self.run(route, request, ctx))
    }
}

impl fmt::Debug for MinimalExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinimalExec")
            .field("processor", &self.processor)
            .finish()
    }
}
