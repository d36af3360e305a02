use std::sync::Arc;

use http::{Request, Response};

use super::{split_request, ExecChain, Pending};
use crate::context::ClientContext;
use crate::error;
use crate::retry::RetryHandler;
use crate::route::HttpRoute;
use crate::Body;

/// Sends a request again after an I/O error, if the [`RetryHandler`]
/// allows it.
///
/// Each attempt starts from the headers the request had when it entered
/// this stage.
pub struct RetryExec {
    next: Box<dyn ExecChain>,
    handler: Arc<dyn RetryHandler>,
}

impl RetryExec {
    /// Wrap `next`, consulting `handler` on I/O errors.
    pub fn new(next: Box<dyn ExecChain>, handler: Arc<dyn RetryHandler>) -> RetryExec {
        RetryExec { next, handler }
    }

    async fn run(
        &self,
        route: HttpRoute,
        mut request: Request<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Response<Body>> {
        let mut exec_count = 1;
        loop {
            let (attempt, kept) = split_request(request);
            let err = match self.next.execute(route.clone(), attempt, ctx).await {
                Ok(res) => return Ok(res),
                Err(err) => err,
            };
            if !err.is_io()
                || ctx.is_aborted()
                || !self.handler.retry_request(&err, exec_count, &kept, ctx)
            {
                return Err(err);
            }
            if !kept.body().is_repeatable() {
                log::debug!("cannot retry request with a non-repeatable request body");
                return Err(error::non_repeatable(Some(err)));
            }
            log::info!("I/O error ({err}) caught when processing request to {route}");
            log::info!("retrying request to {route}");
            request = kept;
            exec_count += 1;
        }
    }
}

impl ExecChain for RetryExec {
    fn execute<'a>(
        &'a self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &'a mut ClientContext,
    ) -> Pending<'a> {
        Box::pin(self.run(route, request, ctx))
    }
}
