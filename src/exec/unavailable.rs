use std::sync::Arc;

use http::{Request, Response};

use super::{split_request, ExecChain, Pending};
use crate::context::ClientContext;
use crate::error;
use crate::retry::ServiceUnavailableRetryStrategy;
use crate::route::HttpRoute;
use crate::Body;

/// Sends a request again, after a pause, when the response asks for it.
pub struct ServiceUnavailableRetryExec {
    next: Box<dyn ExecChain>,
    strategy: Arc<dyn ServiceUnavailableRetryStrategy>,
}

impl ServiceUnavailableRetryExec {
    /// Wrap `next`, retrying what `strategy` accepts.
    pub fn new(
        next: Box<dyn ExecChain>,
        strategy: Arc<dyn ServiceUnavailableRetryStrategy>,
    ) -> ServiceUnavailableRetryExec {
        ServiceUnavailableRetryExec { next, strategy }
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
            let res = self.next.execute(route.clone(), attempt, ctx).await?;
            if !kept.body().is_repeatable() || !self.strategy.retry_request(&res, exec_count, ctx) {
                return Ok(res);
            }
            drop(res);

            let interval = self.strategy.retry_interval();
            log::trace!("wait for {interval:?} before retrying {}", kept.uri());
            let cancel = ctx.cancellation().clone();
            tokio::select! {
                _ = cancel.cancelled() => return Err(error::canceled()),
                _ = tokio::time::sleep(interval) => {}
            }
            request = kept;
            exec_count += 1;
        }
    }
}

impl ExecChain for ServiceUnavailableRetryExec {
    fn execute<'a>(
        &'a self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &'a mut ClientContext,
    ) -> Pending<'a> {
        Box::pin(self.run(route, request, ctx))
    }
}
