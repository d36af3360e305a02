use std::sync::Arc;

use http::{Request, Response};

use super::{ExecChain, Pending};
use crate::backoff::{BackoffManager, BackoffStrategy};
use crate::context::ClientContext;
use crate::route::HttpRoute;
use crate::Body;

/// Reports every outcome to a [`BackoffManager`].
pub struct BackoffExec {
    next: Box<dyn ExecChain>,
    strategy: Arc<dyn BackoffStrategy>,
    manager: Arc<dyn BackoffManager>,
}

impl BackoffExec {
    /// Wrap `next`; `strategy` tells which outcomes mean overload.
    pub fn new(
        next: Box<dyn ExecChain>,
        strategy: Arc<dyn BackoffStrategy>,
        manager: Arc<dyn BackoffManager>,
    ) -> BackoffExec {
        BackoffExec {
            next,
            strategy,
            manager,
        }
    }

    async fn run(
        &self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Response<Body>> {
        match self.next.execute(route.clone(), request, ctx).await {
            Ok(res) => {
                if self.strategy.should_backoff_response(&res) {
                    self.manager.back_off(&route);
                } else {
                    self.manager.recover(&route);
                }
                Ok(res)
            }
            Err(err) => {
                if self.strategy.should_backoff_error(&err) {
                    self.manager.back_off(&route);
                }
                Err(err)
            }
        }
    }
}

impl ExecChain for BackoffExec {
    fn execute<'a>(
        &'a self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &'a mut ClientContext,
    ) -> Pending<'a> {
        Box::pin(self.run(route, request, ctx))
    }
}
