use std::sync::Arc;

use http::{Request, Response};

use super::{split_request, ExecChain, Pending};
use crate::auth::ChallengeType;
use crate::context::ClientContext;
use crate::error;
use crate::host::{default_port, HttpHost};
use crate::into_url::try_url;
use crate::redirect::{remove_sensitive_headers, RedirectStrategy};
use crate::route::{HttpRoute, RouteInfo, RoutePlanner};
use crate::Body;

/// Follows redirects the [`RedirectStrategy`] accepts.
///
/// Every hop is planned again, so a redirect to another host may take
/// another route. Credentials are not carried over to another host.
pub struct RedirectExec {
    next: Box<dyn ExecChain>,
    planner: Arc<dyn RoutePlanner>,
    strategy: Arc<dyn RedirectStrategy>,
}

impl RedirectExec {
    /// Wrap `next`, planning redirect routes with `planner`.
    pub fn new(
        next: Box<dyn ExecChain>,
        planner: Arc<dyn RoutePlanner>,
        strategy: Arc<dyn RedirectStrategy>,
    ) -> RedirectExec {
        RedirectExec {
            next,
            planner,
            strategy,
        }
    }

    async fn run(
        &self,
        mut route: HttpRoute,
        mut request: Request<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Response<Body>> {
        ctx.redirect_locations_mut().clear();
        let max_redirects = ctx.request_config().max_redirects();
        let mut redirect_count = 0;
        loop {
            let (attempt, current) = split_request(request);
            let res = self.next.execute(route.clone(), attempt, ctx).await?;

            if !ctx.request_config().redirects_enabled()
                || !self.strategy.is_redirected(&current, &res, ctx)
            {
                return Ok(res);
            }

            let previous = try_url(current.uri())
                .ok_or_else(|| error::builder("request URI is not absolute"))?;
            if redirect_count >= max_redirects {
                return Err(error::redirect(
                    format!("Maximum redirects ({max_redirects}) exceeded"),
                    previous,
                ));
            }
            redirect_count += 1;

            let mut next = self.strategy.get_redirect(&current, &res, ctx)?;
            let location = try_url(next.uri())
                .ok_or_else(|| error::builder("redirect URI is not absolute"))?;
            remove_sensitive_headers(next.headers_mut(), &location, &previous);

            let target = HttpHost::from_uri(next.uri())
                .ok_or_else(|| error::redirect("redirect location has no host", location))?;
            if !same_host(route.target_host(), &target) {
                log::debug!("Resetting target auth state");
                ctx.auth_state_mut(ChallengeType::Target).reset();
                let proxy_state = ctx.auth_state_mut(ChallengeType::Proxy);
                if proxy_state.is_connection_based() {
                    log::debug!("Resetting proxy auth state");
                    proxy_state.reset();
                }
            }

            route = self.planner.determine_route(&target, &next, ctx)?;
            log::debug!("Redirecting to '{}' via {route}", next.uri());
            if let Err(err) = res.into_body().drain().await {
                log::debug!("error draining redirect response: {err}");
            }
            request = next;
        }
    }
}

fn same_host(a: &HttpHost, b: &HttpHost) -> bool {
    let port = |h: &HttpHost| h.port().or_else(|| default_port(h.scheme()));
    a.scheme() == b.scheme() && a.hostname() == b.hostname() && port(a) == port(b)
}

impl ExecChain for RedirectExec {
    fn execute<'a>(
        &'a self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &'a mut ClientContext,
    ) -> Pending<'a> {
        Box::pin(self.run(route, request, ctx))
    }
}
