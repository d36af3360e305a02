use std::sync::Arc;

use http::{Request, Response, Uri};

use super::{ExecChain, Pending};
use crate::auth::{AuthScope, BasicCredentialsProvider, Credentials, CredentialsProvider};
use crate::context::ClientContext;
use crate::error;
use crate::host::HttpHost;
use crate::interceptor::HttpProcessor;
use crate::route::{HttpRoute, RouteInfo};
use crate::util::userinfo;
use crate::Body;

/// Prepares a request for the wire and runs the interceptors.
///
/// The request target becomes the absolute form when the request goes to a
/// plain proxy, and the origin form otherwise. Credentials in the URI's
/// user info are handed to the credentials provider and never sent as
/// part of the target.
pub struct ProtocolExec {
    next: Box<dyn ExecChain>,
    processor: HttpProcessor,
}

impl ProtocolExec {
    /// Wrap `next`, running requests and responses through `processor`.
    pub fn new(next: Box<dyn ExecChain>, processor: HttpProcessor) -> ProtocolExec {
        ProtocolExec { next, processor }
    }

    async fn run(
        &self,
        route: HttpRoute,
        mut request: Request<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Response<Body>> {
        let original = request.uri().clone();
        *request.uri_mut() = rewrite_uri(&original, &route)?;

        let target = HttpHost::from_uri(&original).unwrap_or_else(|| route.target_host().clone());
        if let Some((username, password)) = userinfo(&original) {
            let provider = match ctx.credentials_provider() {
                Some(provider) => provider.clone(),
                None => {
                    let provider: Arc<dyn CredentialsProvider> =
                        Arc::new(BasicCredentialsProvider::new());
                    ctx.set_credentials_provider(provider.clone());
                    provider
                }
            };
            provider.set_credentials(
                AuthScope::for_host(&target),
                Credentials::from_parts(username, password),
            );
        }

        ctx.set_target_host(target);
        ctx.set_route(route.clone());
        self.processor.process_request(&mut request, ctx)?;

        let mut res = self.next.execute(route, request, ctx).await?;
        self.processor.process_response(&mut res, ctx)?;
        Ok(res)
    }
}

/// The request target to send over `route`, without user info or
/// fragment.
pub(super) fn rewrite_uri(uri: &Uri, route: &HttpRoute) -> crate::Result<Uri> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| pq.starts_with('/'))
        .unwrap_or("/");
    let rewritten = if route.proxy_host().is_some() && !route.is_tunnelled() {
        let host = HttpHost::from_uri(uri).unwrap_or_else(|| route.target_host().clone());
        format!("{}{}", host.to_uri_prefix(), path)
    } else {
        path.to_owned()
    };
    rewritten.parse().map_err(error::builder)
}

impl ExecChain for ProtocolExec {
    fn execute<'a>(
        &'a self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &'a mut ClientContext,
    ) -> Pending<'a> {
        Box::pin(self.run(route, request, ctx))
    }
}
