use std::fmt;
use std::sync::Arc;

use http::header::{HeaderValue, AUTHORIZATION, HOST, PROXY_AUTHORIZATION};
use http::{Method, Request, Response, Uri, Version};
use tokio_util::sync::CancellationToken;

use super::holder::{attach, ConnectionHolder};
use super::{interruptible, receive, send, split_request, ExecChain, Pending};
use crate::auth::{AuthProtocolState, AuthenticationStrategy, ChallengeType, HttpAuthenticator};
use crate::connect::{ConnectionManager, ManagedConnection};
use crate::context::ClientContext;
use crate::error::{self, TunnelResponse};
use crate::host::HttpHost;
use crate::interceptor::{HttpProcessor, RequestClientConnControl};
use crate::route::{BasicRouteDirector, HttpRoute, RouteDirector, RouteInfo, RouteTracker, Step};
use crate::strategy::{ConnectionReuseStrategy, KeepAliveStrategy, UserTokenHandler};
use crate::Body;

/// The terminal stage: leases a connection, establishes its route, sends
/// the request and answers authentication challenges.
///
/// The response body streams from the leased connection. The connection
/// goes back to the pool once the body was read to its end, and is closed
/// if the body is dropped early.
pub struct MainExec {
    manager: Arc<dyn ConnectionManager>,
    reuse_strategy: Arc<dyn ConnectionReuseStrategy>,
    keep_alive_strategy: Arc<dyn KeepAliveStrategy>,
    proxy_processor: HttpProcessor,
    target_auth_strategy: Arc<dyn AuthenticationStrategy>,
    proxy_auth_strategy: Arc<dyn AuthenticationStrategy>,
    user_token_handler: Arc<dyn UserTokenHandler>,
    director: Arc<dyn RouteDirector>,
    authenticator: HttpAuthenticator,
}

impl MainExec {
    /// A terminal stage leasing connections from `manager`.
    ///
    /// `proxy_processor` runs on the `CONNECT` requests that open tunnels.
    pub fn new(
        manager: Arc<dyn ConnectionManager>,
        reuse_strategy: Arc<dyn ConnectionReuseStrategy>,
        keep_alive_strategy: Arc<dyn KeepAliveStrategy>,
        proxy_processor: Option<HttpProcessor>,
        target_auth_strategy: Arc<dyn AuthenticationStrategy>,
        proxy_auth_strategy: Arc<dyn AuthenticationStrategy>,
        user_token_handler: Arc<dyn UserTokenHandler>,
    ) -> MainExec {
        let proxy_processor = proxy_processor
            .unwrap_or_else(|| HttpProcessor::new().add_request_interceptor(RequestClientConnControl));
        MainExec {
            manager,
            reuse_strategy,
            keep_alive_strategy,
            proxy_processor,
            target_auth_strategy,
            proxy_auth_strategy,
            user_token_handler,
            director: Arc::new(BasicRouteDirector),
            authenticator: HttpAuthenticator::new(),
        }
    }

    /// Use `director` to plan route establishment.
    pub fn route_director(mut self, director: Arc<dyn RouteDirector>) -> MainExec {
        self.director = director;
        self
    }

    async fn run(
        &self,
        route: HttpRoute,
        mut request: Request<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Response<Body>> {
        let cancel = ctx.cancellation().clone();
        if cancel.is_cancelled() {
            return Err(error::canceled());
        }
        let user_token = ctx.user_token().cloned();
        let conn_request = self
            .manager
            .request_connection(&route, user_token.as_ref())
            .with_cancellation(cancel.clone());
        let timeout = ctx.request_config().connection_request_timeout();
        let managed = conn_request.get(timeout).await?;
        let closed = managed.closed_token();
        let mut holder = ConnectionHolder::new(self.manager.clone(), managed);

        if ctx.request_config().stale_connection_check() {
            let conn = holder.connection()?;
            if conn.is_open() {
                log::debug!("stale connection check");
                let inner = conn.connection()?;
                if inner.is_stale() {
                    log::debug!("stale connection detected");
                    if let Err(err) = inner.close().await {
                        log::debug!("error closing stale connection: {err}");
                    }
                }
            }
        }

        let original_target_auth = request.headers().contains_key(AUTHORIZATION);
        let original_proxy_auth = request.headers().contains_key(PROXY_AUTHORIZATION);
        let mut exec_count = 0u32;
        let response = loop {
            exec_count += 1;
            if exec_count > 1 && !request.body().is_repeatable() {
                return Err(error::non_repeatable(Some(
                    "cannot retry request with a non-repeatable request body",
                )));
            }
            if cancel.is_cancelled() {
                return Err(error::canceled());
            }

            let conn = holder.connection()?;
            if !conn.is_open() {
                log::debug!("opening connection {route}");
                let version = request.version();
                self.establish_route(conn, &route, version, ctx, &cancel, &closed)
                    .await?;
            }
            if let Some(timeout) = ctx.request_config().socket_timeout() {
                conn.connection()?.set_socket_timeout(Some(timeout));
            }

            log::debug!("executing request {} {}", request.method(), request.uri());
            if !request.headers().contains_key(AUTHORIZATION) {
                let state = ctx.auth_state_mut(ChallengeType::Target);
                log::debug!("target auth state: {:?}", state.state());
                self.authenticator
                    .generate_auth_response(&mut request, state, ChallengeType::Target);
            }
            if !request.headers().contains_key(PROXY_AUTHORIZATION) && !route.is_tunnelled() {
                let state = ctx.auth_state_mut(ChallengeType::Proxy);
                log::debug!("proxy auth state: {:?}", state.state());
                self.authenticator
                    .generate_auth_response(&mut request, state, ChallengeType::Proxy);
            }

            let (attempt, kept) = split_request(request);
            request = kept;
            ctx.set_request_sent(false);
            let inner = conn.connection()?;
            interruptible(&cancel, &closed, send(inner, attempt)).await?;
            ctx.set_request_sent(true);
            let res = interruptible(&cancel, &closed, receive(inner)).await?;

            if self.reuse_strategy.keep_alive(&request, &res, ctx) {
                let duration = self.keep_alive_strategy.keep_alive_duration(&res, ctx);
                match duration {
                    Some(d) => log::debug!("connection can be kept alive for {d:?}"),
                    None => log::debug!("connection can be kept alive indefinitely"),
                }
                holder.set_valid_for(duration);
                holder.mark_reusable();
            } else {
                holder.mark_non_reusable();
            }

            if !self.need_authentication(&route, &res, ctx) {
                break res;
            }

            if holder.is_reusable() {
                interruptible(&cancel, &closed, res.into_body().drain()).await?;
            } else {
                drop(res);
                let inner = holder.connection()?.connection()?;
                if let Err(err) = inner.close().await {
                    log::debug!("error closing connection: {err}");
                }
                reset_connection_based(ctx, ChallengeType::Proxy);
                reset_connection_based(ctx, ChallengeType::Target);
            }
            if !original_target_auth {
                request.headers_mut().remove(AUTHORIZATION);
            }
            if !original_proxy_auth {
                request.headers_mut().remove(PROXY_AUTHORIZATION);
            }
        };

        let mut user_token = user_token;
        if user_token.is_none() {
            user_token = self.user_token_handler.user_token(ctx);
            if let Some(ref token) = user_token {
                ctx.set_user_token(token.clone());
            }
        }
        if user_token.is_some() {
            holder.set_state(user_token);
        }
        Ok(attach(response, holder, cancel))
    }

    async fn establish_route(
        &self,
        conn: &mut ManagedConnection,
        route: &HttpRoute,
        version: Version,
        ctx: &mut ClientContext,
        cancel: &CancellationToken,
        closed: &CancellationToken,
    ) -> crate::Result<()> {
        let connect_timeout = ctx.request_config().connect_timeout();
        let mut tracker = RouteTracker::for_route(route);
        loop {
            let step = {
                let fact: Option<&dyn RouteInfo> = if tracker.is_connected() {
                    Some(&tracker)
                } else {
                    None
                };
                self.director.next_step(route, fact)
            };
            log::trace!("route step {step}: planned = {route}; current = {tracker}");
            match step {
                Step::ConnectTarget => {
                    let connecting = self.manager.connect(conn, route, connect_timeout, ctx);
                    interruptible(cancel, closed, connecting).await?;
                    tracker.connect_target(route.is_secure());
                }
                Step::ConnectProxy => {
                    let connecting = self.manager.connect(conn, route, connect_timeout, ctx);
                    interruptible(cancel, closed, connecting).await?;
                    let proxy = route.hop_target(0).clone();
                    tracker.connect_proxy(proxy, route.is_secure() && !route.is_tunnelled());
                }
                Step::TunnelTarget => {
                    let target = route.target_host().clone();
                    let tunnel = self
                        .create_tunnel(conn, route, &tracker, &target, version, ctx, cancel, closed)
                        .await?;
                    if tunnel == Tunnel::Lost {
                        tracker.reset();
                        continue;
                    }
                    log::debug!("tunnel to target created");
                    tracker.tunnel_target(false);
                }
                Step::TunnelProxy => {
                    // the next proxy is the first one not yet tracked
                    let hop = tracker.hop_count() - 1;
                    let proxy = route.hop_target(hop).clone();
                    let tunnel = self
                        .create_tunnel(conn, route, &tracker, &proxy, version, ctx, cancel, closed)
                        .await?;
                    if tunnel == Tunnel::Lost {
                        tracker.reset();
                        continue;
                    }
                    log::debug!("tunnel to proxy {proxy} created");
                    tracker.tunnel_proxy(proxy, false);
                }
                Step::LayerProtocol => {
                    let upgrading = self.manager.upgrade(conn, route, ctx);
                    interruptible(cancel, closed, upgrading).await?;
                    tracker.layer_protocol(route.is_secure());
                }
                Step::Unreachable => {
                    return Err(error::route(format!(
                        "unable to establish route: planned = {route}; current = {tracker}"
                    )));
                }
                Step::Complete => {
                    self.manager.route_complete(conn, route, ctx);
                    return Ok(());
                }
            }
        }
    }

    /// Open a tunnel to `hop` through the proxies `tracker` already reached.
    ///
    /// The last of those proxies answers the `CONNECT`. If it closes the
    /// connection while authenticating, only a connection to the first
    /// proxy can be reopened here; any longer chain is reported as
    /// [`Tunnel::Lost`] and has to be established again from the start.
    #[allow(clippy::too_many_arguments)]
    async fn create_tunnel(
        &self,
        conn: &mut ManagedConnection,
        route: &HttpRoute,
        tracker: &RouteTracker,
        hop: &HttpHost,
        version: Version,
        ctx: &mut ClientContext,
        cancel: &CancellationToken,
        closed: &CancellationToken,
    ) -> crate::Result<Tunnel> {
        // hops of the tracker are its proxies followed by the target
        let reached = tracker.hop_count() - 1;
        let proxy = tracker.hop_target(reached - 1).clone();
        let authority = hop.to_host_string();
        let connect_timeout = ctx.request_config().connect_timeout();
        loop {
            if !conn.is_open() {
                if reached > 1 {
                    log::debug!("connection to {proxy} closed, re-establishing {route}");
                    return Ok(Tunnel::Lost);
                }
                let connecting = self.manager.connect(conn, route, connect_timeout, ctx);
                interruptible(cancel, closed, connecting).await?;
            }

            let mut connect = Request::new(Body::empty());
            *connect.method_mut() = Method::CONNECT;
            *connect.uri_mut() = authority.parse::<Uri>().map_err(error::builder)?;
            *connect.version_mut() = version;
            connect
                .headers_mut()
                .insert(HOST, HeaderValue::from_str(&authority).map_err(error::builder)?);
            self.proxy_processor.process_request(&mut connect, ctx)?;
            connect.headers_mut().remove(PROXY_AUTHORIZATION);
            self.authenticator.generate_auth_response(
                &mut connect,
                ctx.auth_state_mut(ChallengeType::Proxy),
                ChallengeType::Proxy,
            );

            let (attempt, kept) = split_request(connect);
            let inner = conn.connection()?;
            interruptible(cancel, closed, send(inner, attempt)).await?;
            let receiving = async {
                inner
                    .receive_response()
                    .await
                    .map_err(crate::error::cast)
            };
            let res = interruptible(cancel, closed, receiving).await?;

            if res.status().is_informational() {
                return Err(error::protocol(format!(
                    "unexpected response to CONNECT request: {}",
                    res.status()
                )));
            }

            if ctx.request_config().authentication_enabled() {
                let strategy = &*self.proxy_auth_strategy;
                let requested = ctx.with_auth_state(ChallengeType::Proxy, |state, ctx| {
                    self.authenticator
                        .is_authentication_requested(&proxy, &res, strategy, state, ctx)
                });
                if requested
                    && ctx.with_auth_state(ChallengeType::Proxy, |state, ctx| {
                        self.authenticator
                            .handle_auth_challenge(&proxy, &res, strategy, state, ctx)
                    })
                {
                    if self.reuse_strategy.keep_alive(&kept, &res, ctx) {
                        log::debug!("connection kept alive");
                        interruptible(cancel, closed, res.into_body().drain()).await?;
                    } else {
                        drop(res);
                        if let Err(err) = conn.connection()?.close().await {
                            log::debug!("error closing connection: {err}");
                        }
                    }
                    continue;
                }
            }

            if !res.status().is_success() {
                let (parts, body) = res.into_parts();
                let body = match interruptible(cancel, closed, body.bytes()).await {
                    Ok(body) => body,
                    Err(err) => {
                        log::debug!("error reading CONNECT response body: {err}");
                        Default::default()
                    }
                };
                conn.shutdown();
                log::debug!("CONNECT refused by proxy: {}", parts.status);
                return Err(error::tunnel_refused(TunnelResponse::new(
                    parts.status,
                    parts.headers,
                    body,
                )));
            }
            return Ok(Tunnel::Open);
        }
    }

    fn need_authentication(
        &self,
        route: &HttpRoute,
        res: &Response<Body>,
        ctx: &mut ClientContext,
    ) -> bool {
        if !ctx.request_config().authentication_enabled() {
            return false;
        }
        let target = ctx
            .target_host()
            .cloned()
            .unwrap_or_else(|| route.target_host().clone());
        let target = match (target.port(), route.target_host().port()) {
            (None, Some(port)) => target.with_port(port),
            _ => target,
        };
        let proxy = route
            .proxy_host()
            .unwrap_or_else(|| route.target_host())
            .clone();
        let target_strategy = &*self.target_auth_strategy;
        let proxy_strategy = &*self.proxy_auth_strategy;

        let target_requested = ctx.with_auth_state(ChallengeType::Target, |state, ctx| {
            self.authenticator
                .is_authentication_requested(&target, res, target_strategy, state, ctx)
        });
        let proxy_requested = ctx.with_auth_state(ChallengeType::Proxy, |state, ctx| {
            self.authenticator
                .is_authentication_requested(&proxy, res, proxy_strategy, state, ctx)
        });

        if target_requested {
            return ctx.with_auth_state(ChallengeType::Target, |state, ctx| {
                self.authenticator
                    .handle_auth_challenge(&target, res, target_strategy, state, ctx)
            });
        }
        if proxy_requested {
            return ctx.with_auth_state(ChallengeType::Proxy, |state, ctx| {
                self.authenticator
                    .handle_auth_challenge(&proxy, res, proxy_strategy, state, ctx)
            });
        }
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tunnel {
    Open,
    // the connection closed with more than one proxy hop established
    Lost,
}

fn reset_connection_based(ctx: &mut ClientContext, kind: ChallengeType) {
    let state = ctx.auth_state_mut(kind);
    if state.state() == AuthProtocolState::Success && state.is_connection_based() {
        log::debug!("resetting {kind:?} auth state");
        state.reset();
    }
}

impl ExecChain for MainExec {
    fn execute<'a>(
        &'a self,
        route: HttpRoute,
        request: Request<Body>,
        ctx: &'a mut ClientContext,
    ) -> Pending<'a> {
        Box::pin(self.run(route, request, ctx))
    }
}

impl fmt::Debug for MainExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainExec")
            .field("proxy_processor", &self.proxy_processor)
            .finish()
    }
}
