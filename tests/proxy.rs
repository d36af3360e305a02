mod support;
use support::server::{self, get, reply, reply_text, reply_with, Exchange, Reply};

use std::sync::Arc;

use ferry::auth::{AuthScope, BasicCredentialsProvider, Credentials, CredentialsProvider};
use ferry::route::{HttpRoute, LayerType, RoutePlanner, TunnelType};
use ferry::{Body, ClientContext, HttpHost, Proxy, RequestConfig};
use http::header::{HeaderName, PROXY_AUTHORIZATION};
use http::{Method, Request};

const PAT: &str = "Basic cGF0OnB3";

fn proxy_connection() -> HeaderName {
    HeaderName::from_static("proxy-connection")
}

fn pat() -> Arc<BasicCredentialsProvider> {
    let provider = BasicCredentialsProvider::new();
    provider.set_credentials(
        AuthScope::new("proxy.test", Some(3128)),
        Credentials::new("pat", "pw"),
    );
    Arc::new(provider)
}

fn guarded(e: &Exchange) -> Reply {
    if e.host != "proxy.test" {
        return reply(200);
    }
    match e.headers.get(PROXY_AUTHORIZATION) {
        Some(value) if value == PAT => reply(200),
        _ => reply_with(407, &[("proxy-authenticate", "Basic realm=\"proxy\"")]),
    }
}

#[tokio::test]
async fn http_proxy_gets_absolute_form() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply_text(200, "proxied"));
    let client = server
        .client()
        .proxy(Proxy::http("http://proxy.test:3128").unwrap())
        .build()
        .unwrap();

    let res = client
        .execute(get("http://origin.test/path?q=1"))
        .await
        .unwrap();
    assert_eq!(res.into_body().bytes().await.unwrap(), "proxied");

    let seen = server.exchanges();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].host, "proxy.test");
    assert_eq!(seen[0].uri, "http://origin.test/path?q=1");
    assert_eq!(seen[0].headers[proxy_connection()], "Keep-Alive");

    let connects = server.connects();
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].host, "proxy.test");
    assert_eq!(connects[0].remote, "127.0.0.1:3128".parse().unwrap());
}

#[tokio::test]
async fn http_proxy_skips_https() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server
        .client()
        .proxy(Proxy::http("http://proxy.test:3128").unwrap())
        .build()
        .unwrap();

    client.execute(get("https://secure.test/")).await.unwrap();
    assert_eq!(server.connects()[0].host, "secure.test");
}

#[tokio::test]
async fn request_config_proxy_overrides() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server.client().build().unwrap();

    let mut req = get("http://origin.test/");
    req.extensions_mut().insert(
        RequestConfig::builder()
            .proxy(HttpHost::http("proxy.test", Some(3128)))
            .build(),
    );
    client.execute(req).await.unwrap();

    let seen = server.exchanges();
    assert_eq!(seen[0].host, "proxy.test");
    assert_eq!(seen[0].uri, "http://origin.test/");
}

#[tokio::test]
async fn https_is_tunnelled() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server
        .client()
        .proxy(Proxy::https("http://proxy.test:3128").unwrap())
        .build()
        .unwrap();

    let res = client.execute(get("https://secure.test/x")).await.unwrap();
    assert_eq!(res.status(), 200);
    client.execute(get("https://secure.test/y")).await.unwrap();

    let seen = server.exchanges();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].method, Method::CONNECT);
    assert_eq!(seen[0].host, "proxy.test");
    assert_eq!(seen[0].uri, "secure.test:443");
    assert_eq!(seen[1].method, Method::GET);
    assert_eq!(seen[1].host, "secure.test");
    assert_eq!(seen[1].uri, "/x");
    // the established tunnel is pooled
    assert_eq!(seen[2].conn, seen[1].conn);
    assert_eq!(seen[2].uri, "/y");

    assert_eq!(server.layered(), vec!["secure.test".to_owned()]);
    assert_eq!(server.connects().len(), 1);
    assert_eq!(server.connects()[0].host, "proxy.test");
}

#[tokio::test]
async fn tunnel_refused() {
    let _ = env_logger::try_init();

    let server = server::http(|e| {
        if e.method == Method::CONNECT {
            reply_text(403, "denied")
        } else {
            reply(200)
        }
    });
    let client = server
        .client()
        .proxy(Proxy::https("http://proxy.test:3128").unwrap())
        .build()
        .unwrap();

    let err = client.execute(get("https://secure.test/")).await.unwrap_err();
    assert!(err.is_tunnel_refused());
    let refused = err.tunnel_response().unwrap();
    assert_eq!(refused.status(), 403);
    assert_eq!(refused.body().as_ref(), b"denied");
    assert_eq!(server.exchanges().len(), 1);
    assert!(server.layered().is_empty());
}

#[tokio::test]
async fn tunnel_answers_proxy_challenge() {
    let _ = env_logger::try_init();

    let server = server::http(guarded);
    let client = server
        .client()
        .proxy(Proxy::https("http://proxy.test:3128").unwrap())
        .credentials_provider(pat())
        .build()
        .unwrap();

    let res = client.execute(get("https://secure.test/")).await.unwrap();
    assert_eq!(res.status(), 200);

    let seen = server.exchanges();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].method, Method::CONNECT);
    assert!(seen[0].headers.get(PROXY_AUTHORIZATION).is_none());
    assert_eq!(seen[1].method, Method::CONNECT);
    assert_eq!(seen[1].headers[PROXY_AUTHORIZATION], PAT);
    assert_eq!(seen[2].host, "secure.test");
    // credentials for the proxy never reach the target
    assert!(seen[2].headers.get(PROXY_AUTHORIZATION).is_none());
}

#[tokio::test]
async fn tunnel_without_proxy_credentials_is_refused() {
    let _ = env_logger::try_init();

    let server = server::http(guarded);
    let client = server
        .client()
        .proxy(Proxy::https("http://proxy.test:3128").unwrap())
        .build()
        .unwrap();

    let err = client.execute(get("https://secure.test/")).await.unwrap_err();
    assert!(err.is_tunnel_refused());
    assert_eq!(err.tunnel_response().unwrap().status(), 407);
    assert_eq!(server.exchanges().len(), 1);
}

#[tokio::test]
async fn plain_proxy_challenge_is_answered() {
    let _ = env_logger::try_init();

    let server = server::http(guarded);
    let client = server
        .client()
        .proxy(Proxy::all("http://proxy.test:3128").unwrap())
        .credentials_provider(pat())
        .build()
        .unwrap();

    let res = client.execute(get("http://origin.test/")).await.unwrap();
    assert_eq!(res.status(), 200);

    let seen = server.exchanges();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].uri, "http://origin.test/");
    assert_eq!(seen[1].headers[PROXY_AUTHORIZATION], PAT);
}

#[tokio::test]
async fn custom_proxy_rule() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let proxy_url = ferry::Url::parse("http://proxy.test:3128").unwrap();
    let client = server
        .client()
        .proxy(Proxy::custom(move |url| {
            if url.host_str() == Some("origin.test") {
                Some(proxy_url.clone())
            } else {
                None
            }
        }))
        .build()
        .unwrap();

    client.execute(get("http://origin.test/")).await.unwrap();
    client.execute(get("http://other.test/")).await.unwrap();

    let seen = server.exchanges();
    assert_eq!(seen[0].host, "proxy.test");
    assert_eq!(seen[1].host, "other.test");
    assert_eq!(seen[1].uri, "/");
}

// Tunnels every request through proxy.test, then other.test.
struct TwoProxies;

impl RoutePlanner for TwoProxies {
    fn determine_route(
        &self,
        target: &HttpHost,
        _request: &Request<Body>,
        _ctx: &ClientContext,
    ) -> ferry::Result<HttpRoute> {
        HttpRoute::new(
            HttpHost::https(target.hostname(), Some(443)),
            None,
            vec![
                HttpHost::http("proxy.test", Some(3128)),
                HttpHost::http("other.test", Some(3128)),
            ],
            true,
            TunnelType::Tunnelled,
            LayerType::Layered,
        )
    }
}

fn seen_as(method: Method, host: &str, uri: &str) -> (Method, String, String) {
    (method, host.to_owned(), uri.to_owned())
}

fn summary(seen: &[Exchange]) -> Vec<(Method, String, String)> {
    seen.iter()
        .map(|e| (e.method.clone(), e.host.clone(), e.uri.to_string()))
        .collect()
}

#[tokio::test]
async fn proxy_chain_is_tunnelled_hop_by_hop() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server
        .client()
        .route_planner(Arc::new(TwoProxies))
        .build()
        .unwrap();

    let res = client.execute(get("https://secure.test/x")).await.unwrap();
    assert_eq!(res.status(), 200);

    assert_eq!(
        summary(&server.exchanges()),
        vec![
            seen_as(Method::CONNECT, "proxy.test", "other.test:3128"),
            seen_as(Method::CONNECT, "other.test", "secure.test:443"),
            seen_as(Method::GET, "secure.test", "/x"),
        ]
    );
    assert_eq!(server.connects().len(), 1);
    assert_eq!(server.connects()[0].host, "proxy.test");
    assert_eq!(server.layered(), vec!["secure.test".to_owned()]);
}

#[tokio::test]
async fn proxy_chain_is_rebuilt_after_inner_proxy_closes() {
    let _ = env_logger::try_init();

    let server = server::http(|e| {
        let inner_challenge = e.method == Method::CONNECT
            && e.host == "other.test"
            && !e.headers.contains_key(PROXY_AUTHORIZATION);
        if inner_challenge {
            reply_with(
                407,
                &[
                    ("proxy-authenticate", "Basic realm=\"inner\""),
                    ("connection", "close"),
                ],
            )
        } else {
            reply(200)
        }
    });
    let provider = BasicCredentialsProvider::new();
    provider.set_credentials(
        AuthScope::new("other.test", Some(3128)),
        Credentials::new("pat", "pw"),
    );
    let client = server
        .client()
        .route_planner(Arc::new(TwoProxies))
        .credentials_provider(Arc::new(provider))
        .build()
        .unwrap();

    let res = client.execute(get("https://secure.test/")).await.unwrap();
    assert_eq!(res.status(), 200);

    let seen = server.exchanges();
    assert_eq!(
        summary(&seen),
        vec![
            seen_as(Method::CONNECT, "proxy.test", "other.test:3128"),
            seen_as(Method::CONNECT, "other.test", "secure.test:443"),
            // the closed connection is reopened through both proxies
            seen_as(Method::CONNECT, "proxy.test", "other.test:3128"),
            seen_as(Method::CONNECT, "other.test", "secure.test:443"),
            seen_as(Method::GET, "secure.test", "/"),
        ]
    );
    assert_eq!(seen[3].headers[PROXY_AUTHORIZATION], PAT);
    let hosts: Vec<_> = server.connects().into_iter().map(|c| c.host).collect();
    assert_eq!(hosts, vec!["proxy.test", "proxy.test"]);
}
