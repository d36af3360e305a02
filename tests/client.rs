mod support;
use support::server::{self, get, reply, reply_text, Reply};
use support::DEFAULT_USER_AGENT;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ferry::strategy::UserTokenHandler;
use ferry::{Body, ClientContext, RequestConfig, UserToken};
use http::header::{ACCEPT, CONNECTION, HOST, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Request, Response};

#[tokio::test]
async fn response_text() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply_text(200, "Hello"));
    let client = server.client().build().unwrap();

    let res = client.execute(get("http://api.test/text")).await.unwrap();
    assert_eq!(res.status(), 200);
    let body = res.into_body().bytes().await.unwrap();
    assert_eq!(body, "Hello");

    let seen = server.exchanges();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].host, "api.test");
    assert_eq!(seen[0].uri, "/text");
    assert_eq!(seen[0].headers[HOST], "api.test");
    assert_eq!(seen[0].headers[USER_AGENT], DEFAULT_USER_AGENT);

    let connects = server.connects();
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].remote, "127.0.0.1:80".parse().unwrap());
}

#[tokio::test]
async fn request_body_is_sent() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(201));
    let client = server.client().build().unwrap();

    let mut req = Request::new(Body::from("payload"));
    *req.method_mut() = Method::POST;
    *req.uri_mut() = "http://api.test:8080/items?x=1".parse().unwrap();
    let res = client.execute(req).await.unwrap();
    assert_eq!(res.status(), 201);

    let seen = server.exchanges();
    assert_eq!(seen[0].method, Method::POST);
    assert_eq!(seen[0].uri, "/items?x=1");
    assert_eq!(seen[0].headers[HOST], "api.test:8080");
    assert_eq!(seen[0].body, Bytes::from_static(b"payload"));
    assert_eq!(server.connects()[0].remote, "127.0.0.1:8080".parse().unwrap());
}

#[tokio::test]
async fn relative_uri_is_rejected() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server.client().build().unwrap();

    let err = client.execute(get("/relative")).await.unwrap_err();
    assert!(err.is_builder());
    assert!(server.exchanges().is_empty());
}

#[tokio::test]
async fn default_headers_and_user_agent() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/plain"));
    let client = server
        .client()
        .default_headers(headers)
        .user_agent("tester/1.0")
        .build()
        .unwrap();

    let mut req = get("http://api.test/");
    req.headers_mut()
        .insert(ACCEPT, HeaderValue::from_static("application/json"));
    client.execute(req).await.unwrap();
    client.execute(get("http://api.test/")).await.unwrap();

    let seen = server.exchanges();
    assert_eq!(seen[0].headers[ACCEPT], "application/json");
    assert_eq!(seen[1].headers[ACCEPT], "text/plain");
    assert_eq!(seen[1].headers[USER_AGENT], "tester/1.0");
    assert_eq!(seen[1].headers[CONNECTION], "Keep-Alive");
}

#[tokio::test]
async fn connections_are_reused() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server.client().max_per_route(1).build().unwrap();

    for _ in 0..3 {
        let res = client.execute(get("http://api.test/")).await.unwrap();
        assert_eq!(res.status(), 200);
    }

    let seen = server.exchanges();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|e| e.conn == seen[0].conn));
    assert_eq!(server.connects().len(), 1);
}

#[tokio::test]
async fn connection_close_is_not_reused() {
    let _ = env_logger::try_init();

    let server = server::http(|_| server::reply_with(200, &[("connection", "close")]));
    let client = server.client().build().unwrap();

    client.execute(get("http://api.test/")).await.unwrap();
    client.execute(get("http://api.test/")).await.unwrap();

    let seen = server.exchanges();
    assert_ne!(seen[0].conn, seen[1].conn);
    assert_eq!(server.connects().len(), 2);
}

fn streaming() -> Reply {
    let body = Body::wrap_stream(futures_util::stream::pending::<Result<Bytes, io::Error>>());
    Response::new(body).into()
}

#[tokio::test]
async fn pool_timeout_while_body_is_held() {
    let _ = env_logger::try_init();

    let server = server::http(|e| {
        if e.uri == "/stream" {
            streaming()
        } else {
            reply(200)
        }
    });
    let client = server
        .client()
        .max_per_route(1)
        .default_request_config(
            RequestConfig::builder()
                .connection_request_timeout(Duration::from_millis(100))
                .build(),
        )
        .build()
        .unwrap();

    let held = client.execute(get("http://api.test/stream")).await.unwrap();

    let err = client.execute(get("http://api.test/")).await.unwrap_err();
    assert!(err.is_pool_timeout());
    assert!(err.is_timeout());
    assert_eq!(server.exchanges().len(), 1);

    drop(held);
    let res = client.execute(get("http://api.test/")).await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn per_route_cap_is_separate() {
    let _ = env_logger::try_init();

    let server = server::http(|e| {
        if e.uri == "/stream" {
            streaming()
        } else {
            reply(200)
        }
    });
    let client = server
        .client()
        .max_per_route(1)
        .default_request_config(
            RequestConfig::builder()
                .connection_request_timeout(Duration::from_millis(100))
                .build(),
        )
        .build()
        .unwrap();

    let _held = client.execute(get("http://api.test/stream")).await.unwrap();
    let res = client.execute(get("http://other.test/")).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(server.connects().len(), 2);
}

#[tokio::test]
async fn shutdown_fails_later_requests() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server.client().build().unwrap();
    client.execute(get("http://api.test/")).await.unwrap();

    client.shutdown();
    let err = client.execute(get("http://api.test/")).await.unwrap_err();
    assert!(err.is_shutdown());
}

#[tokio::test]
async fn abort_interrupts_exchange() {
    let _ = env_logger::try_init();

    let server = server::http(|_| Reply::Hang);
    let client = server.client().build().unwrap();

    let mut ctx = ClientContext::new();
    let handle = ctx.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    });

    let err = client
        .execute_with(get("http://api.test/"), &mut ctx)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(server.exchanges().len(), 1);
}

#[tokio::test]
async fn abort_interrupts_pool_wait() {
    let _ = env_logger::try_init();

    let server = server::http(|e| {
        if e.uri == "/stream" {
            streaming()
        } else {
            reply(200)
        }
    });
    let client = server.client().max_per_route(1).build().unwrap();
    let held = client.execute(get("http://api.test/stream")).await.unwrap();

    let mut ctx = ClientContext::new();
    let handle = ctx.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        handle.abort();
    });

    // no connection request timeout, so only the abort ends the wait
    let err = client
        .execute_with(get("http://api.test/"), &mut ctx)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(server.exchanges().len(), 1);

    // the held body was never read, so its connection is closed
    drop(held);
    let res = client.execute(get("http://api.test/")).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(server.connects().len(), 2);
}

#[tokio::test]
async fn socket_timeout_is_not_retried() {
    let _ = env_logger::try_init();

    let server = server::http(|_| Reply::Hang);
    let client = server.client().build().unwrap();

    let mut req = get("http://api.test/slow");
    req.extensions_mut().insert(
        RequestConfig::builder()
            .socket_timeout(Duration::from_millis(50))
            .build(),
    );
    let err = client.execute(req).await.unwrap_err();
    assert!(err.is_request());
    assert!(err.is_timeout());
    assert_eq!(err.url().map(|u| u.as_str()), Some("http://api.test/slow"));
    assert_eq!(server.exchanges().len(), 1);
}

#[tokio::test]
async fn connect_refused() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    server.refuse("api.test");
    let client = server.client().disable_automatic_retries().build().unwrap();

    let err = client.execute(get("http://api.test/")).await.unwrap_err();
    assert!(err.is_connect());
    assert!(server.exchanges().is_empty());
}

#[tokio::test]
async fn unknown_host_fails_to_connect() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server.client().build().unwrap();

    let err = client.execute(get("http://nowhere.test/")).await.unwrap_err();
    assert!(err.is_connect());
}

#[tokio::test]
async fn connections_follow_their_user() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server.client().build().unwrap();

    let mut alice = ClientContext::new();
    alice.set_user_token(UserToken::new("alice"));
    client
        .execute_with(get("http://api.test/"), &mut alice)
        .await
        .unwrap();

    // an anonymous session cannot take a connection bound to alice
    let mut anonymous = ClientContext::new();
    client
        .execute_with(get("http://api.test/"), &mut anonymous)
        .await
        .unwrap();
    assert!(anonymous.user_token().is_none());

    client
        .execute_with(get("http://api.test/"), &mut alice)
        .await
        .unwrap();

    let seen = server.exchanges();
    assert_ne!(seen[0].conn, seen[1].conn);
    assert_eq!(seen[0].conn, seen[2].conn);
}

struct Fixed;

impl UserTokenHandler for Fixed {
    fn user_token(&self, _ctx: &ClientContext) -> Option<UserToken> {
        Some(UserToken::new("alice"))
    }
}

#[tokio::test]
async fn user_token_handler_binds_session() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply(200));
    let client = server
        .client()
        .user_token_handler(Arc::new(Fixed))
        .build()
        .unwrap();

    let mut ctx = ClientContext::new();
    client
        .execute_with(get("http://api.test/"), &mut ctx)
        .await
        .unwrap();
    assert_eq!(ctx.user_token().map(|t| t.as_str()), Some("alice"));

    client
        .execute_with(get("http://api.test/"), &mut ctx)
        .await
        .unwrap();
    // a fresh session leases before it has a token
    client.execute(get("http://api.test/")).await.unwrap();

    let seen = server.exchanges();
    assert_eq!(seen[0].conn, seen[1].conn);
    assert_ne!(seen[0].conn, seen[2].conn);
}

#[tokio::test]
async fn minimal_client_executes_direct_routes() {
    let _ = env_logger::try_init();

    let server = server::http(|_| reply_text(200, "minimal"));
    let client = server.client().build_minimal().unwrap();

    let res = client.execute(get("http://api.test/m")).await.unwrap();
    assert_eq!(res.into_body().bytes().await.unwrap(), "minimal");
    assert_eq!(server.exchanges()[0].uri, "/m");
}
