mod support;
use support::server::{self, get, reply, Reply};

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ferry::backoff::{AimdBackoffManager, DefaultBackoffStrategy};
use ferry::connect::{ConnectionConfig, DefaultConnectionOperator, PoolingConnectionManager};
use ferry::pool::ConnPoolControl;
use ferry::retry::{DefaultRetryHandler, DefaultServiceUnavailableRetryStrategy};
use ferry::route::HttpRoute;
use ferry::{Body, HttpHost};
use http::{Method, Request};

fn failing_first(failures: usize, kind: io::ErrorKind) -> impl Fn(&server::Exchange) -> Reply {
    let count = AtomicUsize::new(0);
    move |_| {
        if count.fetch_add(1, Ordering::SeqCst) < failures {
            Reply::Fail(kind)
        } else {
            reply(200)
        }
    }
}

#[tokio::test]
async fn idempotent_request_is_retried() {
    let _ = env_logger::try_init();

    let server = server::http(failing_first(2, io::ErrorKind::ConnectionReset));
    let client = server.client().build().unwrap();

    let res = client.execute(get("http://api.test/")).await.unwrap();
    assert_eq!(res.status(), 200);

    let seen = server.exchanges();
    assert_eq!(seen.len(), 3);
    // a failed connection is never reused
    assert_ne!(seen[0].conn, seen[1].conn);
    assert_eq!(server.connects().len(), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let _ = env_logger::try_init();

    let server = server::http(failing_first(10, io::ErrorKind::ConnectionReset));
    let client = server
        .client()
        .retry_handler(Arc::new(DefaultRetryHandler::new(1, false)))
        .build()
        .unwrap();

    let err = client.execute(get("http://api.test/")).await.unwrap_err();
    assert!(err.is_request());
    assert_eq!(server.exchanges().len(), 2);
}

#[tokio::test]
async fn sent_post_is_not_retried() {
    let _ = env_logger::try_init();

    let server = server::http(failing_first(1, io::ErrorKind::ConnectionReset));
    let client = server.client().build().unwrap();

    let mut req = Request::new(Body::from("x"));
    *req.method_mut() = Method::POST;
    *req.uri_mut() = "http://api.test/".parse().unwrap();
    let err = client.execute(req).await.unwrap_err();
    assert!(err.is_request());
    assert_eq!(server.exchanges().len(), 1);
}

#[tokio::test]
async fn sent_post_retried_when_enabled() {
    let _ = env_logger::try_init();

    let server = server::http(failing_first(1, io::ErrorKind::ConnectionReset));
    let client = server
        .client()
        .retry_handler(Arc::new(DefaultRetryHandler::new(3, true)))
        .build()
        .unwrap();

    let mut req = Request::new(Body::from("x"));
    *req.method_mut() = Method::POST;
    *req.uri_mut() = "http://api.test/".parse().unwrap();
    let res = client.execute(req).await.unwrap();
    assert_eq!(res.status(), 200);

    let seen = server.exchanges();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].body, "x");
}

#[tokio::test]
async fn streaming_body_is_not_retried() {
    let _ = env_logger::try_init();

    let server = server::http(failing_first(1, io::ErrorKind::ConnectionReset));
    let client = server.client().build().unwrap();

    let chunks: Vec<Result<Bytes, io::Error>> = vec![Ok(Bytes::from_static(b"chunk"))];
    let mut req = Request::new(Body::wrap_stream(futures_util::stream::iter(chunks)));
    *req.method_mut() = Method::PUT;
    *req.uri_mut() = "http://api.test/upload".parse().unwrap();
    let err = client.execute(req).await.unwrap_err();
    assert!(err.is_non_repeatable());
    assert_eq!(server.exchanges().len(), 1);
}

#[tokio::test]
async fn automatic_retries_can_be_disabled() {
    let _ = env_logger::try_init();

    let server = server::http(failing_first(1, io::ErrorKind::ConnectionReset));
    let client = server.client().disable_automatic_retries().build().unwrap();

    let err = client.execute(get("http://api.test/")).await.unwrap_err();
    assert!(err.is_request());
    assert_eq!(server.exchanges().len(), 1);
}

fn unavailable_first(times: usize) -> impl Fn(&server::Exchange) -> Reply {
    let count = AtomicUsize::new(0);
    move |_| {
        if count.fetch_add(1, Ordering::SeqCst) < times {
            reply(503)
        } else {
            reply(200)
        }
    }
}

#[tokio::test]
async fn service_unavailable_is_retried() {
    let _ = env_logger::try_init();

    let server = server::http(unavailable_first(1));
    let client = server
        .client()
        .service_unavailable_retry_strategy(Arc::new(DefaultServiceUnavailableRetryStrategy::new(
            2,
            Duration::from_millis(10),
        )))
        .build()
        .unwrap();

    let res = client.execute(get("http://api.test/")).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(server.exchanges().len(), 2);
}

#[tokio::test]
async fn service_unavailable_gives_up() {
    let _ = env_logger::try_init();

    let server = server::http(unavailable_first(10));
    let client = server
        .client()
        .service_unavailable_retry_strategy(Arc::new(DefaultServiceUnavailableRetryStrategy::new(
            2,
            Duration::from_millis(10),
        )))
        .build()
        .unwrap();

    let res = client.execute(get("http://api.test/")).await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(server.exchanges().len(), 3);
}

#[tokio::test]
async fn overload_backs_off_route() {
    let _ = env_logger::try_init();

    let server = server::http(|e| {
        if e.uri == "/busy" {
            reply(503)
        } else {
            reply(200)
        }
    });
    let operator = DefaultConnectionOperator::new(server.sockets())
        .resolver(Arc::new(server.resolver()));
    let manager = Arc::new(PoolingConnectionManager::with_operator(
        server.connection_factory(),
        ConnectionConfig::default(),
        Arc::new(operator),
    ));
    manager.set_default_max_per_route(4);
    let backoff = AimdBackoffManager::new(manager.clone());
    let client = ferry::HttpClient::builder()
        .connection_manager(manager.clone())
        .backoff(Arc::new(DefaultBackoffStrategy), Arc::new(backoff))
        .build()
        .unwrap();

    let route = HttpRoute::direct(HttpHost::http("api.test", Some(80)), None, false);
    let res = client.execute(get("http://api.test/busy")).await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(manager.max_per_route(&route), 2);

    // the cool down keeps recovery from growing the cap right away
    client.execute(get("http://api.test/")).await.unwrap();
    assert_eq!(manager.max_per_route(&route), 2);
}
