//! Exchanges over real TCP sockets, with a connection that speaks just
//! enough HTTP/1.1 for bodiless messages.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferry::connect::{ConnectionConfig, HttpConnection, Transmitting, Transport};
use ferry::dns::InMemoryResolver;
use ferry::route::HttpRoute;
use ferry::{Body, HttpClient};
use http::header::{CONTENT_LENGTH, HOST};
use http::{Request, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn read_head<R: AsyncRead + Unpin>(io: &mut R) -> io::Result<Option<String>> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if io.read(&mut byte).await? == 0 {
            return Ok(None);
        }
        head.push(byte[0]);
    }
    Ok(Some(String::from_utf8_lossy(&head).into_owned()))
}

#[derive(Default)]
struct LineConnection {
    transport: Option<Transport>,
    timeout: Option<Duration>,
}

impl HttpConnection for LineConnection {
    fn bind(&mut self, transport: Transport) {
        self.transport = Some(transport);
    }

    fn take_transport(&mut self) -> Option<Transport> {
        self.transport.take()
    }

    fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn is_stale(&mut self) -> bool {
        false
    }

    fn set_socket_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn socket_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn close(&mut self) -> Transmitting<'_, ()> {
        Box::pin(async move {
            if let Some(mut transport) = self.transport.take() {
                transport.shutdown().await?;
            }
            Ok(())
        })
    }

    fn shutdown(&mut self) {
        self.transport = None;
    }

    fn send_request(&mut self, request: Request<Body>) -> Transmitting<'_, ()> {
        Box::pin(async move {
            let transport = self.transport.as_mut().ok_or("connection is not open")?;
            let host = request
                .headers()
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            let head = format!(
                "{} {} HTTP/1.1\r\nHost: {}\r\n\r\n",
                request.method(),
                request.uri(),
                host
            );
            transport.write_all(head.as_bytes()).await?;
            transport.flush().await?;
            Ok(())
        })
    }

    fn receive_response(&mut self) -> Transmitting<'_, Response<Body>> {
        Box::pin(async move {
            let transport = self.transport.as_mut().ok_or("connection is not open")?;
            let head = read_head(transport)
                .await?
                .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
            let code = head
                .split(' ')
                .nth(1)
                .and_then(|c| c.parse::<u16>().ok())
                .ok_or("malformed status line")?;
            let mut res = Response::new(Body::empty());
            *res.status_mut() = StatusCode::from_u16(code)?;
            res.headers_mut().insert(CONTENT_LENGTH, 0.into());
            Ok(res)
        })
    }
}

impl fmt::Debug for LineConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineConnection")
            .field("open", &self.transport.is_some())
            .finish()
    }
}

struct TcpServer {
    port: u16,
    accepted: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

async fn tcp_server() -> TcpServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let (acc, reqs) = (accepted.clone(), requests.clone());
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            acc.fetch_add(1, Ordering::SeqCst);
            let reqs = reqs.clone();
            tokio::spawn(async move {
                while let Ok(Some(head)) = read_head(&mut socket).await {
                    let line = head.lines().next().unwrap_or_default().to_owned();
                    reqs.lock().unwrap().push(line);
                    let reply = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
                    if socket.write_all(reply).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    TcpServer {
        port,
        accepted,
        requests,
    }
}

fn client() -> HttpClient {
    let resolver = InMemoryResolver::new();
    resolver.add("tcp.test", [IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    let factory = |_: &HttpRoute, _: &ConnectionConfig| -> Result<Box<dyn HttpConnection>, BoxError> {
        Ok(Box::new(LineConnection::default()))
    };
    HttpClient::builder()
        .connection_factory(Arc::new(factory))
        .resolver(Arc::new(resolver))
        .build()
        .unwrap()
}

fn get(uri: String) -> Request<Body> {
    let mut req = Request::new(Body::empty());
    *req.uri_mut() = uri.parse().unwrap();
    req
}

#[tokio::test]
async fn keeps_tcp_connection_alive() {
    let _ = env_logger::try_init();

    let server = tcp_server().await;
    let client = client();

    for path in ["/one", "/two"] {
        let uri = format!("http://tcp.test:{}{}", server.port, path);
        let res = client.execute(get(uri)).await.unwrap();
        assert_eq!(res.status(), 200);
    }

    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(
        *server.requests.lock().unwrap(),
        vec!["GET /one HTTP/1.1".to_owned(), "GET /two HTTP/1.1".to_owned()]
    );
}

#[tokio::test]
async fn refused_tcp_connect() {
    let _ = env_logger::try_init();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = client()
        .execute(get(format!("http://tcp.test:{port}/")))
        .await
        .unwrap_err();
    assert!(err.is_connect());
}
