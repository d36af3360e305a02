#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # ferry
//!
//! The `ferry` crate is the core of an HTTP/1.1 client: it decides which
//! route a request takes, keeps a pool of connections per route, opens
//! tunnels through proxies, answers authentication challenges, and retries
//! or redirects as configured.
//!
//! Message framing is not part of this crate. Connections are created by a
//! [`ConnectionFactory`](connect::ConnectionFactory) that implements
//! [`HttpConnection`](connect::HttpConnection) over any transport.
//!
//! - Routes through zero or more proxies, tunnelled with `CONNECT` when
//!   secure
//! - A connection pool capped per route and in total, with user token
//!   affinity
//! - Basic authentication for targets and proxies, answered preemptively
//!   once it succeeded
//! - Configurable retry, redirect, backoff and service unavailable
//!   handling
//!
//! ## Executing a request
//!
//! A request travels through the execution chain described in [`exec`]:
//!
//! ```no_run
//! # async fn run(factory: std::sync::Arc<dyn ferry::connect::ConnectionFactory>) -> ferry::Result<()> {
//! let client = ferry::HttpClient::builder()
//!     .connection_factory(factory)
//!     .build()?;
//!
//! let mut req = http::Request::new(ferry::Body::empty());
//! *req.uri_mut() = http::Uri::from_static("http://example.com/");
//! let res = client.execute(req).await?;
//! println!("status: {}", res.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Sessions
//!
//! A [`ClientContext`] carries what one logical session learned: auth
//! state, the user token its connections are bound to, and the redirects it
//! followed. Pass the same context to
//! [`execute_with`](HttpClient::execute_with) to keep them.
//!
//! ## Per-request config
//!
//! A [`RequestConfig`] in a request's extensions overrides the client's
//! default for that request:
//!
//! ```
//! use std::time::Duration;
//!
//! let mut req = http::Request::new(ferry::Body::empty());
//! req.extensions_mut().insert(
//!     ferry::RequestConfig::builder()
//!         .socket_timeout(Duration::from_secs(5))
//!         .redirects_enabled(false)
//!         .build(),
//! );
//! ```

pub use http::header;
pub use http::Method;
pub use http::{StatusCode, Version};
pub use url::Url;

pub use self::body::Body;
pub use self::client::{HttpClient, HttpClientBuilder};
pub use self::config::{RequestConfig, RequestConfigBuilder};
pub use self::context::{AbortHandle, ClientContext, UserToken};
pub use self::error::{Error, Result, TunnelResponse};
pub use self::evict::IdleConnectionEvictor;
pub use self::host::{DefaultSchemePortResolver, HttpHost, SchemePortResolver};
pub use self::into_url::IntoUrl;
pub use self::proxy::Proxy;

pub mod auth;
pub mod backoff;
mod body;
mod client;
mod config;
pub mod connect;
mod context;
pub mod dns;
mod error;
mod evict;
pub mod exec;
mod host;
pub mod interceptor;
mod into_url;
pub mod pool;
mod proxy;
pub mod redirect;
pub mod retry;
pub mod route;
pub mod strategy;
mod util;
