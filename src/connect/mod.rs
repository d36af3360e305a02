//! Connections: the framing connection interface, socket factories, and
//! the manager that pools connections and establishes their routes.
//!
//! A [`ConnectionFactory`] creates unbound [`HttpConnection`]s. The
//! [`ConnectionOperator`] binds them to a [`Transport`] opened by the
//! [`SocketFactory`] registered for the first hop's scheme, and layers TLS
//! (or any other protocol a [`LayeredSocketFactory`] provides) over a tunnel.
//! The [`PoolingConnectionManager`] ties both to a [`ConnPool`](crate::pool::ConnPool).

mod connection;
mod manager;
mod operator;
mod socket;

pub use self::connection::{
    ConnectionConfig, ConnectionFactory, Exchanging, HttpConnection, Io, Transmitting, Transport,
};
pub use self::manager::{
    ConnectionManager, ConnectionRequest, ManagedConnection, PoolingConnectionManager,
};
pub use self::operator::{ConnectionOperator, DefaultConnectionOperator};
pub use self::socket::{
    Connecting, LayeredSocketFactory, PlainSocketFactory, SocketConfig, SocketFactory,
    SocketFactoryRegistry,
};
