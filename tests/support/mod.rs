#![allow(dead_code)]

pub mod server;

// The user-agent header the client sends without configuration.
pub static DEFAULT_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
