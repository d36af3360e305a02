use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, RwLock};

use crate::dns::{Addrs, Name, Resolve, Resolving};

/// A resolver backed by a static host table.
///
/// Names that were never added fail to resolve. Clones share the table.
#[derive(Clone, Debug, Default)]
pub struct InMemoryResolver {
    table: Arc<RwLock<HashMap<String, Vec<IpAddr>>>>,
}

impl InMemoryResolver {
    /// An empty table.
    pub fn new() -> Self {
        InMemoryResolver::default()
    }

    /// Map `host` to `addrs`, replacing any previous entry.
    pub fn add(&self, host: &str, addrs: impl IntoIterator<Item = IpAddr>) {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        table.insert(host.to_ascii_lowercase(), addrs.into_iter().collect());
    }
}

impl Resolve for InMemoryResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let found = self
            .table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name.as_str())
            .cloned();
        Box::pin(async move {
            match found {
                Some(ips) => {
                    let addrs: Addrs =
                        Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
                    Ok(addrs)
                }
                None => Err(format!("{} could not be resolved", name).into()),
            }
        })
    }
}
