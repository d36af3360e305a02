use crate::dns::{Addrs, Name, Resolve, Resolving};
use crate::error::BoxError;

/// A resolver using the system's `getaddrinfo`, run on tokio's blocking pool.
#[derive(Clone, Debug, Default)]
pub struct GaiResolver {
    _priv: (),
}

impl GaiResolver {
    /// Construct a new [`GaiResolver`].
    pub fn new() -> Self {
        GaiResolver { _priv: () }
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            log::trace!("resolving host={:?}", name.as_str());
            let addrs = tokio::net::lookup_host((name.as_str(), 0))
                .await
                .map_err(|err| -> BoxError { Box::new(err) })?;
            let addrs: Addrs = Box::new(addrs.collect::<Vec<_>>().into_iter());
            Ok(addrs)
        })
    }
}
