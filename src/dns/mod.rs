//! DNS resolution

pub use self::gai::GaiResolver;
pub use self::memory::InMemoryResolver;
pub use self::resolve::{Addrs, Name, Resolve, Resolving};
pub(crate) use self::resolve::DynResolver;

mod gai;
mod memory;
mod resolve;
