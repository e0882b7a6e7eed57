//! Manifest discovery
//!
//! The manifest maps every logical module name to the network location of its
//! entry artifact. It is fetched once, cached in memory, and concurrent
//! callers share a single in-flight request.

mod resolver;
mod transport;
mod types;


pub use resolver::ManifestResolver;
pub use transport::{HttpManifestTransport, ManifestTransport, TransportResponse};
pub use types::{Manifest, ModuleDescriptor};
