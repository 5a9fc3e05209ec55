//! Container network attachment over async netlink.
//!
//! Creates a veth pair per container, attaches the host end to a Linux
//! bridge or an Open vSwitch datapath, moves the other end into the
//! container's network namespace and manages its IPv4 addresses.
//!
//! # Features
//!
//! - `serde` - (de)serialization of [`attach::AttachConfig`]
//! - `integration` - root-only tests against the real kernel
//!
//! # Example
//!
//! ```ignore
//! use vethlink::attach::{AttachConfig, AttachRequest, Attacher, DetachRequest, ThreadExecutor};
//! use vethlink::netlink::namespace;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let attacher = Attacher::new(ThreadExecutor::new()?, AttachConfig::default())?;
//!     let ns = namespace::open("container-1")?;
//!
//!     let addr = "10.32.0.7/12".parse()?;
//!     attacher
//!         .attach(&ns, &AttachRequest::new("3f2a9c1e77", "ethwe", "weave").addresses([addr]))
//!         .await?;
//!
//!     attacher
//!         .detach(&ns, &DetachRequest::new("3f2a9c1e77", "ethwe").cidrs([addr]))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod attach;
pub mod netlink;
pub mod util;

#[cfg(test)]
mod fixtures;

pub use attach::{AttachError, Attacher};
pub use netlink::{Connection, Error, Protocol, Result};
