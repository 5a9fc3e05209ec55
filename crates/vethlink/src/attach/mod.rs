//! Container veth lifecycle.
//!
//! - [`VethSpec`] creates a pair and attaches it to a bridge or datapath,
//!   rolling back on failure.
//! - [`NamespaceExecutor`] runs work inside a container's network namespace
//!   on a pinned thread ([`ThreadExecutor`]).
//! - [`setup_guest`] renames and tunes the container-side end.
//! - [`add_addresses`] / [`remove_addresses`] reconcile IPv4 addresses.
//! - [`Attacher`] drives attach and detach end to end.
//!
//! # Example
//!
//! ```ignore
//! use vethlink::attach::{AttachConfig, AttachRequest, Attacher, ThreadExecutor};
//! use vethlink::netlink::namespace;
//!
//! let attacher = Attacher::new(ThreadExecutor::new()?, AttachConfig::default())?;
//! let ns = namespace::open_pid(container_pid)?;
//!
//! let request = AttachRequest::new(container_id, "ethwe", "weave")
//!     .multicast_route(true)
//!     .addresses(["10.32.0.7/12".parse()?]);
//! let outcome = attacher.attach(&ns, &request).await?;
//! ```

mod address;
mod announce;
mod config;
mod device;
mod error;
mod executor;
mod guest;
mod ops;
mod orchestrator;
mod veth;

pub use address::{Removal, add_addresses, plan_additions, plan_removals, remove_addresses};
pub use announce::{Announcer, GratuitousArp, NoopAnnouncer};
pub use config::{ArpCacheTuning, AttachConfig, AttachRequest, DetachRequest, SHORT_ID_LEN};
pub use device::ForwardingDeviceKind;
pub use error::{AttachError, Result};
pub use executor::ThreadExecutor;
pub use guest::setup_guest;
pub use ops::{LinkOps, NamespaceExecutor};
pub use orchestrator::{AttachOutcome, Attacher, DetachOutcome};
pub use veth::{VethPair, VethSpec};
