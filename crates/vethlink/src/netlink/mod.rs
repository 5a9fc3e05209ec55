//! Async netlink client for the operations the attach path needs.
//!
//! # Quick Start
//!
//! ```ignore
//! use vethlink::netlink::{Connection, Protocol};
//!
//! let conn = Connection::new(Protocol::Route)?;
//! if let Some(br) = conn.get_link_by_name("br0").await? {
//!     println!("{}: mtu {:?} kind {:?}", br.ifindex(), br.mtu(), br.kind());
//! }
//! ```

pub mod addr;
pub mod attr;
pub mod builder;
pub mod connection;
pub mod datapath;
pub mod error;
pub mod ethtool;
pub mod genl;
pub mod link;
pub mod message;
pub mod messages;
pub mod namespace;
pub mod parse;
pub mod route;
pub mod socket;
pub mod types;

pub use addr::Ipv4Address;
pub use connection::Connection;
pub use datapath::NetdevVport;
pub use error::{Error, Result};
pub use ethtool::FeaturesRequest;
pub use genl::GenlConnection;
pub use link::VethLink;
pub use messages::{AddressMessage, LinkMessage};
pub use namespace::{NamespaceFd, NamespaceGuard};
pub use route::Ipv4Route;
pub use socket::{NetlinkSocket, Protocol};
