//! Errors returned by the attach lifecycle.
//!
//! Every variant names the interfaces or devices involved so callers can
//! decide on their own retry policy. Nothing here is retried internally.

use ipnet::Ipv4Net;

use crate::netlink;

/// Result type for attach operations.
pub type Result<T> = std::result::Result<T, AttachError>;

/// Failure of one step of attach or detach.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    /// The forwarding device does not exist.
    #[error("forwarding device {device} not found")]
    DeviceNotFound { device: String },

    /// The kernel refused to create the veth pair.
    #[error("creating veth pair {local}/{peer}")]
    CreationFailed {
        local: String,
        peer: String,
        #[source]
        source: netlink::Error,
    },

    /// The forwarding device is neither a bridge nor a datapath.
    #[error("device {device} of kind {kind:?} cannot take veth ports")]
    UnsupportedDevice { device: String, kind: String },

    /// Setting the bridge master or adding the datapath port failed.
    #[error("attaching {link} to {device}")]
    AttachFailed {
        link: String,
        device: String,
        #[source]
        source: netlink::Error,
    },

    #[error("moving {link} into container namespace")]
    NamespaceMoveFailed {
        link: String,
        #[source]
        source: netlink::Error,
    },

    #[error("renaming {from} to {to}")]
    RenameFailed {
        from: String,
        to: String,
        #[source]
        source: netlink::Error,
    },

    /// ARP cache tuning on the guest interface failed.
    #[error("tuning neighbour cache on {link}")]
    CacheConfigFailed {
        link: String,
        #[source]
        source: netlink::Error,
    },

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    /// A lookup failed for a reason other than absence.
    #[error("looking up interface {name}")]
    LinkQueryFailed {
        name: String,
        #[source]
        source: netlink::Error,
    },

    #[error("listing addresses of {link}")]
    AddressQueryFailed {
        link: String,
        #[source]
        source: netlink::Error,
    },

    #[error("changing address {address} on {link}")]
    AddressMutationFailed {
        link: String,
        address: Ipv4Net,
        #[source]
        source: netlink::Error,
    },

    #[error("setting {link} up")]
    LinkUpFailed {
        link: String,
        #[source]
        source: netlink::Error,
    },

    #[error("installing route {destination} via {link}")]
    RouteFailed {
        link: String,
        destination: Ipv4Net,
        #[source]
        source: netlink::Error,
    },

    /// Deleting an interface left without addresses failed.
    #[error("deleting {link}")]
    LinkDeleteFailed {
        link: String,
        #[source]
        source: netlink::Error,
    },

    /// Entering, restoring or duplicating a namespace handle failed.
    #[error("network namespace")]
    Namespace(#[source] netlink::Error),

    /// The pinned thread died before reporting a result.
    #[error("namespace executor thread terminated abnormally")]
    ExecutorPanicked,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AttachError {
    /// Whether retrying the same call cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedDevice { .. } | Self::InvalidConfig(_)
        )
    }

    /// The kernel error underneath, if any.
    pub fn netlink_error(&self) -> Option<&netlink::Error> {
        match self {
            Self::CreationFailed { source, .. }
            | Self::AttachFailed { source, .. }
            | Self::NamespaceMoveFailed { source, .. }
            | Self::RenameFailed { source, .. }
            | Self::CacheConfigFailed { source, .. }
            | Self::LinkQueryFailed { source, .. }
            | Self::AddressQueryFailed { source, .. }
            | Self::AddressMutationFailed { source, .. }
            | Self::LinkUpFailed { source, .. }
            | Self::RouteFailed { source, .. }
            | Self::LinkDeleteFailed { source, .. }
            | Self::Namespace(source) => Some(source),
            _ => None,
        }
    }

    pub(crate) fn lookup(name: &str, source: netlink::Error) -> Self {
        if source.is_not_found() {
            Self::InterfaceNotFound {
                name: name.to_string(),
            }
        } else {
            Self::LinkQueryFailed {
                name: name.to_string(),
                source,
            }
        }
    }
}
