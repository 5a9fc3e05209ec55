//! Forwarding device classification.

use std::fmt;

use crate::netlink::LinkMessage;

/// How a veth end is attached to a forwarding device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardingDeviceKind {
    /// Linux bridge; the veth is enslaved with `IFLA_MASTER`.
    KernelBridge,
    /// Open vSwitch datapath reporting kind `openvswitch`.
    DatapathGeneric,
    /// A device reporting no kind at all. Some kernels omit `IFLA_INFO_KIND`
    /// for datapaths, so these are treated as one.
    DatapathDevice,
    Unsupported { kind: String },
}

impl ForwardingDeviceKind {
    /// Classify by the device's `IFLA_INFO_KIND`.
    pub fn classify(device: &LinkMessage) -> Self {
        match device.kind() {
            Some("bridge") => Self::KernelBridge,
            Some("openvswitch") => Self::DatapathGeneric,
            None | Some("") => Self::DatapathDevice,
            Some(other) => Self::Unsupported {
                kind: other.to_string(),
            },
        }
    }

    pub fn is_datapath(&self) -> bool {
        matches!(self, Self::DatapathGeneric | Self::DatapathDevice)
    }
}

impl fmt::Display for ForwardingDeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelBridge => f.write_str("bridge"),
            Self::DatapathGeneric => f.write_str("openvswitch"),
            Self::DatapathDevice => f.write_str("datapath"),
            Self::Unsupported { kind } => write!(f, "unsupported ({})", kind),
        }
    }
}
