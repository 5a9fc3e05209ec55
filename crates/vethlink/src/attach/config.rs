//! Attach configuration and per-call requests.
//!
//! # Example
//!
//! ```ignore
//! use vethlink::attach::{AttachConfig, AttachRequest};
//!
//! let config = AttachConfig::default().with_local_prefix("vethwl");
//! config.validate()?;
//!
//! let request = AttachRequest::new("3f2a9c1e77", "ethwe", "weave")
//!     .mtu(1376)
//!     .multicast_route(true)
//!     .addresses(["10.32.0.7/12".parse()?]);
//! ```

use ipnet::Ipv4Net;

use super::error::{AttachError, Result};
use crate::util::ifname;

/// Number of identity characters carried into veth names.
pub const SHORT_ID_LEN: usize = 5;

/// Neighbour (ARP) cache parameters applied to the guest interface.
///
/// Short timers make peers notice quickly when an address moves to another
/// container after a gratuitous announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ArpCacheTuning {
    /// `base_reachable_time`, seconds.
    pub base_reachable_time: u32,
    /// `delay_first_probe_time`, seconds.
    pub delay_first_probe_time: u32,
    /// `ucast_solicit`; skipped on kernels without the knob.
    pub ucast_solicit: u32,
}

impl Default for ArpCacheTuning {
    fn default() -> Self {
        Self {
            base_reachable_time: 5,
            delay_first_probe_time: 2,
            ucast_solicit: 1,
        }
    }
}

/// Settings shared by every attach and detach of one [`Attacher`](super::Attacher).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AttachConfig {
    /// Prefix of the host-side veth end.
    pub local_prefix: String,
    /// Prefix of the container-side end before it is renamed.
    pub peer_prefix: String,
    pub arp: ArpCacheTuning,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            local_prefix: "vethpl".to_string(),
            peer_prefix: "vethpg".to_string(),
            arp: ArpCacheTuning::default(),
        }
    }
}

impl AttachConfig {
    /// Prefix of the host-side veth name.
    pub fn with_local_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.local_prefix = prefix.into();
        self
    }

    /// Prefix of the container-side veth name before it is renamed.
    pub fn with_peer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.peer_prefix = prefix.into();
        self
    }

    /// Neighbour tunables applied inside the container.
    pub fn with_arp(mut self, arp: ArpCacheTuning) -> Self {
        self.arp = arp;
        self
    }

    /// Check that generated names fit the kernel's interface name rules.
    pub fn validate(&self) -> Result<()> {
        if self.local_prefix == self.peer_prefix {
            return Err(AttachError::InvalidConfig(format!(
                "local and peer prefix are both {:?}",
                self.local_prefix
            )));
        }
        let widest = "x".repeat(SHORT_ID_LEN);
        for prefix in [&self.local_prefix, &self.peer_prefix] {
            ifname::validate(&format!("{}{}", prefix, widest))
                .map_err(|e| AttachError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }

    /// Host and container-side veth names for a container identity.
    ///
    /// At most [`SHORT_ID_LEN`] bytes of `id` are used, cut at a character
    /// boundary.
    pub fn short_names(&self, id: &str) -> (String, String) {
        let short = short_id(id);
        (
            format!("{}{}", self.local_prefix, short),
            format!("{}{}", self.peer_prefix, short),
        )
    }
}

/// Longest prefix of `id` that fits in [`SHORT_ID_LEN`] bytes.
fn short_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= SHORT_ID_LEN)
        .last()
        .unwrap_or(0);
    &id[..end]
}

/// Parameters of one attach call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    id: String,
    if_name: String,
    device: String,
    mtu: u32,
    multicast_route: bool,
    addresses: Vec<Ipv4Net>,
}

impl AttachRequest {
    /// Attach container `id` to forwarding device `device` as `if_name`.
    pub fn new(
        id: impl Into<String>,
        if_name: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            if_name: if_name.into(),
            device: device.into(),
            mtu: 0,
            multicast_route: false,
            addresses: Vec::new(),
        }
    }

    /// MTU for a newly created pair. 0 (the default) inherits the device's.
    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    /// Install the 224.0.0.0/4 route on the guest interface after it is up.
    pub fn multicast_route(mut self, enabled: bool) -> Self {
        self.multicast_route = enabled;
        self
    }

    /// IPv4 addresses the interface should carry.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = Ipv4Net>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn if_name(&self) -> &str {
        &self.if_name
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn mtu_value(&self) -> u32 {
        self.mtu
    }

    pub fn wants_multicast_route(&self) -> bool {
        self.multicast_route
    }

    pub fn address_list(&self) -> &[Ipv4Net] {
        &self.addresses
    }
}

/// Parameters of one detach call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachRequest {
    id: String,
    if_name: String,
    cidrs: Vec<Ipv4Net>,
}

impl DetachRequest {
    pub fn new(id: impl Into<String>, if_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            if_name: if_name.into(),
            cidrs: Vec::new(),
        }
    }

    /// Addresses to remove; only exact (address, prefix) matches are removed.
    pub fn cidrs(mut self, cidrs: impl IntoIterator<Item = Ipv4Net>) -> Self {
        self.cidrs = cidrs.into_iter().collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn if_name(&self) -> &str {
        &self.if_name
    }

    pub fn cidr_list(&self) -> &[Ipv4Net] {
        &self.cidrs
    }
}
