//! Device features over the `ethtool` generic netlink family (Linux 5.6+).
//!
//! # Example
//!
//! ```ignore
//! use vethlink::netlink::{FeaturesRequest, GenlConnection};
//!
//! let genl = GenlConnection::new()?;
//! genl.set_features(&FeaturesRequest::tx_checksum("vethpg1a2b3", false))
//!     .await?;
//! ```

use super::builder::MessageBuilder;
use super::error::Result;
use super::genl::{GenlConnection, GenlMsgHdr};
use super::message::{NLM_F_ACK, NLM_F_REQUEST};

pub const ETHTOOL_GENL_NAME: &str = "ethtool";
pub const ETHTOOL_GENL_VERSION: u8 = 1;

const ETHTOOL_MSG_FEATURES_SET: u8 = 12;

const ETHTOOL_A_FEATURES_HEADER: u16 = 1;
const ETHTOOL_A_FEATURES_WANTED: u16 = 3;

const ETHTOOL_A_HEADER_DEV_NAME: u16 = 2;

const ETHTOOL_A_BITSET_BITS: u16 = 3;
const ETHTOOL_A_BITSET_BITS_BIT: u16 = 1;
const ETHTOOL_A_BITSET_BIT_NAME: u16 = 2;
const ETHTOOL_A_BITSET_BIT_VALUE: u16 = 3;

/// Kernel feature names covered by `ethtool -K <dev> tx`.
pub const TX_CHECKSUM_FEATURES: [&str; 3] = [
    "tx-checksum-ipv4",
    "tx-checksum-ip-generic",
    "tx-checksum-ipv6",
];

/// A change to a device's wanted features.
///
/// Only the named features are touched; the request carries them as a
/// verbose bitset, so everything else keeps its current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturesRequest {
    ifname: String,
    changes: Vec<(String, bool)>,
}

impl FeaturesRequest {
    /// An empty change for `ifname`.
    pub fn new(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
            changes: Vec::new(),
        }
    }

    /// Turn all TX checksum offloads on or off.
    pub fn tx_checksum(ifname: impl Into<String>, enabled: bool) -> Self {
        TX_CHECKSUM_FEATURES
            .iter()
            .fold(Self::new(ifname), |req, name| req.set(*name, enabled))
    }

    pub fn enable(self, feature: impl Into<String>) -> Self {
        self.set(feature, true)
    }

    pub fn disable(self, feature: impl Into<String>) -> Self {
        self.set(feature, false)
    }

    fn set(mut self, feature: impl Into<String>, enabled: bool) -> Self {
        self.changes.push((feature.into(), enabled));
        self
    }

    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    /// Build the `ETHTOOL_MSG_FEATURES_SET` request.
    pub fn build(&self, family_id: u16) -> MessageBuilder {
        let mut builder = MessageBuilder::new(family_id, NLM_F_REQUEST | NLM_F_ACK);
        builder.append(&GenlMsgHdr::new(
            ETHTOOL_MSG_FEATURES_SET,
            ETHTOOL_GENL_VERSION,
        ));

        let header = builder.nest_start(ETHTOOL_A_FEATURES_HEADER);
        builder.append_attr_str(ETHTOOL_A_HEADER_DEV_NAME, &self.ifname);
        builder.nest_end(header);

        let wanted = builder.nest_start(ETHTOOL_A_FEATURES_WANTED);
        let bits = builder.nest_start(ETHTOOL_A_BITSET_BITS);
        for (name, enabled) in &self.changes {
            let bit = builder.nest_start(ETHTOOL_A_BITSET_BITS_BIT);
            builder.append_attr_str(ETHTOOL_A_BITSET_BIT_NAME, name);
            // Flag attribute: present means on.
            if *enabled {
                builder.append_attr(ETHTOOL_A_BITSET_BIT_VALUE, &[]);
            }
            builder.nest_end(bit);
        }
        builder.nest_end(bits);
        builder.nest_end(wanted);

        builder
    }
}

impl GenlConnection {
    /// Apply a features change to a device in this socket's namespace.
    pub async fn set_features(&self, request: &FeaturesRequest) -> Result<()> {
        let family = self.get_family_id(ETHTOOL_GENL_NAME).await?;
        self.command_ack(request.build(family))
            .await
            .map_err(|e| e.with_context(format!("setting features of {}", request.ifname)))
    }
}
