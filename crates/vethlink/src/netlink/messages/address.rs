//! Strongly-typed address message.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use winnow::error::{ContextError, ErrMode};
use zerocopy::IntoBytes;

use crate::netlink::parse::{FromNetlink, PResult, parse_attrs, parse_header, parse_ipv4};
use crate::netlink::types::{AF_INET, IfAddrMsg, ifa};

/// An address as reported by `RTM_NEWADDR`/`RTM_GETADDR`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMessage {
    pub(crate) header: IfAddrMsg,
    /// IFA_ADDRESS (peer address on point-to-point links).
    pub(crate) address: Option<Ipv4Addr>,
    /// IFA_LOCAL.
    pub(crate) local: Option<Ipv4Addr>,
}

impl AddressMessage {
    pub fn ifindex(&self) -> u32 {
        self.header.ifa_index
    }

    pub fn family(&self) -> u8 {
        self.header.ifa_family
    }

    pub fn prefix_len(&self) -> u8 {
        self.header.ifa_prefixlen
    }

    /// The interface's own IPv4 address with its prefix length.
    ///
    /// Prefers IFA_LOCAL, which differs from IFA_ADDRESS only on
    /// point-to-point links. Returns `None` for non-IPv4 entries.
    pub fn ipv4_net(&self) -> Option<Ipv4Net> {
        if self.family() != AF_INET {
            return None;
        }
        let ip = self.local.or(self.address)?;
        Ipv4Net::new(ip, self.prefix_len()).ok()
    }
}

impl FromNetlink for AddressMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        let mut header = IfAddrMsg::new();
        header.ifa_family = AF_INET;
        buf.extend_from_slice(header.as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header_bytes = parse_header(input, IfAddrMsg::SIZE)?;
        let header = *IfAddrMsg::from_bytes(header_bytes)
            .map_err(|_| ErrMode::Cut(ContextError::new()))?;

        let mut msg = AddressMessage {
            header,
            ..Default::default()
        };

        for (attr_type, data) in parse_attrs(input)? {
            if header.ifa_family != AF_INET {
                continue;
            }
            match attr_type {
                ifa::ADDRESS => msg.address = parse_ipv4(data),
                ifa::LOCAL => msg.local = parse_ipv4(data),
                _ => {}
            }
        }

        Ok(msg)
    }
}
