//! Strongly-typed link message.

use crate::netlink::parse::{
    FromNetlink, PResult, parse_attr, parse_attrs, parse_header, parse_string_from_bytes,
    parse_u32,
};
use crate::netlink::types::{IfInfoMsg, iff, ifla, ifla_info};

use winnow::error::{ContextError, ErrMode};
use zerocopy::IntoBytes;

/// A link as reported by `RTM_NEWLINK`/`RTM_GETLINK`.
///
/// Only the attributes the attach path reads are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMessage {
    pub(crate) header: IfInfoMsg,
    pub(crate) name: Option<String>,
    pub(crate) mtu: Option<u32>,
    pub(crate) master: Option<u32>,
    /// IFLA_INFO_KIND, absent for plain devices.
    pub(crate) kind: Option<String>,
}

impl LinkMessage {
    pub fn ifindex(&self) -> u32 {
        self.header.ifi_index as u32
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Interface name, or `if<index>` when the kernel omitted it.
    pub fn name_or_index(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("if{}", self.ifindex()))
    }

    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    /// Index of the master device (bridge), if enslaved.
    pub fn master(&self) -> Option<u32> {
        self.master
    }

    /// Link kind from IFLA_LINKINFO (e.g. "veth", "bridge", "openvswitch").
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn flags(&self) -> u32 {
        self.header.ifi_flags
    }

    pub fn is_up(&self) -> bool {
        self.header.ifi_flags & iff::UP != 0
    }
}

impl FromNetlink for LinkMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(IfInfoMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header_bytes = parse_header(input, IfInfoMsg::SIZE)?;
        let header = *IfInfoMsg::from_bytes(header_bytes)
            .map_err(|_| ErrMode::Cut(ContextError::new()))?;

        let mut msg = LinkMessage {
            header,
            ..Default::default()
        };

        for (attr_type, data) in parse_attrs(input)? {
            match attr_type {
                ifla::IFNAME => msg.name = Some(parse_string_from_bytes(data)),
                ifla::MTU => msg.mtu = parse_u32(data),
                ifla::MASTER => msg.master = parse_u32(data),
                ifla::LINKINFO => msg.kind = parse_link_kind(data),
                _ => {}
            }
        }

        Ok(msg)
    }
}

fn parse_link_kind(mut data: &[u8]) -> Option<String> {
    while data.len() >= 4 {
        let (attr_type, payload) = parse_attr(&mut data).ok()?;
        if attr_type == ifla_info::KIND {
            return Some(parse_string_from_bytes(payload));
        }
    }
    None
}
