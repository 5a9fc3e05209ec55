//! Open vSwitch kernel datapath ports (`ovs_vport` generic netlink family).

use zerocopy::{Immutable, IntoBytes};

use super::builder::MessageBuilder;
use super::error::Result;
use super::genl::{GenlConnection, GenlMsgHdr};
use super::message::{NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST};

pub const OVS_VPORT_FAMILY: &str = "ovs_vport";
pub const OVS_VPORT_VERSION: u8 = 1;

const OVS_VPORT_CMD_NEW: u8 = 1;

const OVS_VPORT_ATTR_TYPE: u16 = 2;
const OVS_VPORT_ATTR_NAME: u16 = 3;
const OVS_VPORT_ATTR_UPCALL_PID: u16 = 5;

/// Vport backed by an existing network device.
const OVS_VPORT_TYPE_NETDEV: u32 = 1;

/// Family-specific header following `genlmsghdr` (struct ovs_header).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, IntoBytes, Immutable)]
pub struct OvsHeader {
    /// Ifindex of the datapath's local port.
    pub dp_ifindex: i32,
}

/// Request to attach an existing netdev to a datapath as a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetdevVport {
    dp_ifindex: u32,
    name: String,
}

impl NetdevVport {
    /// `dp_ifindex` is the index of the datapath device itself, which is
    /// the datapath's local internal port.
    pub fn new(dp_ifindex: u32, name: impl Into<String>) -> Self {
        Self {
            dp_ifindex,
            name: name.into(),
        }
    }

    pub fn build(&self, family_id: u16, upcall_pid: u32) -> MessageBuilder {
        let mut builder = MessageBuilder::new(
            family_id,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        );
        builder.append(&GenlMsgHdr::new(OVS_VPORT_CMD_NEW, OVS_VPORT_VERSION));
        builder.append(&OvsHeader {
            dp_ifindex: self.dp_ifindex as i32,
        });
        builder.append_attr_str(OVS_VPORT_ATTR_NAME, &self.name);
        builder.append_attr_u32(OVS_VPORT_ATTR_TYPE, OVS_VPORT_TYPE_NETDEV);
        // The kernel requires an upcall pid; unused for a plain netdev port.
        builder.append_attr_u32(OVS_VPORT_ATTR_UPCALL_PID, upcall_pid);
        builder
    }
}

impl GenlConnection {
    /// Add `vport` to its datapath.
    pub async fn add_vport(&self, vport: &NetdevVport) -> Result<()> {
        let family = self.get_family_id(OVS_VPORT_FAMILY).await?;
        self.command_ack(vport.build(family, self.pid()))
            .await
            .map_err(|e| e.with_context(format!("adding datapath port {}", vport.name)))
    }
}
