//! Link creation and modification.
//!
//! # Example
//!
//! ```ignore
//! use vethlink::netlink::link::VethLink;
//!
//! let veth = VethLink::new("vethpl1a2b3", "vethpg1a2b3").mtu(1376);
//! conn.add_link(&veth).await?;
//! ```

use std::os::unix::io::RawFd;

use super::builder::MessageBuilder;
use super::connection::{Connection, ack_request, create_request};
use super::error::Result;
use super::message::NlMsgType;
use super::types::{IfInfoMsg, ifla, ifla_info, veth_info};

/// Configuration for a veth pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethLink {
    name: String,
    peer_name: String,
    mtu: Option<u32>,
}

impl VethLink {
    /// Create a new veth pair configuration.
    pub fn new(name: impl Into<String>, peer_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peer_name: peer_name.into(),
            mtu: None,
        }
    }

    /// Set the MTU for both ends. Zero leaves the kernel default.
    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = (mtu != 0).then_some(mtu);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn mtu_value(&self) -> Option<u32> {
        self.mtu
    }

    /// Build the `RTM_NEWLINK` request.
    ///
    /// `NLM_F_EXCL` makes a name collision fail instead of silently
    /// matching an existing link.
    pub fn build(&self) -> MessageBuilder {
        let mut builder = create_request(NlMsgType::RTM_NEWLINK);
        builder.append(&IfInfoMsg::new());
        builder.append_attr_str(ifla::IFNAME, &self.name);
        if let Some(mtu) = self.mtu {
            builder.append_attr_u32(ifla::MTU, mtu);
        }

        let linkinfo = builder.nest_start(ifla::LINKINFO);
        builder.append_attr_str(ifla_info::KIND, "veth");
        let data = builder.nest_start(ifla_info::DATA);
        let peer = builder.nest_start(veth_info::PEER);
        builder.append(&IfInfoMsg::new());
        builder.append_attr_str(ifla::IFNAME, &self.peer_name);
        if let Some(mtu) = self.mtu {
            builder.append_attr_u32(ifla::MTU, mtu);
        }
        builder.nest_end(peer);
        builder.nest_end(data);
        builder.nest_end(linkinfo);

        builder
    }
}

impl Connection {
    /// Create a veth pair.
    pub async fn add_link(&self, veth: &VethLink) -> Result<()> {
        self.request_ack(veth.build())
            .await
            .map_err(|e| e.with_context(format!("creating veth {}", veth.name())))
    }

    /// Enslave a link to a master device (bridge) by index.
    pub async fn set_link_master_by_index(&self, ifindex: u32, master: u32) -> Result<()> {
        let mut builder = ack_request(NlMsgType::RTM_SETLINK);
        builder.append(&IfInfoMsg::new().with_index(ifindex));
        builder.append_attr_u32(ifla::MASTER, master);

        self.request_ack(builder).await
    }

    /// Move a link into the network namespace referred to by `ns_fd`.
    pub async fn set_link_netns_fd(&self, ifindex: u32, ns_fd: RawFd) -> Result<()> {
        let mut builder = ack_request(NlMsgType::RTM_SETLINK);
        builder.append(&IfInfoMsg::new().with_index(ifindex));
        builder.append_attr_u32(ifla::NET_NS_FD, ns_fd as u32);

        self.request_ack(builder).await
    }

    /// Rename a link. The kernel refuses while the link is up.
    pub async fn set_link_name_by_index(&self, ifindex: u32, name: &str) -> Result<()> {
        let mut builder = ack_request(NlMsgType::RTM_SETLINK);
        builder.append(&IfInfoMsg::new().with_index(ifindex));
        builder.append_attr_str(ifla::IFNAME, name);

        self.request_ack(builder).await
    }

    /// Delete a network interface by name, for when its index is unknown.
    pub async fn del_link_by_name(&self, name: &str) -> Result<()> {
        self.request_ack(build_del_by_name(name)).await
    }
}

fn build_del_by_name(name: &str) -> MessageBuilder {
    let mut builder = ack_request(NlMsgType::RTM_DELLINK);
    builder.append(&IfInfoMsg::new());
    builder.append_attr_str(ifla::IFNAME, name);
    builder
}
