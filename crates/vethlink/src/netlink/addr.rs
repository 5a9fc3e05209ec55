//! IPv4 address requests.

use ipnet::Ipv4Net;

use super::builder::MessageBuilder;
use super::connection::{Connection, ack_request, create_request};
use super::error::Result;
use super::message::NlMsgType;
use super::messages::AddressMessage;
use super::types::{AF_INET, IfAddrMsg, ifa, rt_scope};

/// An IPv4 address bound to an interface index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Address {
    ifindex: u32,
    net: Ipv4Net,
}

impl Ipv4Address {
    pub fn new(ifindex: u32, net: Ipv4Net) -> Self {
        Self { ifindex, net }
    }

    fn write(&self, builder: &mut MessageBuilder, with_broadcast: bool) {
        let mut header = IfAddrMsg::new();
        header.ifa_family = AF_INET;
        header.ifa_prefixlen = self.net.prefix_len();
        header.ifa_scope = rt_scope::UNIVERSE;
        header.ifa_index = self.ifindex;
        builder.append(&header);

        let ip = self.net.addr().octets();
        builder.append_attr(ifa::LOCAL, &ip);
        builder.append_attr(ifa::ADDRESS, &ip);

        // /31 and /32 have no broadcast address.
        if with_broadcast && self.net.prefix_len() < 31 {
            builder.append_attr(ifa::BROADCAST, &self.net.broadcast().octets());
        }
    }

    /// Build the `RTM_NEWADDR` request.
    pub fn build_add(&self) -> MessageBuilder {
        let mut builder = create_request(NlMsgType::RTM_NEWADDR);
        self.write(&mut builder, true);
        builder
    }

    /// Build the `RTM_DELADDR` request.
    ///
    /// The kernel matches on local address and prefix length.
    pub fn build_del(&self) -> MessageBuilder {
        let mut builder = ack_request(NlMsgType::RTM_DELADDR);
        self.write(&mut builder, false);
        builder
    }
}

impl Connection {
    /// Get the IPv4 addresses configured on an interface.
    pub async fn get_ipv4_addresses(&self, ifindex: u32) -> Result<Vec<Ipv4Net>> {
        let addresses: Vec<AddressMessage> = self.dump_typed(NlMsgType::RTM_GETADDR).await?;
        Ok(addresses
            .iter()
            .filter(|a| a.ifindex() == ifindex)
            .filter_map(AddressMessage::ipv4_net)
            .collect())
    }

    pub async fn add_address(&self, address: Ipv4Address) -> Result<()> {
        self.request_ack(address.build_add()).await
    }

    pub async fn del_address(&self, address: Ipv4Address) -> Result<()> {
        self.request_ack(address.build_del()).await
    }
}
