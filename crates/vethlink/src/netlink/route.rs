//! IPv4 route requests.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use super::builder::MessageBuilder;
use super::connection::{Connection, create_request};
use super::error::Result;
use super::message::NlMsgType;
use super::types::{AF_INET, RT_TABLE_MAIN, RTN_UNICAST, RTPROT_BOOT, RtMsg, rt_scope, rta};

/// A directly attached IPv4 route out of one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Route {
    destination: Ipv4Net,
    oif: u32,
    scope: u8,
}

impl Ipv4Route {
    /// Route `destination` out of interface `oif` with link scope.
    pub fn link_scope(destination: Ipv4Net, oif: u32) -> Self {
        Self {
            destination,
            oif,
            scope: rt_scope::LINK,
        }
    }

    /// The link-scope 224.0.0.0/4 route used for multicast forwarding.
    pub fn multicast(oif: u32) -> Self {
        Self::link_scope(multicast_destination(), oif)
    }

    pub fn destination(&self) -> Ipv4Net {
        self.destination
    }

    pub fn oif(&self) -> u32 {
        self.oif
    }

    pub fn scope(&self) -> u8 {
        self.scope
    }

    /// Build the `RTM_NEWROUTE` request.
    pub fn build(&self) -> MessageBuilder {
        let header = RtMsg {
            rtm_family: AF_INET,
            rtm_dst_len: self.destination.prefix_len(),
            rtm_table: RT_TABLE_MAIN,
            rtm_protocol: RTPROT_BOOT,
            rtm_scope: self.scope,
            rtm_type: RTN_UNICAST,
            ..Default::default()
        };

        let mut builder = create_request(NlMsgType::RTM_NEWROUTE);
        builder.append(&header);
        builder.append_attr(rta::DST, &self.destination.network().octets());
        builder.append_attr_u32(rta::OIF, self.oif);
        builder
    }
}

/// 224.0.0.0/4.
pub fn multicast_destination() -> Ipv4Net {
    Ipv4Net::new_assert(Ipv4Addr::new(224, 0, 0, 0), 4)
}

impl Connection {
    pub async fn add_route(&self, route: &Ipv4Route) -> Result<()> {
        self.request_ack(route.build()).await
    }
}
