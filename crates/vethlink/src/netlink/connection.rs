//! High-level netlink connection with request/response handling.

use tokio::sync::Mutex;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    MessageIter, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST, NlMsgError,
    NlMsgType,
};
use super::messages::LinkMessage;
use super::parse::FromNetlink;
use super::socket::{NetlinkSocket, Protocol};
use super::types::{IfInfoMsg, iff};

/// High-level netlink connection.
///
/// A connection sees the network namespace its socket was opened in.
///
/// Requests may be issued from many tasks at once. Each request holds the
/// exchange lock from send until its final reply, so no task consumes a
/// reply addressed to another.
pub struct Connection {
    socket: NetlinkSocket,
    exchange: Mutex<()>,
}

impl Connection {
    /// Create a new connection for the given protocol.
    pub fn new(protocol: Protocol) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new(protocol)?,
            exchange: Mutex::new(()),
        })
    }

    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    /// Send a request that expects an ACK only (no data response).
    pub async fn request_ack(&self, mut builder: MessageBuilder) -> Result<()> {
        let _exchange = self.exchange.lock().await;
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        loop {
            let response = self.socket.recv_msg().await?;
            if process_ack(&response, seq)? {
                return Ok(());
            }
        }
    }

    /// Send a dump request and collect the payload of every response.
    pub async fn dump(&self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let _exchange = self.exchange.lock().await;
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        let mut responses = Vec::new();

        loop {
            let data = self.socket.recv_msg().await?;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                    continue;
                }

                if header.is_done() {
                    return Ok(responses);
                }

                responses.push(payload.to_vec());
            }
        }
    }

    /// Send a dump request and parse all responses into typed messages.
    ///
    /// Entries the parser rejects are skipped.
    pub async fn dump_typed<T: FromNetlink>(&self, msg_type: u16) -> Result<Vec<T>> {
        let mut builder = dump_request(msg_type);

        let mut header_buf = Vec::new();
        T::write_dump_header(&mut header_buf);
        builder.append_bytes(&header_buf);

        let responses = self.dump(builder).await?;
        Ok(responses
            .iter()
            .filter_map(|payload| T::from_bytes(payload).ok())
            .collect())
    }
}

/// Scan a receive buffer for the ACK matching `seq`.
///
/// Returns `Ok(true)` once the ACK was seen, `Ok(false)` if the buffer held
/// only unrelated messages.
pub(crate) fn process_ack(data: &[u8], seq: u32) -> Result<bool> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq || !header.is_error() {
            continue;
        }

        let err = NlMsgError::from_bytes(payload)?;
        if !err.is_ack() {
            return Err(Error::from_errno(err.error));
        }
        return Ok(true);
    }

    Ok(false)
}

/// Helper to build a dump request.
pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}

/// Helper to build a request expecting ACK.
pub fn ack_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK)
}

/// Helper to build an exclusive create request.
pub fn create_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(
        msg_type,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
    )
}

// ============================================================================
// Link queries and state
// ============================================================================

impl Connection {
    /// Get all network interfaces in this connection's namespace.
    pub async fn get_links(&self) -> Result<Vec<LinkMessage>> {
        self.dump_typed(NlMsgType::RTM_GETLINK).await
    }

    /// Get a network interface by name.
    ///
    /// Returns `None` if the interface doesn't exist.
    pub async fn get_link_by_name(&self, name: &str) -> Result<Option<LinkMessage>> {
        let links = self.get_links().await?;
        Ok(links.into_iter().find(|l| l.name() == Some(name)))
    }

    /// Bring a network interface up by index.
    pub async fn set_link_up_by_index(&self, ifindex: u32) -> Result<()> {
        let mut ifinfo = IfInfoMsg::new().with_index(ifindex);
        ifinfo.ifi_flags = iff::UP;
        ifinfo.ifi_change = iff::UP;

        let mut builder = ack_request(NlMsgType::RTM_SETLINK);
        builder.append(&ifinfo);

        self.request_ack(builder).await
    }

    /// Delete a network interface by index.
    ///
    /// Deleting either end of a veth pair removes both.
    pub async fn del_link_by_index(&self, ifindex: u32) -> Result<()> {
        let mut builder = ack_request(NlMsgType::RTM_DELLINK);
        builder.append(&IfInfoMsg::new().with_index(ifindex));

        self.request_ack(builder).await
    }
}
