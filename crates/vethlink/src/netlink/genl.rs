//! Generic Netlink header and family resolution.
//!
//! GENL messages carry a `genlmsghdr` after the standard netlink header,
//! then an optional family-specific header, then attributes.

use tokio::sync::Mutex;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{AttrIter, get};
use super::builder::MessageBuilder;
use super::connection::process_ack;
use super::error::{Error, Result};
use super::message::{MessageIter, NLM_F_ACK, NLM_F_REQUEST, NlMsgError};
use super::socket::{NetlinkSocket, Protocol};

/// Generic Netlink message header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GenlMsgHdr {
    pub cmd: u8,
    pub version: u8,
    pub reserved: u16,
}

/// Size of the GENL header in bytes.
pub const GENL_HDRLEN: usize = std::mem::size_of::<GenlMsgHdr>();

impl GenlMsgHdr {
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }
}

/// Controller family id.
pub const GENL_ID_CTRL: u16 = 0x10;

const CTRL_CMD_GETFAMILY: u8 = 3;
const CTRL_ATTR_FAMILY_ID: u16 = 1;
const CTRL_ATTR_FAMILY_NAME: u16 = 2;

/// Generic Netlink connection.
///
/// Like [`Connection`](super::Connection), one exchange is in flight at a time.
pub struct GenlConnection {
    socket: NetlinkSocket,
    exchange: Mutex<()>,
}

impl GenlConnection {
    /// Open a generic netlink socket in the calling thread's namespace.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new(Protocol::Generic)?,
            exchange: Mutex::new(()),
        })
    }

    /// Local port id, used where a family wants an upcall/notification pid.
    pub fn pid(&self) -> u32 {
        self.socket.pid()
    }

    /// Resolve a family name to its dynamically assigned id.
    pub async fn get_family_id(&self, name: &str) -> Result<u16> {
        let mut builder = MessageBuilder::new(GENL_ID_CTRL, NLM_F_REQUEST | NLM_F_ACK);
        builder.append(&GenlMsgHdr::new(CTRL_CMD_GETFAMILY, 1));
        builder.append_attr_str(CTRL_ATTR_FAMILY_NAME, name);

        let _exchange = self.exchange.lock().await;
        let seq = self.send(builder).await?;

        loop {
            let response = self.socket.recv_msg().await?;
            match parse_family_id(&response, seq) {
                Ok(Some(id)) => return Ok(id),
                Ok(None) => continue,
                Err(e) if e.is_not_found() => {
                    return Err(Error::FamilyNotFound {
                        name: name.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a family command and wait for its ACK.
    pub async fn command_ack(&self, builder: MessageBuilder) -> Result<()> {
        let _exchange = self.exchange.lock().await;
        let seq = self.send(builder).await?;
        loop {
            let response = self.socket.recv_msg().await?;
            if process_ack(&response, seq)? {
                return Ok(());
            }
        }
    }

    async fn send(&self, mut builder: MessageBuilder) -> Result<u32> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());
        self.socket.send(&builder.finish()).await?;
        Ok(seq)
    }
}

/// Extract CTRL_ATTR_FAMILY_ID from a GETFAMILY response.
fn parse_family_id(data: &[u8], seq: u32) -> Result<Option<u16>> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq || header.is_done() {
            continue;
        }

        if header.is_error() {
            let err = NlMsgError::from_bytes(payload)?;
            if !err.is_ack() {
                return Err(Error::from_errno(err.error));
            }
            continue;
        }

        let attrs = payload
            .get(GENL_HDRLEN..)
            .ok_or_else(|| Error::InvalidMessage("GENL header too short".into()))?;
        for (kind, value) in AttrIter::new(attrs) {
            if kind == CTRL_ATTR_FAMILY_ID {
                return get::u16_ne(value).map(Some);
            }
        }
        return Err(Error::InvalidMessage("family id missing".into()));
    }

    Ok(None)
}
