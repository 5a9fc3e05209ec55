//! Parser combinators and the `FromNetlink` trait, built on winnow.

use std::net::Ipv4Addr;

use winnow::binary::le_u16;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;

use super::error::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Types that can be parsed from a netlink message payload (after `nlmsghdr`).
pub trait FromNetlink: Sized {
    /// Parse from a mutable byte slice reference, advancing past consumed bytes.
    fn parse(input: &mut &[u8]) -> PResult<Self>;

    /// Parse from a complete payload.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse
            .parse(data)
            .map_err(|e| Error::Parse(format!("{}", e)))
    }

    /// Write the fixed header a dump request for this type needs.
    fn write_dump_header(_buf: &mut Vec<u8>) {}
}

/// Take a fixed-size kernel header off the front of the input.
pub fn parse_header<'a>(input: &mut &'a [u8], size: usize) -> PResult<&'a [u8]> {
    if input.len() < size {
        return Err(ErrMode::Cut(ContextError::new()));
    }
    take(size).parse_next(input)
}

/// Parse a netlink attribute header and return (type, payload).
///
/// The attribute type is returned with the nested/byteorder flags masked off.
pub fn parse_attr<'a>(input: &mut &'a [u8]) -> PResult<(u16, &'a [u8])> {
    let len = le_u16.parse_next(input)? as usize;
    let attr_type = le_u16.parse_next(input)?;

    if len < 4 {
        return Err(ErrMode::Cut(ContextError::new()));
    }

    let payload: &[u8] = take(len - 4).parse_next(input)?;

    let padding = ((len + 3) & !3) - len;
    let padding = padding.min(input.len());
    let _: &[u8] = take(padding).parse_next(input)?;

    Ok((attr_type & 0x3FFF, payload))
}

/// Parse all remaining attributes, dropping a malformed tail.
pub fn parse_attrs<'a>(input: &mut &'a [u8]) -> PResult<Vec<(u16, &'a [u8])>> {
    let mut attrs = Vec::new();
    while input.len() >= 4 {
        match parse_attr(input) {
            Ok(attr) => attrs.push(attr),
            Err(_) => break,
        }
    }
    let _: &[u8] = take(input.len()).parse_next(input)?;
    Ok(attrs)
}

/// Interpret a payload as a (possibly null-terminated) string.
pub fn parse_string_from_bytes(data: &[u8]) -> String {
    let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..len]).into_owned()
}

/// Interpret a payload as a native-endian u32.
pub fn parse_u32(data: &[u8]) -> Option<u32> {
    data.get(..4)
        .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
}

/// Interpret a payload as an IPv4 address.
pub fn parse_ipv4(data: &[u8]) -> Option<Ipv4Addr> {
    data.get(..4).map(|b| Ipv4Addr::new(b[0], b[1], b[2], b[3]))
}
