//! Strongly-typed rtnetlink messages.

mod address;
mod link;

pub use address::AddressMessage;
pub use link::LinkMessage;
