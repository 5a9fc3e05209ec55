//! Address reconciliation on a guest interface.
//!
//! Adding is keyed on the IP alone: an address already present with a
//! different prefix length is left as it is. Removing requires an exact
//! (IP, prefix) match. The asymmetry is intentional and callers rely on it.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use super::error::{AttachError, Result};
use super::ops::LinkOps;
use crate::netlink::LinkMessage;

/// Desired addresses whose IP is not yet on the interface, in `desired`
/// order. Of several desired entries sharing an IP, only the first counts.
pub fn plan_additions(existing: &[Ipv4Net], desired: &[Ipv4Net]) -> Vec<Ipv4Net> {
    let mut seen: HashSet<Ipv4Addr> = existing.iter().map(Ipv4Net::addr).collect();
    desired
        .iter()
        .filter(|net| seen.insert(net.addr()))
        .copied()
        .collect()
}

/// Entries of `to_remove` present exactly on the interface.
pub fn plan_removals(existing: &[Ipv4Net], to_remove: &[Ipv4Net]) -> Vec<Ipv4Net> {
    let mut seen = HashSet::new();
    to_remove
        .iter()
        .filter(|net| existing.contains(net) && seen.insert(**net))
        .copied()
        .collect()
}

/// Result of [`remove_addresses`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: Vec<Ipv4Net>,
    /// Addresses left on the interface afterwards, re-read from the kernel.
    pub remaining: Vec<Ipv4Net>,
}

/// Add the missing desired addresses to `link` and return the ones added.
pub async fn add_addresses<O: LinkOps>(
    ops: &O,
    link: &LinkMessage,
    desired: &[Ipv4Net],
) -> Result<Vec<Ipv4Net>> {
    let name = link.name_or_index();
    let existing = list(ops, link, &name).await?;

    let additions = plan_additions(&existing, desired);
    for address in &additions {
        ops.assign_address(link.ifindex(), *address)
            .await
            .map_err(|source| AttachError::AddressMutationFailed {
                link: name.clone(),
                address: *address,
                source,
            })?;
        tracing::debug!(link = %name, %address, "address added");
    }

    Ok(additions)
}

/// Remove exact matches of `cidrs` from `link`. Absent entries are skipped.
pub async fn remove_addresses<O: LinkOps>(
    ops: &O,
    link: &LinkMessage,
    cidrs: &[Ipv4Net],
) -> Result<Removal> {
    let name = link.name_or_index();
    let existing = list(ops, link, &name).await?;

    let removed = plan_removals(&existing, cidrs);
    for address in &removed {
        ops.unassign_address(link.ifindex(), *address)
            .await
            .map_err(|source| AttachError::AddressMutationFailed {
                link: name.clone(),
                address: *address,
                source,
            })?;
        tracing::debug!(link = %name, %address, "address removed");
    }

    let remaining = list(ops, link, &name).await?;
    Ok(Removal { removed, remaining })
}

async fn list<O: LinkOps>(ops: &O, link: &LinkMessage, name: &str) -> Result<Vec<Ipv4Net>> {
    ops.list_addresses(link.ifindex())
        .await
        .map_err(|source| AttachError::AddressQueryFailed {
            link: name.to_string(),
            source,
        })
}
