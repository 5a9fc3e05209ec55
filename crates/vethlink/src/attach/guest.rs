//! Guest-side interface setup, run inside the container namespace.

use super::config::ArpCacheTuning;
use super::error::{AttachError, Result};
use super::ops::LinkOps;
use crate::netlink::LinkMessage;

/// Rename `guest` to `name` and tune its neighbour cache.
///
/// A tuning failure is reported as-is; the rename is not undone.
pub async fn setup_guest<O: LinkOps>(
    ops: &O,
    guest: &LinkMessage,
    name: &str,
    tuning: &ArpCacheTuning,
) -> Result<()> {
    let from = guest.name_or_index();

    ops.rename(guest.ifindex(), name)
        .await
        .map_err(|source| AttachError::RenameFailed {
            from: from.clone(),
            to: name.to_string(),
            source,
        })?;
    tracing::debug!(%from, to = name, "guest interface renamed");

    ops.tune_arp_cache(name, tuning)
        .await
        .map_err(|source| AttachError::CacheConfigFailed {
            link: name.to_string(),
            source,
        })?;

    Ok(())
}
