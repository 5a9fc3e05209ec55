//! Address announcements after an attach.

use std::net::Ipv4Addr;

use crate::util::arp;

/// Announces that `ip` is now reachable through `ifname`.
///
/// Called from inside the container namespace, once per newly added
/// address. Fire-and-forget: implementations log failures themselves.
pub trait Announcer: Send + Sync {
    fn announce(&self, ip: Ipv4Addr, ifname: &str);
}

impl<F> Announcer for F
where
    F: Fn(Ipv4Addr, &str) + Send + Sync,
{
    fn announce(&self, ip: Ipv4Addr, ifname: &str) {
        self(ip, ifname)
    }
}

/// Sends one gratuitous ARP per address.
#[derive(Debug, Clone, Copy, Default)]
pub struct GratuitousArp;

impl Announcer for GratuitousArp {
    fn announce(&self, ip: Ipv4Addr, ifname: &str) {
        match arp::send_gratuitous(ifname, ip) {
            Ok(()) => tracing::debug!(%ip, ifname, "gratuitous ARP sent"),
            Err(e) => tracing::warn!(%ip, ifname, error = %e, "gratuitous ARP failed"),
        }
    }
}

/// Announces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnnouncer;

impl Announcer for NoopAnnouncer {
    fn announce(&self, ip: Ipv4Addr, ifname: &str) {
        tracing::trace!(%ip, ifname, "announcement skipped");
    }
}
