//! The kernel operations the attach lifecycle is written against.
//!
//! [`LinkOps`] is implemented by [`Connection`] for real kernels. A value of
//! the ops type always acts on one namespace: the host's for
//! [`NamespaceExecutor::host`], the target's inside
//! [`NamespaceExecutor::with_namespace`].

use std::future::Future;
use std::os::unix::io::AsRawFd;

use ipnet::Ipv4Net;

use super::config::ArpCacheTuning;
use super::error::{AttachError, Result};
use crate::netlink::{
    self, Connection, FeaturesRequest, GenlConnection, Ipv4Address, Ipv4Route, LinkMessage,
    NamespaceFd, NetdevVport, VethLink,
};
use crate::util::sysctl;

/// Link, address and route primitives in a single namespace.
pub trait LinkOps: Send + Sync {
    /// Handle used to move links into another namespace.
    type Namespace: Send + Sync;

    /// Look up a link by name. `Ok(None)` when absent.
    fn find_link(
        &self,
        name: &str,
    ) -> impl Future<Output = netlink::Result<Option<LinkMessage>>> + Send;

    /// Create both ends of `veth`; a name collision is an error.
    fn create_veth(&self, veth: &VethLink) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Enslave `ifindex` to bridge `master`.
    fn set_master(
        &self,
        ifindex: u32,
        master: u32,
    ) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Add link `ifname` as a port of datapath `device`.
    fn add_datapath_port(
        &self,
        device: &LinkMessage,
        ifname: &str,
    ) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Set the link administratively up.
    fn bring_up(&self, ifindex: u32) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Move a link into `ns`. The kernel takes it down on the way.
    fn move_to_namespace(
        &self,
        ifindex: u32,
        ns: &Self::Namespace,
    ) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Rename a link. Fails with `EBUSY` while it is up.
    fn rename(&self, ifindex: u32, name: &str) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Delete a link. Deleting either end of a veth pair removes both.
    fn delete_link(&self, ifindex: u32) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Delete a link whose index could not be resolved.
    fn delete_link_by_name(&self, name: &str) -> impl Future<Output = netlink::Result<()>> + Send;

    /// IPv4 addresses on `ifindex`, in kernel order.
    fn list_addresses(
        &self,
        ifindex: u32,
    ) -> impl Future<Output = netlink::Result<Vec<Ipv4Net>>> + Send;

    /// Add `address`; an address with the same IP fails with `EEXIST`.
    fn assign_address(
        &self,
        ifindex: u32,
        address: Ipv4Net,
    ) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Remove an address matching both IP and prefix length.
    fn unassign_address(
        &self,
        ifindex: u32,
        address: Ipv4Net,
    ) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Install a route. An identical existing route counts as success.
    fn install_route(&self, route: &Ipv4Route) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Clear TX checksum offload on `ifname`.
    fn disable_tx_checksum(&self, ifname: &str) -> impl Future<Output = netlink::Result<()>> + Send;

    /// Write the neighbour tunables of `ifname` as seen from the calling
    /// thread's namespace.
    fn tune_arp_cache(
        &self,
        ifname: &str,
        tuning: &ArpCacheTuning,
    ) -> impl Future<Output = netlink::Result<()>> + Send;
}

/// Runs work with network visibility switched to a namespace.
///
/// This is the only place namespace boundaries are crossed. Implementations
/// must pin one execution unit per call and restore its original namespace
/// on every exit path before releasing it.
pub trait NamespaceExecutor: Send + Sync {
    type Namespace: Send + Sync;
    type Ops: LinkOps<Namespace = Self::Namespace> + 'static;

    /// Operations acting on the host namespace.
    fn host(&self) -> &Self::Ops;

    /// Run `f` with ops bound to `ns`.
    fn with_namespace<F, Fut, T>(
        &self,
        ns: &Self::Namespace,
        f: F,
    ) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce(Self::Ops) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
        T: Send + 'static;

    /// Like [`with_namespace`](Self::with_namespace), resolving link `name`
    /// inside `ns` first.
    fn with_namespace_link<F, Fut, T>(
        &self,
        ns: &Self::Namespace,
        name: &str,
        f: F,
    ) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce(Self::Ops, LinkMessage) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
        T: Send + 'static,
    {
        let name = name.to_string();
        self.with_namespace(ns, move |ops| async move {
            let link = ops
                .find_link(&name)
                .await
                .map_err(|e| AttachError::lookup(&name, e))?
                .ok_or(AttachError::InterfaceNotFound { name })?;
            f(ops, link).await
        })
    }
}

impl LinkOps for Connection {
    type Namespace = NamespaceFd;

    async fn find_link(&self, name: &str) -> netlink::Result<Option<LinkMessage>> {
        self.get_link_by_name(name).await
    }

    async fn create_veth(&self, veth: &VethLink) -> netlink::Result<()> {
        self.add_link(veth).await
    }

    async fn set_master(&self, ifindex: u32, master: u32) -> netlink::Result<()> {
        self.set_link_master_by_index(ifindex, master).await
    }

    async fn add_datapath_port(&self, device: &LinkMessage, ifname: &str) -> netlink::Result<()> {
        // The vport family lives on generic netlink, in this thread's namespace.
        let genl = GenlConnection::new()?;
        genl.add_vport(&NetdevVport::new(device.ifindex(), ifname))
            .await
    }

    async fn bring_up(&self, ifindex: u32) -> netlink::Result<()> {
        self.set_link_up_by_index(ifindex).await
    }

    async fn move_to_namespace(&self, ifindex: u32, ns: &NamespaceFd) -> netlink::Result<()> {
        self.set_link_netns_fd(ifindex, ns.as_raw_fd()).await
    }

    async fn rename(&self, ifindex: u32, name: &str) -> netlink::Result<()> {
        self.set_link_name_by_index(ifindex, name).await
    }

    async fn delete_link(&self, ifindex: u32) -> netlink::Result<()> {
        self.del_link_by_index(ifindex).await
    }

    async fn delete_link_by_name(&self, name: &str) -> netlink::Result<()> {
        self.del_link_by_name(name).await
    }

    async fn list_addresses(&self, ifindex: u32) -> netlink::Result<Vec<Ipv4Net>> {
        self.get_ipv4_addresses(ifindex).await
    }

    async fn assign_address(&self, ifindex: u32, address: Ipv4Net) -> netlink::Result<()> {
        self.add_address(Ipv4Address::new(ifindex, address)).await
    }

    async fn unassign_address(&self, ifindex: u32, address: Ipv4Net) -> netlink::Result<()> {
        self.del_address(Ipv4Address::new(ifindex, address)).await
    }

    async fn install_route(&self, route: &Ipv4Route) -> netlink::Result<()> {
        match self.add_route(route).await {
            Err(e) if e.is_already_exists() => {
                tracing::debug!(
                    destination = %route.destination(),
                    oif = route.oif(),
                    "route already present"
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn disable_tx_checksum(&self, ifname: &str) -> netlink::Result<()> {
        let genl = GenlConnection::new()?;
        genl.set_features(&FeaturesRequest::tx_checksum(ifname, false))
            .await
    }

    async fn tune_arp_cache(&self, ifname: &str, tuning: &ArpCacheTuning) -> netlink::Result<()> {
        sysctl::write_neigh(ifname, "base_reachable_time", tuning.base_reachable_time)?;
        sysctl::write_neigh(ifname, "delay_first_probe_time", tuning.delay_first_probe_time)?;
        if sysctl::has_neigh(ifname, "ucast_solicit") {
            sysctl::write_neigh(ifname, "ucast_solicit", tuning.ucast_solicit)?;
        }
        Ok(())
    }
}
