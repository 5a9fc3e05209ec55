//! In-memory kernel for exercising the attach lifecycle without privileges.
//!
//! `FakeKernel` is both the [`NamespaceExecutor`] and, through [`FakeOps`],
//! the [`LinkOps`] of every namespace it models. Every mutation is appended
//! to an event log so tests can assert on ordering.

use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use ipnet::Ipv4Net;

use crate::attach::{Announcer, ArpCacheTuning, AttachError, LinkOps, NamespaceExecutor};
use crate::netlink::types::{IfInfoMsg, iff};
use crate::netlink::{self, Ipv4Route, LinkMessage, VethLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FakeNs(pub u32);

const HOST: FakeNs = FakeNs(0);
const DEFAULT_MTU: u32 = 1500;

/// Kernel operations a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    FindLink,
    CreateVeth,
    SetMaster,
    AddDatapathPort,
    BringUp,
    MoveToNamespace,
    Rename,
    DeleteLink,
    ListAddresses,
    AssignAddress,
    UnassignAddress,
    InstallRoute,
    DisableTxChecksum,
    TuneArpCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeLink {
    pub index: u32,
    pub name: String,
    pub ns: FakeNs,
    pub kind: Option<String>,
    pub mtu: u32,
    pub master: Option<u32>,
    pub up: bool,
    pub peer: Option<u32>,
    pub addresses: Vec<Ipv4Net>,
    pub tx_checksum: bool,
    pub arp: Option<ArpCacheTuning>,
}

impl FakeLink {
    fn new(index: u32, name: &str, ns: FakeNs, kind: Option<&str>, mtu: u32) -> Self {
        Self {
            index,
            name: name.to_string(),
            ns,
            kind: kind.map(str::to_string),
            mtu,
            master: None,
            up: false,
            peer: None,
            addresses: Vec::new(),
            tx_checksum: true,
            arp: None,
        }
    }

    fn message(&self) -> LinkMessage {
        let mut header = IfInfoMsg::new().with_index(self.index);
        if self.up {
            header.ifi_flags |= iff::UP;
        }
        LinkMessage {
            header,
            name: Some(self.name.clone()),
            mtu: Some(self.mtu),
            master: self.master,
            kind: self.kind.clone(),
        }
    }
}

#[derive(Debug)]
struct State {
    links: Vec<FakeLink>,
    next_index: u32,
    namespaces: u32,
    routes: Vec<(FakeNs, Ipv4Route)>,
    ports: Vec<(u32, String)>,
    events: Vec<String>,
    failures: Vec<(Op, String)>,
    /// Namespace the "current thread" sees, as `setns` would set it.
    visible: FakeNs,
}

fn errno(code: i32) -> netlink::Error {
    netlink::Error::from_errno(-code)
}

impl State {
    fn check(&self, op: Op, name: &str) -> netlink::Result<()> {
        if self.failures.iter().any(|(o, n)| *o == op && n == name) {
            return Err(errno(libc::EPERM));
        }
        Ok(())
    }

    fn by_name(&self, ns: FakeNs, name: &str) -> Option<&FakeLink> {
        self.links.iter().find(|l| l.ns == ns && l.name == name)
    }

    fn by_name_mut(&mut self, ns: FakeNs, name: &str) -> netlink::Result<&mut FakeLink> {
        self.links
            .iter_mut()
            .find(|l| l.ns == ns && l.name == name)
            .ok_or_else(|| errno(libc::ENODEV))
    }

    fn by_index_mut(&mut self, ns: FakeNs, index: u32) -> netlink::Result<&mut FakeLink> {
        self.links
            .iter_mut()
            .find(|l| l.ns == ns && l.index == index)
            .ok_or_else(|| errno(libc::ENODEV))
    }

    /// Resolve `index` in `ns` and apply any failure injected for it.
    fn begin(&mut self, op: Op, ns: FakeNs, index: u32) -> netlink::Result<String> {
        let name = self.by_index_mut(ns, index)?.name.clone();
        self.check(op, &name)?;
        Ok(name)
    }

    fn alloc_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

/// Restores the modelled thread visibility when dropped.
pub struct Visibility {
    state: Arc<Mutex<State>>,
    previous: FakeNs,
}

impl Drop for Visibility {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.visible = self.previous;
    }
}

#[derive(Clone)]
pub struct FakeKernel {
    state: Arc<Mutex<State>>,
    host: FakeOps,
}

impl FakeKernel {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(State {
            links: Vec::new(),
            next_index: 1,
            namespaces: 1,
            routes: Vec::new(),
            ports: Vec::new(),
            events: Vec::new(),
            failures: Vec::new(),
            visible: HOST,
        }));
        let host = FakeOps {
            state: Arc::clone(&state),
            ns: HOST,
        };
        Self { state, host }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn host_ns(&self) -> FakeNs {
        HOST
    }

    pub fn add_namespace(&self) -> FakeNs {
        let mut state = self.lock();
        let ns = FakeNs(state.namespaces);
        state.namespaces += 1;
        ns
    }

    /// Add a forwarding device in the host namespace.
    pub fn add_device(&self, name: &str, kind: Option<&str>, mtu: u32) -> u32 {
        let mut state = self.lock();
        let index = state.alloc_index();
        let mut link = FakeLink::new(index, name, HOST, kind, mtu);
        link.up = true;
        state.links.push(link);
        index
    }

    pub fn add_link(&self, ns: FakeNs, name: &str) -> LinkMessage {
        let mut state = self.lock();
        let index = state.alloc_index();
        let link = FakeLink::new(index, name, ns, Some("veth"), DEFAULT_MTU);
        let message = link.message();
        state.links.push(link);
        message
    }

    pub fn set_addresses(&self, ns: FakeNs, name: &str, addresses: &[Ipv4Net]) {
        let mut state = self.lock();
        state.by_name_mut(ns, name).unwrap().addresses = addresses.to_vec();
    }

    pub fn ops(&self, ns: FakeNs) -> FakeOps {
        FakeOps {
            state: Arc::clone(&self.state),
            ns,
        }
    }

    pub fn link(&self, ns: FakeNs, name: &str) -> Option<FakeLink> {
        self.lock().by_name(ns, name).cloned()
    }

    pub fn find_anywhere(&self, name: &str) -> Option<FakeLink> {
        self.lock().links.iter().find(|l| l.name == name).cloned()
    }

    pub fn addresses(&self, ns: FakeNs, name: &str) -> Vec<Ipv4Net> {
        self.link(ns, name).map(|l| l.addresses).unwrap_or_default()
    }

    pub fn routes(&self, ns: FakeNs) -> Vec<Ipv4Route> {
        self.lock()
            .routes
            .iter()
            .filter(|(n, _)| *n == ns)
            .map(|(_, r)| *r)
            .collect()
    }

    pub fn datapath_ports(&self) -> Vec<(u32, String)> {
        self.lock().ports.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Make `op` fail with EPERM whenever it targets link `name`.
    pub fn fail(&self, op: Op, name: &str) {
        self.lock().failures.push((op, name.to_string()));
    }

    pub fn visible(&self) -> FakeNs {
        self.lock().visible
    }

    /// Switch the modelled thread into `ns` until the guard drops.
    pub fn enter(&self, ns: FakeNs) -> Visibility {
        let previous = std::mem::replace(&mut self.lock().visible, ns);
        Visibility {
            state: Arc::clone(&self.state),
            previous,
        }
    }

    /// An announcer that records `announce <ip> <ifname>` in the event log.
    pub fn announcer(&self) -> impl Announcer + 'static {
        let state = Arc::clone(&self.state);
        move |ip: Ipv4Addr, ifname: &str| {
            state
                .lock()
                .unwrap()
                .events
                .push(format!("announce {} {}", ip, ifname));
        }
    }
}

impl NamespaceExecutor for FakeKernel {
    type Namespace = FakeNs;
    type Ops = FakeOps;

    fn host(&self) -> &FakeOps {
        &self.host
    }

    fn with_namespace<F, Fut, T>(
        &self,
        ns: &FakeNs,
        f: F,
    ) -> impl Future<Output = Result<T, AttachError>> + Send
    where
        F: FnOnce(FakeOps) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, AttachError>> + Send,
        T: Send + 'static,
    {
        let ns = *ns;
        let kernel = self.clone();
        async move {
            let _visible = kernel.enter(ns);
            f(kernel.ops(ns)).await
        }
    }
}

/// Ops bound to one modelled namespace.
#[derive(Clone)]
pub struct FakeOps {
    state: Arc<Mutex<State>>,
    ns: FakeNs,
}

impl FakeOps {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl LinkOps for FakeOps {
    type Namespace = FakeNs;

    async fn find_link(&self, name: &str) -> netlink::Result<Option<LinkMessage>> {
        let state = self.lock();
        state.check(Op::FindLink, name)?;
        Ok(state.by_name(self.ns, name).map(FakeLink::message))
    }

    async fn create_veth(&self, veth: &VethLink) -> netlink::Result<()> {
        let mut state = self.lock();
        state.check(Op::CreateVeth, veth.name())?;
        if state.by_name(self.ns, veth.name()).is_some()
            || state.by_name(self.ns, veth.peer_name()).is_some()
        {
            return Err(errno(libc::EEXIST));
        }

        let mtu = veth.mtu_value().unwrap_or(DEFAULT_MTU);
        let (a, b) = (state.alloc_index(), state.alloc_index());
        let mut local = FakeLink::new(a, veth.name(), self.ns, Some("veth"), mtu);
        let mut peer = FakeLink::new(b, veth.peer_name(), self.ns, Some("veth"), mtu);
        local.peer = Some(b);
        peer.peer = Some(a);
        state.links.push(local);
        state.links.push(peer);
        state
            .events
            .push(format!("create {} {}", veth.name(), veth.peer_name()));
        Ok(())
    }

    async fn set_master(&self, ifindex: u32, master: u32) -> netlink::Result<()> {
        let mut state = self.lock();
        let name = state.begin(Op::SetMaster, self.ns, ifindex)?;
        state.by_index_mut(self.ns, master)?;
        state.by_index_mut(self.ns, ifindex)?.master = Some(master);
        state.events.push(format!("master {} {}", name, master));
        Ok(())
    }

    async fn add_datapath_port(&self, device: &LinkMessage, ifname: &str) -> netlink::Result<()> {
        let mut state = self.lock();
        state.check(Op::AddDatapathPort, ifname)?;
        state.by_name_mut(self.ns, ifname)?;
        state.ports.push((device.ifindex(), ifname.to_string()));
        state
            .events
            .push(format!("port {} {}", ifname, device.name_or_index()));
        Ok(())
    }

    async fn bring_up(&self, ifindex: u32) -> netlink::Result<()> {
        let mut state = self.lock();
        let name = state.begin(Op::BringUp, self.ns, ifindex)?;
        state.by_index_mut(self.ns, ifindex)?.up = true;
        state.events.push(format!("up {}", name));
        Ok(())
    }

    async fn move_to_namespace(&self, ifindex: u32, ns: &FakeNs) -> netlink::Result<()> {
        let mut state = self.lock();
        let name = state.begin(Op::MoveToNamespace, self.ns, ifindex)?;
        if ns.0 >= state.namespaces {
            return Err(errno(libc::EINVAL));
        }
        if state.by_name(*ns, &name).is_some() {
            return Err(errno(libc::EEXIST));
        }
        let link = state.by_index_mut(self.ns, ifindex)?;
        link.ns = *ns;
        // Moving a link resets it administratively down, as the kernel does.
        link.up = false;
        state.events.push(format!("move {} {}", name, ns.0));
        Ok(())
    }

    async fn rename(&self, ifindex: u32, new: &str) -> netlink::Result<()> {
        let mut state = self.lock();
        let old = state.begin(Op::Rename, self.ns, ifindex)?;
        if state.by_name(self.ns, new).is_some() {
            return Err(errno(libc::EEXIST));
        }
        state.by_index_mut(self.ns, ifindex)?.name = new.to_string();
        state.events.push(format!("rename {} {}", old, new));
        Ok(())
    }

    async fn delete_link(&self, ifindex: u32) -> netlink::Result<()> {
        let mut state = self.lock();
        let name = state.begin(Op::DeleteLink, self.ns, ifindex)?;
        let peer = state.by_index_mut(self.ns, ifindex)?.peer;
        let ns = self.ns;
        let gone = |l: &FakeLink| (l.ns == ns && l.index == ifindex) || Some(l.index) == peer;
        state.links.retain(|l| !gone(l));
        state
            .routes
            .retain(|(_, r)| r.oif() != ifindex && Some(r.oif()) != peer);
        state.events.push(format!("delete {}", name));
        Ok(())
    }

    async fn delete_link_by_name(&self, name: &str) -> netlink::Result<()> {
        let ifindex = {
            let state = self.lock();
            state.check(Op::DeleteLink, name)?;
            state
                .by_name(self.ns, name)
                .map(|l| l.index)
                .ok_or_else(|| errno(libc::ENODEV))?
        };
        self.delete_link(ifindex).await
    }

    async fn list_addresses(&self, ifindex: u32) -> netlink::Result<Vec<Ipv4Net>> {
        let mut state = self.lock();
        state.begin(Op::ListAddresses, self.ns, ifindex)?;
        Ok(state.by_index_mut(self.ns, ifindex)?.addresses.clone())
    }

    async fn assign_address(&self, ifindex: u32, address: Ipv4Net) -> netlink::Result<()> {
        let mut state = self.lock();
        let name = state.begin(Op::AssignAddress, self.ns, ifindex)?;
        let link = state.by_index_mut(self.ns, ifindex)?;
        if link.addresses.iter().any(|a| a.addr() == address.addr()) {
            return Err(errno(libc::EEXIST));
        }
        link.addresses.push(address);
        state.events.push(format!("addr {} {}", address, name));
        Ok(())
    }

    async fn unassign_address(&self, ifindex: u32, address: Ipv4Net) -> netlink::Result<()> {
        let mut state = self.lock();
        let name = state.begin(Op::UnassignAddress, self.ns, ifindex)?;
        let link = state.by_index_mut(self.ns, ifindex)?;
        let position = link
            .addresses
            .iter()
            .position(|a| *a == address)
            .ok_or_else(|| errno(libc::EADDRNOTAVAIL))?;
        link.addresses.remove(position);
        state.events.push(format!("unaddr {} {}", address, name));
        Ok(())
    }

    async fn install_route(&self, route: &Ipv4Route) -> netlink::Result<()> {
        let mut state = self.lock();
        let name = state.begin(Op::InstallRoute, self.ns, route.oif())?;
        if !state.by_index_mut(self.ns, route.oif())?.up {
            return Err(errno(libc::ENETDOWN));
        }
        let entry = (self.ns, *route);
        if !state.routes.contains(&entry) {
            state.routes.push(entry);
        }
        state
            .events
            .push(format!("route {} {}", route.destination(), name));
        Ok(())
    }

    async fn disable_tx_checksum(&self, ifname: &str) -> netlink::Result<()> {
        let mut state = self.lock();
        state.check(Op::DisableTxChecksum, ifname)?;
        let visible = state.visible;
        state.by_name_mut(visible, ifname)?.tx_checksum = false;
        state.events.push(format!("txoff {}", ifname));
        Ok(())
    }

    async fn tune_arp_cache(&self, ifname: &str, tuning: &ArpCacheTuning) -> netlink::Result<()> {
        let mut state = self.lock();
        state.check(Op::TuneArpCache, ifname)?;
        // procfs resolves against the thread's namespace, not the socket's.
        let visible = state.visible;
        state
            .by_name_mut(visible, ifname)
            .map_err(|_| errno(libc::ENOENT))?
            .arp = Some(*tuning);
        state.events.push(format!("arp {}", ifname));
        Ok(())
    }
}
