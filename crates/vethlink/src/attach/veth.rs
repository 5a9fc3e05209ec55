//! Veth pair creation and attachment to a forwarding device.
//!
//! Everything after the pair exists is undone by deleting the local end
//! (which takes the peer with it) if a later step fails.

use std::future::{Future, Ready};

use super::device::ForwardingDeviceKind;
use super::error::{AttachError, Result};
use super::ops::LinkOps;
use crate::netlink::{LinkMessage, VethLink};

/// A veth pair attached to its forwarding device with the local end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    pub local: String,
    pub peer: String,
    pub local_index: u32,
    pub mtu: Option<u32>,
    pub device: String,
    pub device_kind: ForwardingDeviceKind,
}

/// Parameters for creating a pair.
///
/// ```ignore
/// let pair = VethSpec::new("vethpl3f2a9", "vethpg3f2a9", "weave")
///     .create(executor.host())
///     .await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethSpec {
    local: String,
    peer: String,
    device: String,
    mtu: u32,
}

type NoInit = fn(LinkMessage, LinkMessage) -> Ready<Result<()>>;

impl VethSpec {
    /// Pair `local` (host side) and `peer`, attached to `device`.
    pub fn new(
        local: impl Into<String>,
        peer: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            local: local.into(),
            peer: peer.into(),
            device: device.into(),
            mtu: 0,
        }
    }

    /// 0 (the default) inherits the forwarding device's MTU.
    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    /// Create the pair, attach the local end and bring it up.
    pub async fn create<O: LinkOps>(&self, ops: &O) -> Result<VethPair> {
        self.build(ops, None::<NoInit>).await
    }

    /// Like [`create`](Self::create), running `init(local, peer)` before the
    /// local end is brought up. An `init` error rolls the pair back.
    pub async fn create_with<O, F, Fut>(&self, ops: &O, init: F) -> Result<VethPair>
    where
        O: LinkOps,
        F: FnOnce(LinkMessage, LinkMessage) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.build(ops, Some(init)).await
    }

    async fn build<O, F, Fut>(&self, ops: &O, init: Option<F>) -> Result<VethPair>
    where
        O: LinkOps,
        F: FnOnce(LinkMessage, LinkMessage) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let device = ops
            .find_link(&self.device)
            .await
            .map_err(|e| match AttachError::lookup(&self.device, e) {
                AttachError::InterfaceNotFound { .. } => AttachError::DeviceNotFound {
                    device: self.device.clone(),
                },
                other => other,
            })?
            .ok_or_else(|| AttachError::DeviceNotFound {
                device: self.device.clone(),
            })?;

        let mtu = match self.mtu {
            0 => device.mtu().unwrap_or(0),
            mtu => mtu,
        };
        let veth = VethLink::new(&self.local, &self.peer).mtu(mtu);

        ops.create_veth(&veth)
            .await
            .map_err(|source| AttachError::CreationFailed {
                local: self.local.clone(),
                peer: self.peer.clone(),
                source,
            })?;

        let local = match ops.find_link(&self.local).await {
            Ok(Some(local)) => local,
            Ok(None) => {
                tracing::warn!(local = %self.local, "veth pair vanished after creation");
                return Err(AttachError::InterfaceNotFound {
                    name: self.local.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(local = %self.local, error = %e, "cannot resolve new veth");
                rollback_by_name(ops, &self.local).await;
                return Err(AttachError::lookup(&self.local, e));
            }
        };
        tracing::debug!(local = %self.local, peer = %self.peer, mtu, "veth pair created");

        let kind = ForwardingDeviceKind::classify(&device);
        if let Err(e) = self.finish(ops, &device, &kind, &local, init).await {
            rollback(ops, &local).await;
            return Err(e);
        }

        Ok(VethPair {
            local: self.local.clone(),
            peer: self.peer.clone(),
            local_index: local.ifindex(),
            mtu: veth.mtu_value(),
            device: self.device.clone(),
            device_kind: kind,
        })
    }

    async fn finish<O, F, Fut>(
        &self,
        ops: &O,
        device: &LinkMessage,
        kind: &ForwardingDeviceKind,
        local: &LinkMessage,
        init: Option<F>,
    ) -> Result<()>
    where
        O: LinkOps,
        F: FnOnce(LinkMessage, LinkMessage) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let attached = match kind {
            ForwardingDeviceKind::KernelBridge => {
                ops.set_master(local.ifindex(), device.ifindex()).await
            }
            ForwardingDeviceKind::DatapathGeneric | ForwardingDeviceKind::DatapathDevice => {
                ops.add_datapath_port(device, &self.local).await
            }
            ForwardingDeviceKind::Unsupported { kind } => {
                return Err(AttachError::UnsupportedDevice {
                    device: self.device.clone(),
                    kind: kind.clone(),
                });
            }
        };
        attached.map_err(|source| AttachError::AttachFailed {
            link: self.local.clone(),
            device: self.device.clone(),
            source,
        })?;
        tracing::debug!(local = %self.local, device = %self.device, %kind, "veth attached");

        if let Some(init) = init {
            let peer = ops
                .find_link(&self.peer)
                .await
                .map_err(|e| AttachError::lookup(&self.peer, e))?
                .ok_or_else(|| AttachError::InterfaceNotFound {
                    name: self.peer.clone(),
                })?;
            init(local.clone(), peer).await?;
        }

        ops.bring_up(local.ifindex())
            .await
            .map_err(|source| AttachError::LinkUpFailed {
                link: self.local.clone(),
                source,
            })
    }
}

/// Best-effort delete; a failure is logged, never returned.
async fn rollback<O: LinkOps>(ops: &O, local: &LinkMessage) {
    let name = local.name_or_index();
    match ops.delete_link(local.ifindex()).await {
        Ok(()) => tracing::debug!(local = %name, "veth pair rolled back"),
        Err(e) => tracing::warn!(local = %name, error = %e, "veth rollback failed"),
    }
}

async fn rollback_by_name<O: LinkOps>(ops: &O, local: &str) {
    match ops.delete_link_by_name(local).await {
        Ok(()) => tracing::debug!(local, "veth pair rolled back"),
        Err(e) => tracing::warn!(local, error = %e, "veth rollback failed"),
    }
}
