//! Attach and detach of a container's interface.
//!
//! An attach moves through: pair created, attached to the device, peer moved
//! into the container and renamed, addresses reconciled, interface up, and
//! optionally the multicast route. The route is always the final step;
//! readiness checks inside the container wait for it.

use std::sync::Arc;

use ipnet::Ipv4Net;

use super::address::{add_addresses, remove_addresses};
use super::announce::{Announcer, GratuitousArp};
use super::config::{AttachConfig, AttachRequest, DetachRequest};
use super::error::{AttachError, Result};
use super::guest::setup_guest;
use super::ops::{LinkOps, NamespaceExecutor};
use super::veth::{VethPair, VethSpec};
use crate::netlink::Ipv4Route;
use crate::util::ifname;

/// What an attach changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachOutcome {
    /// The pair, when this call had to create it.
    pub created: Option<VethPair>,
    /// Addresses newly added; each was announced.
    pub added: Vec<Ipv4Net>,
    pub multicast_route: bool,
}

/// What a detach changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachOutcome {
    pub removed: Vec<Ipv4Net>,
    /// The interface had no addresses left and was deleted.
    pub deleted: bool,
}

/// Attaches containers to a forwarding device through a [`NamespaceExecutor`].
///
/// Holds no per-container state; concurrent calls for different containers
/// are independent.
pub struct Attacher<E: NamespaceExecutor> {
    executor: E,
    config: AttachConfig,
    announcer: Arc<dyn Announcer>,
}

impl<E: NamespaceExecutor> Attacher<E> {
    /// Validates `config`. Announcements default to [`GratuitousArp`].
    pub fn new(executor: E, config: AttachConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            config,
            announcer: Arc::new(GratuitousArp),
        })
    }

    /// Replace the announcer called for every newly added address.
    pub fn with_announcer(mut self, announcer: impl Announcer + 'static) -> Self {
        self.announcer = Arc::new(announcer);
        self
    }

    /// The executor, e.g. for direct host operations.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &AttachConfig {
        &self.config
    }

    /// Make sure the container in `ns` has interface `request.if_name()`
    /// attached to `request.device()` with the requested addresses.
    ///
    /// If the interface already exists no pair is created; addresses are
    /// reconciled and the interface brought up either way.
    pub async fn attach(
        &self,
        ns: &E::Namespace,
        request: &AttachRequest,
    ) -> Result<AttachOutcome> {
        let (local, peer) = self.config.short_names(request.id());
        for name in [request.if_name(), local.as_str(), peer.as_str()] {
            ifname::validate(name).map_err(|e| AttachError::InvalidConfig(e.to_string()))?;
        }

        let created = if self.exists(ns, request.if_name()).await? {
            tracing::debug!(
                id = request.id(),
                if_name = request.if_name(),
                "interface present, skipping creation"
            );
            None
        } else {
            Some(self.create(ns, request).await?)
        };

        let desired = request.address_list().to_vec();
        let multicast_route = request.wants_multicast_route();
        let announcer = Arc::clone(&self.announcer);

        let added = self
            .executor
            .with_namespace_link(ns, request.if_name(), move |ops, guest| async move {
                let name = guest.name_or_index();
                let added = add_addresses(&ops, &guest, &desired).await?;

                ops.bring_up(guest.ifindex())
                    .await
                    .map_err(|source| AttachError::LinkUpFailed {
                        link: name.clone(),
                        source,
                    })?;

                for address in &added {
                    announcer.announce(address.addr(), &name);
                }

                if multicast_route {
                    let route = Ipv4Route::multicast(guest.ifindex());
                    ops.install_route(&route)
                        .await
                        .map_err(|source| AttachError::RouteFailed {
                            link: name.clone(),
                            destination: route.destination(),
                            source,
                        })?;
                    tracing::debug!(
                        link = %name,
                        destination = %route.destination(),
                        "multicast route installed"
                    );
                }

                Ok(added)
            })
            .await?;

        tracing::debug!(
            id = request.id(),
            if_name = request.if_name(),
            added = added.len(),
            "container attached"
        );
        Ok(AttachOutcome {
            created,
            added,
            multicast_route,
        })
    }

    /// Remove `request.cidr_list()` from the container's interface, deleting
    /// the interface once it has no IPv4 addresses left.
    pub async fn detach(
        &self,
        ns: &E::Namespace,
        request: &DetachRequest,
    ) -> Result<DetachOutcome> {
        let cidrs = request.cidr_list().to_vec();

        let outcome = self
            .executor
            .with_namespace_link(ns, request.if_name(), move |ops, guest| async move {
                let removal = remove_addresses(&ops, &guest, &cidrs).await?;
                let deleted = removal.remaining.is_empty();
                if deleted {
                    ops.delete_link(guest.ifindex())
                        .await
                        .map_err(|source| AttachError::LinkDeleteFailed {
                            link: guest.name_or_index(),
                            source,
                        })?;
                }
                Ok(DetachOutcome {
                    removed: removal.removed,
                    deleted,
                })
            })
            .await?;

        tracing::debug!(
            id = request.id(),
            if_name = request.if_name(),
            removed = outcome.removed.len(),
            deleted = outcome.deleted,
            "container detached"
        );
        Ok(outcome)
    }

    async fn exists(&self, ns: &E::Namespace, if_name: &str) -> Result<bool> {
        let name = if_name.to_string();
        let found = self
            .executor
            .with_namespace(ns, move |ops| async move {
                ops.find_link(&name)
                    .await
                    .map_err(|e| AttachError::lookup(&name, e))
            })
            .await?;
        Ok(found.is_some())
    }

    async fn create(&self, ns: &E::Namespace, request: &AttachRequest) -> Result<VethPair> {
        let (local, peer) = self.config.short_names(request.id());
        let host = self.executor.host();
        let tuning = self.config.arp;
        let if_name = request.if_name().to_string();

        VethSpec::new(&local, &peer, request.device())
            .mtu(request.mtu_value())
            .create_with(host, |_local, guest| async move {
                if let Err(e) = host.disable_tx_checksum(&peer).await {
                    tracing::warn!(
                        link = %peer,
                        error = %e,
                        "could not disable TX checksum offload"
                    );
                }

                host.move_to_namespace(guest.ifindex(), ns)
                    .await
                    .map_err(|source| AttachError::NamespaceMoveFailed {
                        link: peer.clone(),
                        source,
                    })?;
                tracing::debug!(link = %peer, "peer moved into container namespace");

                self.executor
                    .with_namespace_link(ns, &peer, move |ops, guest| async move {
                        setup_guest(&ops, &guest, &if_name, &tuning).await
                    })
                    .await
            })
            .await
    }
}
