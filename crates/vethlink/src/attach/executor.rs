//! Namespace executor backed by dedicated OS threads.
//!
//! `setns(2)` changes the namespace of the calling thread only, so work for
//! a container never runs on a shared tokio worker. Each call gets a fresh
//! thread that enters the namespace, runs a single-threaded runtime to
//! completion and then exits.

use std::future::Future;
use std::thread;

use tokio::sync::oneshot;

use super::error::{AttachError, Result};
use super::ops::NamespaceExecutor;
use crate::netlink::{self, Connection, NamespaceFd, Protocol, namespace};

/// [`NamespaceExecutor`] for real kernels.
pub struct ThreadExecutor {
    host: Connection,
}

impl ThreadExecutor {
    /// Open a route connection in the caller's (host) namespace.
    pub fn new() -> netlink::Result<Self> {
        Ok(Self::with_host(Connection::new(Protocol::Route)?))
    }

    /// Use an existing host connection, e.g. one opened in a test namespace.
    pub fn with_host(host: Connection) -> Self {
        Self { host }
    }
}

impl NamespaceExecutor for ThreadExecutor {
    type Namespace = NamespaceFd;
    type Ops = Connection;

    fn host(&self) -> &Connection {
        &self.host
    }

    fn with_namespace<F, Fut, T>(
        &self,
        ns: &NamespaceFd,
        f: F,
    ) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce(Connection) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
        T: Send + 'static,
    {
        let spawned = spawn_pinned(ns, f);
        async move {
            let rx = spawned?;
            rx.await.map_err(|_| AttachError::ExecutorPanicked)?
        }
    }
}

fn spawn_pinned<F, Fut, T>(ns: &NamespaceFd, f: F) -> Result<oneshot::Receiver<Result<T>>>
where
    F: FnOnce(Connection) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>>,
    T: Send + 'static,
{
    // The thread owns its own handle; the caller's may be closed meanwhile.
    let target = ns.try_clone().map_err(AttachError::Namespace)?;
    let (tx, rx) = oneshot::channel();

    thread::Builder::new()
        .name("netns-exec".to_string())
        .spawn(move || {
            // A panic drops `tx` unsent; the guard inside has already
            // switched the thread back while unwinding.
            let _ = tx.send(run_in_namespace(&target, f));
        })
        .map_err(|e| AttachError::Namespace(netlink::Error::Io(e)))?;

    Ok(rx)
}

fn run_in_namespace<F, Fut, T>(target: &NamespaceFd, f: F) -> Result<T>
where
    F: FnOnce(Connection) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AttachError::Namespace(netlink::Error::Io(e)))?;

    let guard = namespace::enter(target).map_err(AttachError::Namespace)?;

    // The socket must be opened after entering so it binds to `target`.
    let result = runtime.block_on(async move {
        let conn = Connection::new(Protocol::Route).map_err(AttachError::Namespace)?;
        f(conn).await
    });

    if let Err(e) = guard.restore() {
        // The thread exits right after, so nothing else observes it.
        tracing::warn!(error = %e, "failed to leave network namespace");
    }

    result
}
