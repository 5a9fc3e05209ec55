//! Network namespace handles and thread-scoped entry.
//!
//! Namespace membership is a property of the calling *thread*. [`enter`]
//! switches only the current thread and hands back a guard that switches it
//! back; callers are expected to do this on a thread they own exclusively.
//!
//! # Example
//!
//! ```ignore
//! use vethlink::netlink::namespace;
//!
//! let ns = namespace::open("container-1")?;
//! let guard = namespace::enter(&ns)?;
//! // ... this thread now sees container-1's links ...
//! guard.restore()?; // or just drop it
//! ```

use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use super::error::{Error, Result};

/// The runtime directory where named network namespaces are stored.
pub const NETNS_RUN_DIR: &str = "/var/run/netns";

/// The calling thread's own namespace. `/proc/self` would name the thread
/// group leader's, which differs once any thread has switched.
const THREAD_SELF_NS: &str = "/proc/thread-self/ns/net";

/// Open a named namespace (created via `ip netns add <name>`).
pub fn open(name: &str) -> Result<NamespaceFd> {
    let path = PathBuf::from(NETNS_RUN_DIR).join(name);
    open_path(&path)
}

/// Open a namespace file by path.
pub fn open_path<P: AsRef<Path>>(path: P) -> Result<NamespaceFd> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NamespaceNotFound {
                name: path.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;
    Ok(NamespaceFd { file })
}

/// Open a process's network namespace.
pub fn open_pid(pid: u32) -> Result<NamespaceFd> {
    open_path(format!("/proc/{}/ns/net", pid))
}

/// Open the calling thread's current namespace.
pub fn current() -> Result<NamespaceFd> {
    open_path(THREAD_SELF_NS)
}

/// A handle to an open namespace file.
///
/// Holding the handle keeps the namespace alive even if its name is removed.
#[derive(Debug)]
pub struct NamespaceFd {
    file: File,
}

impl NamespaceFd {
    /// Duplicate the handle, e.g. to hand it to another thread.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
        })
    }

    /// `(device, inode)` identifying the namespace itself.
    pub fn id(&self) -> Result<(u64, u64)> {
        let meta = self.file.metadata()?;
        Ok((meta.dev(), meta.ino()))
    }

    /// Whether two handles refer to the same namespace.
    pub fn same_as(&self, other: &NamespaceFd) -> Result<bool> {
        Ok(self.id()? == other.id()?)
    }
}

impl AsRawFd for NamespaceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

fn setns(fd: RawFd) -> Result<()> {
    // SAFETY: fd is an open namespace file owned by a live NamespaceFd or
    // guard; CLONE_NEWNET restricts the switch to the network namespace.
    let ret = unsafe { libc::setns(fd, libc::CLONE_NEWNET) };
    if ret < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Switch the calling thread into `target`.
pub fn enter(target: &NamespaceFd) -> Result<NamespaceGuard> {
    let original = current()?;
    setns(target.as_raw_fd())?;
    Ok(NamespaceGuard {
        original: Some(original),
    })
}

/// Restores the thread's original namespace when dropped.
#[derive(Debug)]
pub struct NamespaceGuard {
    original: Option<NamespaceFd>,
}

impl NamespaceGuard {
    /// Restore explicitly, surfacing the error a drop would only log.
    pub fn restore(mut self) -> Result<()> {
        match self.original.take() {
            Some(original) => setns(original.as_raw_fd()),
            None => Ok(()),
        }
    }
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original.take()
            && let Err(e) = setns(original.as_raw_fd())
        {
            tracing::warn!(error = %e, "failed to restore network namespace");
        }
    }
}
