//! Common test utilities for integration tests.
//!
//! Provides `TestNamespace` for isolated network namespace testing
//! and helper macros for conditional test execution.

use std::process::Command;
use std::sync::Once;
use std::sync::atomic::{AtomicU32, Ordering};

use vethlink::netlink::{self, Connection, NamespaceFd, NamespaceGuard, Protocol, namespace};

pub type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Global counter for unique namespace names.
static NAMESPACE_COUNTER: AtomicU32 = AtomicU32::new(0);

static TRACING: Once = Once::new();

/// Generate a unique namespace name for this test.
fn unique_ns_name(prefix: &str) -> String {
    let id = NAMESPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    format!("vethlink-test-{}-{}-{}", prefix, pid, id)
}

/// Install a fmt subscriber once, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A test network namespace, deleted on drop.
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    /// Create a new test namespace with a unique name.
    pub fn new(prefix: &str) -> netlink::Result<Self> {
        let name = unique_ns_name(prefix);

        let status = Command::new("ip").args(["netns", "add", &name]).status()?;
        if !status.success() {
            return Err(netlink::Error::InvalidMessage(format!(
                "failed to create namespace: {}",
                name
            )));
        }

        Ok(Self { name })
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a handle to this namespace.
    pub fn handle(&self) -> netlink::Result<NamespaceFd> {
        namespace::open(&self.name)
    }

    /// Switch the calling thread into this namespace until the guard drops.
    ///
    /// `#[tokio::test]` runs on a current-thread runtime, so everything the
    /// test awaits afterwards sees this namespace.
    pub fn enter(&self) -> netlink::Result<NamespaceGuard> {
        namespace::enter(&self.handle()?)
    }

    /// Open a route connection bound to this namespace.
    pub fn connection(&self) -> netlink::Result<Connection> {
        let guard = self.enter()?;
        let conn = Connection::new(Protocol::Route);
        guard.restore()?;
        conn
    }

    /// Run a command in the namespace and return its output.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> netlink::Result<String> {
        let output = Command::new("ip")
            .args(["netns", "exec", &self.name, cmd])
            .args(args)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(netlink::Error::InvalidMessage(format!(
                "command failed: {} {:?}: {}",
                cmd, args, stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Add a Linux bridge and bring it up.
    pub fn add_bridge(&self, name: &str, mtu: u32) -> netlink::Result<()> {
        self.exec(
            "ip",
            &["link", "add", name, "mtu", &mtu.to_string(), "type", "bridge"],
        )?;
        self.exec("ip", &["link", "set", name, "up"])?;
        Ok(())
    }

    /// Add a dummy interface in this namespace.
    #[allow(dead_code)]
    pub fn add_dummy(&self, name: &str) -> netlink::Result<()> {
        self.exec("ip", &["link", "add", name, "type", "dummy"])?;
        Ok(())
    }

    /// Whether `name` exists in this namespace.
    pub fn has_link(&self, name: &str) -> bool {
        self.exec("ip", &["link", "show", name]).is_ok()
    }

    /// IPv4 addresses on `dev` as `a.b.c.d/len` strings.
    pub fn ipv4_addrs(&self, dev: &str) -> netlink::Result<Vec<String>> {
        let out = self.exec("ip", &["-4", "-o", "addr", "show", "dev", dev])?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                fields.find(|f| *f == "inet")?;
                fields.next().map(str::to_string)
            })
            .collect())
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["netns", "del", &self.name])
            .status();
    }
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ns_name() {
        let name1 = unique_ns_name("test");
        let name2 = unique_ns_name("test");
        assert_ne!(name1, name2);
        assert!(name1.starts_with("vethlink-test-test-"));
    }
}
