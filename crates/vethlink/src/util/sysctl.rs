//! Per-interface sysctls under `/proc/sys`.
//!
//! `/proc/sys/net` resolves against the network namespace of the thread that
//! opens the file, so these must run inside the target namespace.

use std::io;
use std::path::PathBuf;

const PROC_SYS: &str = "/proc/sys";

fn neigh_path(ifname: &str, knob: &str) -> PathBuf {
    PathBuf::from(PROC_SYS)
        .join("net/ipv4/neigh")
        .join(ifname)
        .join(knob)
}

/// Write an IPv4 neighbour (ARP) tunable for `ifname`.
pub fn write_neigh(ifname: &str, knob: &str, value: u32) -> io::Result<()> {
    let path = neigh_path(ifname, knob);
    tracing::trace!(path = %path.display(), value, "writing sysctl");
    std::fs::write(path, value.to_string())
}

/// Whether the running kernel exposes a neighbour tunable for `ifname`.
pub fn has_neigh(ifname: &str, knob: &str) -> bool {
    neigh_path(ifname, knob).exists()
}
