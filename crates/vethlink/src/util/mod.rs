//! Kernel knobs outside netlink: ioctls, packet sockets, procfs sysctls and
//! interface names.

pub mod arp;
pub mod ifname;
pub mod sysctl;
