//! Gratuitous ARP over an `AF_PACKET` socket.
//!
//! Like the other helpers here, this acts on the calling thread's network
//! namespace.

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use super::ifname::{IFNAMSIZ, ifreq_name};

const SIOCGIFHWADDR: libc::c_ulong = 0x8927;
const ETH_P_ARP: u16 = 0x0806;
const ETH_P_IP: u16 = 0x0800;
const ARPHRD_ETHER: u16 = 1;
const ARPOP_REQUEST: u16 = 1;
const ETH_ALEN: usize = 6;

/// Size of an Ethernet/IPv4 ARP payload.
pub const ARP_PACKET_LEN: usize = 28;

/// struct ifreq with the `ifr_hwaddr` member of the union selected.
#[repr(C)]
struct IfReqHwaddr {
    ifr_name: [libc::c_char; IFNAMSIZ],
    ifr_hwaddr: libc::sockaddr,
    _pad: [u8; 8],
}

/// Build a gratuitous ARP request: sender and target protocol address are
/// both `ip`, target hardware address is zero.
pub fn gratuitous_packet(mac: [u8; ETH_ALEN], ip: Ipv4Addr) -> [u8; ARP_PACKET_LEN] {
    let mut packet = [0u8; ARP_PACKET_LEN];
    packet[0..2].copy_from_slice(&ARPHRD_ETHER.to_be_bytes());
    packet[2..4].copy_from_slice(&ETH_P_IP.to_be_bytes());
    packet[4] = ETH_ALEN as u8;
    packet[5] = 4;
    packet[6..8].copy_from_slice(&ARPOP_REQUEST.to_be_bytes());
    packet[8..14].copy_from_slice(&mac);
    packet[14..18].copy_from_slice(&ip.octets());
    packet[24..28].copy_from_slice(&ip.octets());
    packet
}

/// Datagram socket used only as an ioctl handle.
fn control_socket() -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2); ownership of the returned fd moves to OwnedFd.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn hardware_address(ifname: &str) -> io::Result<[u8; ETH_ALEN]> {
    // SAFETY: all-zero is a valid sockaddr.
    let mut req = IfReqHwaddr {
        ifr_name: ifreq_name(ifname)?,
        ifr_hwaddr: unsafe { mem::zeroed() },
        _pad: [0; 8],
    };

    let sock = control_socket()?;
    // SAFETY: req outlives the call and is laid out as struct ifreq.
    let ret = unsafe { libc::ioctl(sock.as_raw_fd(), SIOCGIFHWADDR as _, &mut req) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut mac = [0u8; ETH_ALEN];
    for (dst, src) in mac.iter_mut().zip(req.ifr_hwaddr.sa_data.iter()) {
        *dst = *src as u8;
    }
    Ok(mac)
}

fn interface_index(ifname: &str) -> io::Result<u32> {
    let name = std::ffi::CString::new(ifname)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: name is a valid NUL-terminated string.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(index)
}

/// Broadcast one gratuitous ARP for `ip` out of `ifname`.
pub fn send_gratuitous(ifname: &str, ip: Ipv4Addr) -> io::Result<()> {
    let ifindex = interface_index(ifname)?;
    let packet = gratuitous_packet(hardware_address(ifname)?, ip);

    // SAFETY: plain socket(2); ownership of the returned fd moves to OwnedFd.
    let fd = unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
            ETH_P_ARP.to_be() as libc::c_int,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let sock = unsafe { OwnedFd::from_raw_fd(fd) };

    // SAFETY: all-zero is a valid sockaddr_ll.
    let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as u16;
    addr.sll_protocol = ETH_P_ARP.to_be();
    addr.sll_ifindex = ifindex as i32;
    addr.sll_halen = ETH_ALEN as u8;
    addr.sll_addr[..ETH_ALEN].copy_from_slice(&[0xff; ETH_ALEN]);

    // SAFETY: packet and addr are valid for the lengths passed.
    let sent = unsafe {
        libc::sendto(
            sock.as_raw_fd(),
            packet.as_ptr().cast(),
            packet.len(),
            0,
            (&addr as *const libc::sockaddr_ll).cast(),
            mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if sent < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
