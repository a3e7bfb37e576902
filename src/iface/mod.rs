//! Local network interface enumeration.
//!
//! Discovery and IP resolution both need to broadcast on every "real"
//! up interface with an IPv4 address — loopback and down interfaces are
//! skipped. `netdev` gives us the platform-specific enumeration the
//! teacher's own TUN/TAP code didn't need to do.

use std::net::Ipv4Addr;

/// A usable local interface: its name, its unicast IPv4 address, and
/// the directed broadcast address derived from its netmask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub address: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

fn directed_broadcast(address: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let addr_bits = u32::from(address);
    let host_bits = if prefix_len >= 32 { 0 } else { u32::MAX >> prefix_len };
    Ipv4Addr::from(addr_bits | host_bits)
}

/// Enumerate up, non-loopback interfaces carrying an IPv4 address.
pub fn enumerate() -> Vec<NetworkInterface> {
    netdev::get_interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .flat_map(|iface| {
            let name = iface.name.clone();
            iface
                .ipv4
                .iter()
                .map(|net| NetworkInterface {
                    name: name.clone(),
                    address: net.addr(),
                    broadcast: directed_broadcast(net.addr(), net.prefix_len()),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
