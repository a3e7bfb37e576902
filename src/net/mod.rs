//! Transport layer: the UDP multiplexer and ARP-based IP resolution.

pub mod arp;
pub mod multiplexer;

pub use multiplexer::{Claim, HandlerId, PacketHandler, UdpMultiplexer};
