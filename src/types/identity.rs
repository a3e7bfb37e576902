//! Device identity and addressing.

use std::net::Ipv4Addr;

use super::mac::MacAddress;

/// The stable identity of a device: its MAC and serial number never
/// change across reboots or IP reassignment, unlike its address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub mac: MacAddress,
    pub serial: String,
}

impl DeviceIdentity {
    pub fn new(mac: MacAddress, serial: impl Into<String>) -> Self {
        DeviceIdentity {
            mac,
            serial: serial.into(),
        }
    }
}

/// A device as surfaced by the discovery wire format, before a
/// `DeviceController` is built around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub serial: String,
    pub ip: Ipv4Addr,
    pub state_counter: u32,
    pub mac: Option<MacAddress>,
}
