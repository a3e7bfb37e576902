//! Neighbor-table (ARP) lookups.
//!
//! This never sends or answers ARP traffic itself — it only reads the
//! kernel's existing neighbor table at `/proc/net/arp`, which the OS
//! populates as a side effect of ordinary IP traffic. Lookups are pure
//! and cheap but still do blocking file I/O, so every call runs inside
//! `tokio::task::spawn_blocking`.

use std::fs;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::types::MacAddress;

const ARP_TABLE_PATH: &str = "/proc/net/arp";

fn parse_arp_table(contents: &str) -> Vec<(Ipv4Addr, MacAddress)> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ip = Ipv4Addr::from_str(fields.next()?).ok()?;
            let _hw_type = fields.next()?;
            let _flags = fields.next()?;
            let mac_field = fields.next()?;
            let mac = MacAddress::parse(mac_field).ok()?;
            Some((ip, mac))
        })
        .collect()
}

/// Look up the IPv4 address currently associated with `mac` in the
/// kernel's neighbor table, if any.
pub async fn resolve(mac: MacAddress) -> Option<Ipv4Addr> {
    tokio::task::spawn_blocking(move || {
        let contents = fs::read_to_string(ARP_TABLE_PATH).ok()?;
        parse_arp_table(&contents)
            .into_iter()
            .find(|(_, entry_mac)| *entry_mac == mac)
            .map(|(ip, _)| ip)
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.10     0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0
192.168.1.11     0x1         0x0         00:00:00:00:00:00     *        eth0
";

    #[test]
    fn parses_well_formed_table() {
        let entries = parse_arp_table(SAMPLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(entries[0].1, MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap());
    }

    #[test]
    fn finds_mac_by_linear_scan() {
        let entries = parse_arp_table(SAMPLE);
        let target = MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        assert!(entries.iter().any(|(_, mac)| *mac == target));
    }

    #[test]
    fn skips_unparseable_lines() {
        let malformed = "IP address HW type\nnotanip 0x1 0x2 nothex *  eth0\n";
        assert!(parse_arp_table(malformed).is_empty());
    }
}
