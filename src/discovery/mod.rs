//! Device discovery: broadcast probing and direct-address verification.
//!
//! Every discovery-shaped operation (`discover`, `verify`,
//! `find_by_serial`, `discover_with_info`) shares one `ReplyCollector`
//! registration at a time, serialized behind a single-flight lock —
//! the multiplexer only dispatches a reply datagram to the first
//! handler that claims it, so two overlapping collectors would race
//! for the same replies.

mod reply_collector;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::DiscoveryConfig;
use crate::iface;
use crate::net::UdpMultiplexer;
use crate::types::{DiscoveredDevice, MacAddress};
use crate::wire::command::encode_command;

use reply_collector::ReplyCollector;

/// Broadcasts and direct probes for PixelAir devices on the local network.
pub struct DiscoveryService {
    mux: Arc<UdpMultiplexer>,
    config: DiscoveryConfig,
    port: u16,
    single_flight: Mutex<()>,
}

fn to_discovered(from: SocketAddr, reply: crate::wire::discovery::DiscoveryReply) -> Option<DiscoveredDevice> {
    let ip: Ipv4Addr = reply.ip_address.parse().unwrap_or(match from {
        SocketAddr::V4(v4) => *v4.ip(),
        SocketAddr::V6(_) => return None,
    });
    let mac = reply.mac_address.as_deref().and_then(|m| MacAddress::parse(m).ok());
    Some(DiscoveredDevice {
        serial: reply.serial_number,
        ip,
        state_counter: reply.state_counter,
        mac,
    })
}

impl DiscoveryService {
    pub fn new(mux: Arc<UdpMultiplexer>, config: DiscoveryConfig, port: u16) -> Self {
        DiscoveryService {
            mux,
            config,
            port,
            single_flight: Mutex::new(()),
        }
    }

    /// Broadcast `broadcast_count` `/discovery` probes on every local
    /// interface, spaced `broadcast_interval` apart, collecting replies
    /// until `discovery_timeout` elapses (measured from the start of the
    /// flight, not the last probe) or `stop_at` accepts a reply,
    /// whichever comes first. Devices are deduped by serial, keeping the
    /// reply with the highest `state_counter`.
    async fn broadcast_and_collect(
        &self,
        stop_at: impl Fn(&DiscoveredDevice) -> bool,
    ) -> (std::collections::HashMap<String, DiscoveredDevice>, Option<DiscoveredDevice>) {
        let _guard = self.single_flight.lock().await;
        let (collector, mut rx) = ReplyCollector::new();
        let handler_id = self.mux.add_handler(Arc::new(collector)).await;

        let probe = encode_command("/discovery", &[]);
        let deadline = tokio::time::Instant::now() + self.config.discovery_timeout;
        let mut send_interval = tokio::time::interval(self.config.broadcast_interval);
        let mut sent = 0u32;

        let mut by_serial: std::collections::HashMap<String, DiscoveredDevice> = std::collections::HashMap::new();
        let mut early_match = None;

        loop {
            if early_match.is_some() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = send_interval.tick(), if sent < self.config.broadcast_count => {
                    for iface in iface::enumerate() {
                        let addr = SocketAddr::new(iface.broadcast.into(), self.port);
                        let _ = self.mux.send_to(&probe, addr).await;
                    }
                    sent += 1;
                }
                received = rx.recv() => {
                    let Some((from, reply)) = received else { break };
                    let Some(device) = to_discovered(from, reply) else { continue };
                    if stop_at(&device) {
                        early_match = Some(device.clone());
                    }
                    by_serial
                        .entry(device.serial.clone())
                        .and_modify(|existing| {
                            if device.state_counter > existing.state_counter {
                                *existing = device.clone();
                            }
                        })
                        .or_insert(device);
                }
            }
        }

        self.mux.remove_handler(handler_id).await;
        (by_serial, early_match)
    }

    /// Broadcast-discover every device on the local broadcast domains.
    pub async fn discover(&self) -> Vec<DiscoveredDevice> {
        let (by_serial, _) = self.broadcast_and_collect(|_| false).await;
        by_serial.into_values().collect()
    }

    /// Like `discover`, but for every device that replied without a
    /// `mac_address`, sends an additional direct `verify` probe to learn
    /// it. Devices whose MAC is still unknown afterwards are dropped:
    /// spec's `discover_with_info` returns "only devices whose MAC is
    /// known".
    pub async fn discover_with_info(&self) -> Vec<DiscoveredDevice> {
        let mut devices = self.discover().await;
        for device in devices.iter_mut() {
            if device.mac.is_none() {
                if let Some(verified) = self.verify(device.ip).await {
                    device.mac = verified.mac.or(device.mac);
                }
            }
        }
        devices.retain(|d| d.mac.is_some());
        devices
    }

    /// Probe a single candidate address directly (no broadcast) and
    /// wait up to `verify_timeout` for its reply. Same `/discovery`
    /// route as the broadcast path, just addressed unicast.
    pub async fn verify(&self, ip: Ipv4Addr) -> Option<DiscoveredDevice> {
        let _guard = self.single_flight.lock().await;
        let (collector, mut rx) = ReplyCollector::new();
        let handler_id = self.mux.add_handler(Arc::new(collector)).await;

        let probe = encode_command("/discovery", &[]);
        let addr = SocketAddr::new(ip.into(), self.port);
        let _ = self.mux.send_to(&probe, addr).await;

        let result = tokio::time::timeout(self.config.verify_timeout, async {
            loop {
                match rx.recv().await {
                    Some((from, reply)) => {
                        let matches_ip = match from {
                            SocketAddr::V4(v4) => *v4.ip() == ip,
                            SocketAddr::V6(_) => false,
                        };
                        if matches_ip {
                            return to_discovered(from, reply);
                        }
                    }
                    None => return None,
                }
            }
        })
        .await
        .ok()
        .flatten();

        self.mux.remove_handler(handler_id).await;
        result
    }

    /// Broadcast-discover, stopping as soon as a reply with the matching
    /// serial arrives rather than waiting out the full discovery window.
    pub async fn find_by_serial(&self, serial: &str) -> Option<DiscoveredDevice> {
        let (by_serial, early) = self.broadcast_and_collect(|d| d.serial == serial).await;
        early.or_else(|| by_serial.into_iter().find(|(s, _)| s == serial).map(|(_, d)| d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MultiplexerConfig;

    #[tokio::test]
    async fn verify_returns_none_when_nothing_replies() {
        let mux = Arc::new(
            UdpMultiplexer::bind(&MultiplexerConfig {
                listen_port: 0,
                ..Default::default()
            })
            .unwrap(),
        );
        let _task = mux.start();
        let mut config = DiscoveryConfig::default();
        config.verify_timeout = Duration::from_millis(50);
        let service = DiscoveryService::new(mux.clone(), config, 65500);

        let result = service.verify("127.0.0.1".parse().unwrap()).await;
        assert!(result.is_none());
        mux.stop();
    }

    #[tokio::test]
    async fn find_by_serial_returns_as_soon_as_a_match_arrives() {
        let mux = Arc::new(
            UdpMultiplexer::bind(&MultiplexerConfig {
                listen_port: 0,
                ..Default::default()
            })
            .unwrap(),
        );
        let _task = mux.start();
        let mux_addr = mux.local_addr().unwrap();

        // A long discovery window: if `find_by_serial` waited it out
        // instead of returning on the first match, this test would run
        // for the full 10 seconds.
        let config = DiscoveryConfig {
            discovery_timeout: Duration::from_secs(10),
            broadcast_count: 1,
            broadcast_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let service = Arc::new(DiscoveryService::new(mux.clone(), config, 65501));

        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let reply = br#"${"serial_number":"SN-MATCH","ip_address":"127.0.0.1","state_counter":1}"#;
            let _ = peer.send_to(reply, mux_addr).await;
        });

        let start = tokio::time::Instant::now();
        let found = service.find_by_serial("SN-MATCH").await;
        assert!(found.is_some());
        assert_eq!(found.unwrap().serial, "SN-MATCH");
        assert!(start.elapsed() < Duration::from_secs(1));

        mux.stop();
    }

    #[tokio::test]
    async fn discover_with_info_drops_devices_with_unresolved_mac() {
        let mux = Arc::new(
            UdpMultiplexer::bind(&MultiplexerConfig {
                listen_port: 0,
                ..Default::default()
            })
            .unwrap(),
        );
        let _task = mux.start();
        let mux_addr = mux.local_addr().unwrap();

        let config = DiscoveryConfig {
            discovery_timeout: Duration::from_millis(150),
            verify_timeout: Duration::from_millis(80),
            broadcast_count: 1,
            broadcast_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let service = Arc::new(DiscoveryService::new(mux.clone(), config, 65502));

        // One device replies to the broadcast sweep without a MAC and
        // never answers the follow-up `verify` probe either.
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        tokio::spawn(async move {
            let reply = br#"${"serial_number":"SN-NOMAC","ip_address":"127.0.0.1","state_counter":1}"#;
            let _ = peer.send_to(reply, mux_addr).await;
        });

        let devices = service.discover_with_info().await;
        assert!(devices.iter().all(|d| d.mac.is_some()));
        assert!(devices.iter().all(|d| d.serial != "SN-NOMAC"));

        mux.stop();
    }
}
