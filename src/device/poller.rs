//! Resilient polling loop around a `DeviceController`.
//!
//! Each poll sends a lightweight unicast `/discovery` probe (not a full
//! `get_state` round-trip) and inspects the replied `state_counter`:
//! only when it has advanced since the last observation does the
//! poller fetch a full snapshot. This keeps steady-state polling cheap
//! — most ticks are a single small datagram exchange — while still
//! catching every state change promptly.
//!
//! Tracks consecutive poll failures and backs off exponentially,
//! triggering an IP re-resolution once the failure count crosses a
//! threshold, and resetting both the failure count and the backoff
//! interval together once a poll (or resolution) succeeds again.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::{ControllerConfig, PollerConfig};
use crate::decoder::StateDecoder;
use crate::discovery::DiscoveryService;
use crate::error::{Error, Result};
use crate::net::UdpMultiplexer;
use crate::types::{DeviceIdentity, DeviceSnapshot, MacAddress};

use super::controller::DeviceController;

/// Polls one device, rebuilding its `DeviceController` on demand when
/// only a MAC address is known up front (no serial to pivot on yet).
pub struct Poller {
    mac: MacAddress,
    serial: Mutex<Option<String>>,
    controller: Mutex<Option<Arc<DeviceController>>>,
    mux: Arc<UdpMultiplexer>,
    discovery: Arc<DiscoveryService>,
    decoder: Arc<dyn StateDecoder>,
    controller_config: ControllerConfig,
    config: PollerConfig,
    port: u16,

    consecutive_failures: AtomicU32,
    backoff: Mutex<Duration>,
    last_state_counter: Mutex<Option<u32>>,
}

impl Poller {
    pub fn new(
        mac: MacAddress,
        serial: Option<String>,
        mux: Arc<UdpMultiplexer>,
        discovery: Arc<DiscoveryService>,
        decoder: Arc<dyn StateDecoder>,
        controller_config: ControllerConfig,
        config: PollerConfig,
        port: u16,
    ) -> Self {
        let base_backoff = config.base_backoff;
        Poller {
            mac,
            serial: Mutex::new(serial),
            controller: Mutex::new(None),
            mux,
            discovery,
            decoder,
            controller_config,
            config,
            port,
            consecutive_failures: AtomicU32::new(0),
            backoff: Mutex::new(base_backoff),
            last_state_counter: Mutex::new(None),
        }
    }

    /// Cheap liveness check: no failures observed since the last
    /// successful poll or resolution, and an IP is known.
    pub async fn is_connected(&self) -> bool {
        if self.consecutive_failures.load(Ordering::Relaxed) != 0 {
            return false;
        }
        match &*self.controller.lock().await {
            Some(controller) => controller.current_ip().await.is_some(),
            None => false,
        }
    }

    /// How long a caller running a polling loop should sleep before the
    /// next `poll()` call.
    pub async fn current_backoff(&self) -> Duration {
        *self.backoff.lock().await
    }

    fn reset_failure_state(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    async fn reset_backoff(&self) {
        *self.backoff.lock().await = self.config.base_backoff;
    }

    async fn bump_backoff(&self) {
        let mut backoff = self.backoff.lock().await;
        *backoff = std::cmp::min(*backoff * 2, self.config.max_backoff);
    }

    /// The MAC-pivot fallback: sweep discovery for every device and
    /// learn the MAC of any that didn't advertise one, then match on
    /// the normalized MAC. Only used when no serial number is known
    /// yet to resolve by directly.
    async fn resolve_without_serial(&self) -> Result<(String, Ipv4Addr)> {
        self.discovery
            .discover_with_info()
            .await
            .into_iter()
            .find(|d| d.mac == Some(self.mac))
            .map(|d| (d.serial, d.ip))
            .ok_or(Error::Timeout)
    }

    async fn ensure_controller(&self) -> Result<Arc<DeviceController>> {
        let mut slot = self.controller.lock().await;
        if let Some(controller) = slot.as_ref() {
            return Ok(controller.clone());
        }

        let serial = self.serial.lock().await.clone();
        let controller = match serial {
            Some(serial) => {
                let identity = DeviceIdentity::new(self.mac, serial);
                DeviceController::from_identifiers(
                    identity,
                    self.mux.clone(),
                    self.discovery.clone(),
                    self.decoder.clone(),
                    self.controller_config.clone(),
                    self.port,
                )
                .await?
            }
            None => {
                let (serial, ip) = self.resolve_without_serial().await?;
                *self.serial.lock().await = Some(serial.clone());
                let identity = DeviceIdentity::new(self.mac, serial);
                let controller = DeviceController::from_discovered(
                    crate::types::DiscoveredDevice {
                        serial: identity.serial.clone(),
                        ip,
                        state_counter: 0,
                        mac: Some(self.mac),
                    },
                    self.mux.clone(),
                    self.discovery.clone(),
                    self.decoder.clone(),
                    self.controller_config.clone(),
                    self.port,
                )
                .await?;
                controller
            }
        };

        let controller = Arc::new(controller);
        *slot = Some(controller.clone());
        Ok(controller)
    }

    /// Re-resolve this device's IP. By the time this runs, `poll` has
    /// always already gone through `ensure_controller` at least once,
    /// which resolves a serial before a `DeviceController` exists — so
    /// the controller's own two-stage `refresh_ip` (ARP, then a
    /// cooldown-gated broadcast `find_by_serial`) always has a serial
    /// to pivot on here. The MAC-only `resolve_without_serial` sweep is
    /// only ever needed to *build* the controller in the first place.
    async fn re_resolve(&self) -> Result<()> {
        let controller = self.ensure_controller().await?;
        controller.refresh_ip().await?;
        Ok(())
    }

    /// Poll once: send a direct discovery probe and, only if its
    /// `state_counter` advanced since the last observation, fetch a
    /// full snapshot. Returns `Ok(None)` when the probe replied but the
    /// counter hadn't moved (nothing to fetch) and `Ok(Some(..))` when a
    /// fresh snapshot was retrieved.
    ///
    /// On success (the probe replied, whether or not a fetch followed),
    /// resets both the failure counter and the backoff interval. On
    /// failure (no reply, or the snapshot fetch itself timed out),
    /// increments the failure counter and — once it crosses
    /// `max_failed_polls` — attempts to re-resolve the device's IP; a
    /// successful re-resolution also resets both counters, matching the
    /// original poller's behavior.
    pub async fn poll(&self) -> Result<Option<DeviceSnapshot>> {
        let controller = match self.ensure_controller().await {
            Ok(c) => c,
            Err(err) => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                self.bump_backoff().await;
                return Err(err);
            }
        };

        let ip = match controller.current_ip().await {
            Some(ip) => ip,
            None => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                self.bump_backoff().await;
                return Err(Error::NotRegistered);
            }
        };

        let probe = self.discovery.verify(ip).await;
        match probe {
            Some(reply) => {
                self.reset_failure_state();
                self.reset_backoff().await;

                let mut last = self.last_state_counter.lock().await;
                let advanced = *last != Some(reply.state_counter);
                *last = Some(reply.state_counter);
                drop(last);

                if advanced {
                    log::info!(
                        "state counter advanced for {} (-> {}), fetching snapshot",
                        self.mac,
                        reply.state_counter
                    );
                    controller.get_state().await.map(Some)
                } else {
                    Ok(None)
                }
            }
            None => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.max_failed_polls && self.re_resolve().await.is_ok() {
                    self.reset_failure_state();
                    self.reset_backoff().await;
                    return Err(Error::Timeout);
                }
                self.bump_backoff().await;
                Err(Error::Timeout)
            }
        }
    }
}
