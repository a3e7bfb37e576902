//! Per-device controller: resolves a device's address, keeps its state
//! snapshot current, and sends control commands to it.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::ControllerConfig;
use crate::decoder::StateDecoder;
use crate::discovery::DiscoveryService;
use crate::error::{Error, Result, RouteKind};
use crate::net::{Claim, HandlerId, PacketHandler, UdpMultiplexer};
use crate::reassembly::PacketReassembler;
use crate::types::{ControlRoutes, DeviceIdentity, DeviceMode, DeviceSnapshot, DiscoveredDevice, EffectId, MacAddress};
use crate::wire::command::{encode_command, CommandArg};

/// Opaque handle returned by `subscribe`, used to `unsubscribe` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn Fn(&DeviceSnapshot) + Send + Sync>;

struct Registration {
    handler_id: HandlerId,
    sweeper: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

/// Claims datagrams arriving from one specific source address,
/// delegating anything else as unclaimed. Lets a shared multiplexer
/// host many per-device reassemblers without them stealing each
/// other's traffic.
struct SourceFilter {
    ip: Ipv4Addr,
    inner: Arc<PacketReassembler>,
}

impl PacketHandler for SourceFilter {
    fn handle(&self, datagram: &[u8], from: SocketAddr) -> Claim {
        let matches = match from {
            SocketAddr::V4(v4) => *v4.ip() == self.ip,
            SocketAddr::V6(_) => false,
        };
        if matches {
            self.inner.handle(datagram, from)
        } else {
            Claim::NotClaimed
        }
    }
}

/// Controls one PixelAir device: tracks its current IP, its latest
/// state snapshot, and sends it control commands.
pub struct DeviceController {
    identity: DeviceIdentity,
    mux: Arc<UdpMultiplexer>,
    discovery: Arc<DiscoveryService>,
    decoder: Arc<dyn StateDecoder>,
    config: ControllerConfig,
    /// The command port: `get_state` fetches go here. Control mutations
    /// go to `config.control_port` instead (see `send_control`).
    port: u16,

    ip: RwLock<Option<Ipv4Addr>>,
    state: Arc<RwLock<Option<DeviceSnapshot>>>,
    registration: Mutex<Option<Registration>>,
    waiters: Arc<StdMutex<HashMap<u64, oneshot::Sender<DeviceSnapshot>>>>,
    next_waiter_id: AtomicU64,
    subscribers: Arc<RwLock<Vec<(SubscriptionId, Callback)>>>,
    next_subscription_id: AtomicU64,
    last_broadcast_resolve: Mutex<Option<Instant>>,
}

/// Removes its waiter from the shared map on drop, so a cancelled
/// `get_state` (the caller's future dropped before completion, not just
/// a clean timeout) never leaves a stale sender behind.
struct WaiterGuard {
    waiters: Arc<StdMutex<HashMap<u64, oneshot::Sender<DeviceSnapshot>>>>,
    id: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.waiters.lock().unwrap().remove(&self.id);
    }
}

impl DeviceController {
    fn new_unregistered(
        identity: DeviceIdentity,
        mux: Arc<UdpMultiplexer>,
        discovery: Arc<DiscoveryService>,
        decoder: Arc<dyn StateDecoder>,
        config: ControllerConfig,
        port: u16,
    ) -> Self {
        DeviceController {
            identity,
            mux,
            discovery,
            decoder,
            config,
            port,
            ip: RwLock::new(None),
            state: Arc::new(RwLock::new(None)),
            registration: Mutex::new(None),
            waiters: Arc::new(StdMutex::new(HashMap::new())),
            next_waiter_id: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscription_id: AtomicU64::new(0),
            last_broadcast_resolve: Mutex::new(None),
        }
    }

    /// Build a controller from an already-discovered device. Requires a
    /// MAC address to have been present in the discovery reply — a
    /// device identity with no MAC can never be re-resolved after an IP
    /// change, so construction fails hard rather than producing a
    /// controller that silently can't recover.
    pub async fn from_discovered(
        discovered: DiscoveredDevice,
        mux: Arc<UdpMultiplexer>,
        discovery: Arc<DiscoveryService>,
        decoder: Arc<dyn StateDecoder>,
        config: ControllerConfig,
        port: u16,
    ) -> Result<Self> {
        let mac = discovered
            .mac
            .ok_or_else(|| Error::InvalidMac(format!("discovered device {} has no MAC", discovered.serial)))?;
        let identity = DeviceIdentity::new(mac, discovered.serial);
        let controller = Self::new_unregistered(identity, mux, discovery, decoder, config, port);
        controller.bind_ip(discovered.ip).await;
        Ok(controller)
    }

    /// Build a controller from a known (MAC, serial) pair, resolving
    /// its current IP via ARP first and a broadcast `find_by_serial`
    /// sweep if that fails.
    pub async fn from_identifiers(
        identity: DeviceIdentity,
        mux: Arc<UdpMultiplexer>,
        discovery: Arc<DiscoveryService>,
        decoder: Arc<dyn StateDecoder>,
        config: ControllerConfig,
        port: u16,
    ) -> Result<Self> {
        let controller = Self::new_unregistered(identity, mux, discovery, decoder, config, port);
        let ip = controller.resolve_ip().await?;
        controller.bind_ip(ip).await;
        Ok(controller)
    }

    /// Build a controller knowing only a MAC address. Tries ARP, then
    /// sends a single broadcast discovery sweep to warm the kernel's
    /// neighbor table and retries ARP, then verifies the candidate
    /// directly to learn its serial number.
    pub async fn from_mac_address(
        mac: MacAddress,
        mux: Arc<UdpMultiplexer>,
        discovery: Arc<DiscoveryService>,
        decoder: Arc<dyn StateDecoder>,
        config: ControllerConfig,
        port: u16,
    ) -> Result<Self> {
        let ip = match crate::net::arp::resolve(mac).await {
            Some(ip) => ip,
            None => {
                let _ = discovery.discover().await;
                crate::net::arp::resolve(mac).await.ok_or(Error::Timeout)?
            }
        };
        let verified = discovery.verify(ip).await.ok_or(Error::Timeout)?;
        let identity = DeviceIdentity::new(mac, verified.serial);
        let controller = Self::new_unregistered(identity, mux, discovery, decoder, config, port);
        controller.bind_ip(ip).await;
        Ok(controller)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub async fn current_ip(&self) -> Option<Ipv4Addr> {
        *self.ip.read().await
    }

    pub async fn state(&self) -> Option<DeviceSnapshot> {
        self.state.read().await.clone()
    }

    pub async fn has_control_routes(&self) -> bool {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.routes.has_core_routes())
            .unwrap_or(false)
    }

    pub async fn current_effect_id(&self) -> Option<EffectId> {
        self.state.read().await.as_ref().map(|s| s.current_effect_id())
    }

    pub async fn current_effect(&self) -> Option<String> {
        self.state.read().await.as_ref().map(|s| s.current_effect())
    }

    /// Register (or re-register, if the IP changed) this controller's
    /// reassembler/handler pair with the multiplexer. The previous
    /// registration, if any, is torn down first so stale-IP traffic is
    /// never dispatched to it again — this is the "IP adoption drops
    /// the old handler" invariant.
    async fn bind_ip(&self, ip: Ipv4Addr) {
        let (reassembler, mut receiver) = PacketReassembler::new(self.config.reassembly_timeout);
        let sweeper = reassembler.spawn_sweeper();

        let filter = Arc::new(SourceFilter {
            ip,
            inner: reassembler,
        });
        let handler_id = self.mux.add_handler(filter).await;

        let decoder = self.decoder.clone();
        let state = self.state.clone();
        let waiters = self.waiters.clone();
        let subscribers = self.subscribers.clone();
        let expected_serial = self.identity.serial.clone();
        let consumer = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                match decoder.decode(&payload.bytes) {
                    Ok(snapshot) if snapshot.serial == expected_serial => {
                        deliver_snapshot(&state, &waiters, &subscribers, snapshot).await
                    }
                    Ok(snapshot) => log::warn!(
                        "dropping snapshot with mismatched serial: expected {expected_serial}, got {}",
                        snapshot.serial
                    ),
                    Err(err) => log::debug!("dropping undecodable state payload: {err}"),
                }
            }
        });

        let mut slot = self.registration.lock().await;
        if let Some(old) = slot.take() {
            self.mux.remove_handler(old.handler_id).await;
            old.sweeper.abort();
            old.consumer.abort();
        }
        *slot = Some(Registration {
            handler_id,
            sweeper,
            consumer,
        });
        drop(slot);

        *self.ip.write().await = Some(ip);
    }

    /// Register (bind to) a specific IP. Constructors call `bind_ip`
    /// directly since there's nothing to conflict with yet; this public
    /// entry point is for re-registering a controller that was
    /// explicitly `unregister`-ed, and refuses to silently clobber an
    /// existing registration.
    pub async fn register(&self, ip: Ipv4Addr) -> Result<()> {
        if self.ip.read().await.is_some() {
            return Err(Error::AlreadyRegistered);
        }
        self.bind_ip(ip).await;
        Ok(())
    }

    /// Tear down this controller's handler registration. Idempotent
    /// guard: returns `NotRegistered` if no registration is active.
    pub async fn unregister(&self) -> Result<()> {
        let mut slot = self.registration.lock().await;
        match slot.take() {
            Some(old) => {
                self.mux.remove_handler(old.handler_id).await;
                old.sweeper.abort();
                old.consumer.abort();
                *self.ip.write().await = None;
                Ok(())
            }
            None => Err(Error::NotRegistered),
        }
    }

    /// Two-stage IP resolution: an ARP neighbor-table lookup, confirmed
    /// with a direct `verify` probe (no cooldown, since it's a pure
    /// local read plus one unicast round-trip), followed by a broadcast
    /// `find_by_serial` sweep, gated by `ip_resolve_cooldown` so a
    /// persistently offline device doesn't get broadcast-probed on
    /// every call. The ARP table can point at a stale lease — if the
    /// device now answering at that address has a different serial, it
    /// isn't ours, and resolution falls through to the broadcast stage.
    pub async fn resolve_ip(&self) -> Result<Ipv4Addr> {
        if let Some(ip) = crate::net::arp::resolve(self.identity.mac).await {
            if let Some(reply) = self.discovery.verify(ip).await {
                if reply.serial == self.identity.serial {
                    return Ok(ip);
                }
                log::debug!(
                    "stale ARP entry for {}: device at {ip} replied with serial {:?}, expected {:?}",
                    self.identity.mac,
                    reply.serial,
                    self.identity.serial,
                );
            }
        }

        let mut last = self.last_broadcast_resolve.lock().await;
        let now = Instant::now();
        let cooled_down = last.map(|t| now.duration_since(t) >= self.config.ip_resolve_cooldown).unwrap_or(true);
        if !cooled_down {
            return Err(Error::Timeout);
        }
        *last = Some(now);
        drop(last);

        self.discovery
            .find_by_serial(&self.identity.serial)
            .await
            .map(|d| d.ip)
            .ok_or(Error::Timeout)
    }

    /// Re-resolve and re-bind to this device's current IP.
    pub async fn refresh_ip(&self) -> Result<Ipv4Addr> {
        let ip = self.resolve_ip().await?;
        self.bind_ip(ip).await;
        Ok(ip)
    }

    /// Send a command-port datagram (snapshot fetch, discovery probe).
    async fn send_command(&self, path: &str, args: &[CommandArg]) -> Result<()> {
        let ip = self.current_ip().await.ok_or(Error::NotRegistered)?;
        let bytes = encode_command(path, args);
        self.mux.send_to(&bytes, SocketAddr::new(ip.into(), self.port)).await
    }

    /// Send a control mutation to the control port (distinct from the
    /// command port `send_command` uses). Every control-port command
    /// carries the value plus a trailing zero-int pad argument, matching
    /// the firmware's protocol convention (present even for float and
    /// bool arguments, not just the documented boolean case).
    async fn send_control(&self, path: &str, arg: CommandArg) -> Result<()> {
        let ip = self.current_ip().await.ok_or(Error::NotRegistered)?;
        let bytes = encode_command(path, &[arg, CommandArg::Int(0)]);
        self.mux
            .send_to(&bytes, SocketAddr::new(ip.into(), self.config.control_port))
            .await
    }

    fn require_unit_range(value: f32) -> Result<()> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(Error::InvalidRange(value))
        }
    }

    /// Mutate the in-memory snapshot optimistically after a successful
    /// command send. A no-op if no snapshot has ever been observed yet
    /// — which can't happen for a route-gated mutator, since a route is
    /// only ever populated by a snapshot in the first place.
    async fn update_state_optimistically(&self, f: impl FnOnce(&mut DeviceSnapshot)) {
        if let Some(snapshot) = self.state.write().await.as_mut() {
            f(snapshot);
        }
    }

    pub async fn turn_on(&self) -> Result<()> {
        let route = self.require_route(RouteKind::Power).await?;
        self.send_control(&route, CommandArg::Bool(true)).await?;
        self.update_state_optimistically(|s| s.power = true).await;
        Ok(())
    }

    pub async fn turn_off(&self) -> Result<()> {
        let route = self.require_route(RouteKind::Power).await?;
        self.send_control(&route, CommandArg::Bool(false)).await?;
        self.update_state_optimistically(|s| s.power = false).await;
        Ok(())
    }

    /// Set brightness, rounded to 2 decimal places to match the
    /// firmware's resolution (and the round-trip law that reading back
    /// yields the same rounded value).
    pub async fn set_brightness(&self, value: f32) -> Result<()> {
        Self::require_unit_range(value)?;
        let route = self.require_route(RouteKind::Brightness).await?;
        let rounded = (value * 100.0).round() / 100.0;
        self.send_control(&route, CommandArg::Float(rounded)).await?;
        self.update_state_optimistically(|s| s.brightness = rounded).await;
        Ok(())
    }

    /// Set the hue of whichever mode is currently active. Each mode
    /// (AUTO/SCENE/MANUAL) carries its own independent palette and
    /// route, so the applicable route and the palette slot updated
    /// optimistically both follow the snapshot's current `mode`.
    pub async fn set_hue(&self, value: f32) -> Result<()> {
        Self::require_unit_range(value)?;
        let mode = self.current_mode().await?;
        let route = self.require_route(RouteKind::hue_for_mode(mode)).await?;
        self.send_control(&route, CommandArg::Float(value)).await?;
        self.update_state_optimistically(|s| s.set_hue(mode, value)).await;
        Ok(())
    }

    /// Set the saturation of whichever mode is currently active; see `set_hue`.
    pub async fn set_saturation(&self, value: f32) -> Result<()> {
        Self::require_unit_range(value)?;
        let mode = self.current_mode().await?;
        let route = self.require_route(RouteKind::saturation_for_mode(mode)).await?;
        self.send_control(&route, CommandArg::Float(value)).await?;
        self.update_state_optimistically(|s| s.set_saturation(mode, value)).await;
        Ok(())
    }

    pub async fn set_mode(&self, mode: DeviceMode) -> Result<()> {
        let route = self.require_route(RouteKind::Mode).await?;
        self.send_control(&route, CommandArg::Int(mode.as_route_value())).await?;
        self.update_state_optimistically(|s| s.mode = mode).await;
        Ok(())
    }

    async fn current_mode(&self) -> Result<DeviceMode> {
        self.state.read().await.as_ref().map(|s| s.mode).ok_or(Error::NotRegistered)
    }

    /// Apply an effect id. The mode-switch command is only sent when
    /// the device isn't already in the target mode (an unknown current
    /// mode is treated as "needs switching"); the selection command is
    /// always sent.
    pub async fn set_effect(&self, id: EffectId) -> Result<()> {
        let target_mode = id.mode();
        let needs_mode_switch = self.state.read().await.as_ref().map(|s| s.mode) != Some(target_mode);
        if needs_mode_switch {
            self.set_mode(target_mode).await?;
        }
        match id {
            EffectId::Auto => Ok(()),
            EffectId::Scene(index) => {
                let route = self.require_route(RouteKind::ActiveSceneIndex).await?;
                self.send_control(&route, CommandArg::Int(index as i32)).await?;
                self.update_state_optimistically(|s| s.active_scene_index = Some(index)).await;
                Ok(())
            }
            EffectId::Manual(index) => {
                let route = self.require_route(RouteKind::ActiveAnimationIndex).await?;
                self.send_control(&route, CommandArg::Int(index as i32)).await?;
                self.update_state_optimistically(|s| s.active_animation_index = Some(index)).await;
                Ok(())
            }
        }
    }

    /// Resolve a human-readable effect name (as shown by
    /// `DeviceSnapshot::effect_list`) back to its id and apply it.
    pub async fn set_effect_by_name(&self, name: &str) -> Result<()> {
        let id = {
            let state = self.state.read().await;
            state
                .as_ref()
                .and_then(|s| s.effect_id_for_name(name))
                .ok_or_else(|| Error::UnknownEffect(name.to_string()))?
        };
        self.set_effect(id).await
    }

    /// Look up the opaque, firmware-specific route string for `kind` in
    /// the latest snapshot. Routes are never guessed or persisted: if
    /// no snapshot has been observed yet, or the observed snapshot never
    /// reported this property, the mutation fails with
    /// `RoutesUnavailable` rather than falling back to a hardcoded path.
    async fn require_route(&self, kind: RouteKind) -> Result<String> {
        let routes = self.state.read().await.as_ref().map(|s| s.routes.clone()).unwrap_or_else(ControlRoutes::default);
        routes.require(kind).map(|s| s.to_string())
    }

    /// Request a fresh snapshot and wait for it, up to `state_timeout`.
    /// The wait-signal is removed from the shared set on every exit path
    /// — success, timeout, or the caller dropping this future early —
    /// via `WaiterGuard`'s `Drop` impl, so a cancelled wait never leaves
    /// a stale sender behind.
    pub async fn get_state(&self) -> Result<DeviceSnapshot> {
        let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().insert(id, tx);
        let _guard = WaiterGuard {
            waiters: self.waiters.clone(),
            id,
        };

        self.send_command("/getState", &[]).await?;

        match tokio::time::timeout(self.config.state_timeout, rx).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) | Err(_) => Err(Error::Timeout),
        }
    }

    pub async fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().await.push((id, Box::new(callback)));
        id
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().await.retain(|(existing, _)| *existing != id);
    }
}

async fn deliver_snapshot(
    state: &RwLock<Option<DeviceSnapshot>>,
    waiters: &StdMutex<HashMap<u64, oneshot::Sender<DeviceSnapshot>>>,
    subscribers: &RwLock<Vec<(SubscriptionId, Callback)>>,
    snapshot: DeviceSnapshot,
) {
    *state.write().await = Some(snapshot.clone());

    let pending: Vec<_> = waiters.lock().unwrap().drain().collect();
    for (_, sender) in pending {
        let _ = sender.send(snapshot.clone());
    }

    let subs = subscribers.read().await;
    for (_, callback) in subs.iter() {
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(&snapshot))) {
            log::warn!("subscriber callback panicked: {panic:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, MultiplexerConfig};
    use crate::decoder::DecodeError;
    use crate::wire::fragment::Repr as FragmentRepr;
    use std::sync::Mutex as StdSyncMutex;
    use std::time::Duration;

    /// A decoder that always returns a fixed snapshot, substituting the
    /// observed peer IP, for use from a fake device's receive loop.
    struct FixedDecoder {
        template: DeviceSnapshot,
    }

    impl StateDecoder for FixedDecoder {
        fn decode(&self, _payload: &[u8]) -> std::result::Result<DeviceSnapshot, DecodeError> {
            Ok(self.template.clone())
        }
    }

    fn full_routes() -> ControlRoutes {
        ControlRoutes {
            power: Some("/power".to_string()),
            brightness: Some("/brightness".to_string()),
            mode: Some("/mode".to_string()),
            active_scene_index: Some("/activeSceneIndex".to_string()),
            active_animation_index: Some("/activeAnimationIndex".to_string()),
            auto_hue: Some("/autoHue".to_string()),
            auto_saturation: Some("/autoSaturation".to_string()),
            scene_hue: Some("/sceneHue".to_string()),
            scene_saturation: Some("/sceneSaturation".to_string()),
            manual_hue: Some("/manualHue".to_string()),
            manual_saturation: Some("/manualSaturation".to_string()),
        }
    }

    fn snapshot_for(serial: &str, ip: Ipv4Addr) -> DeviceSnapshot {
        DeviceSnapshot {
            serial: serial.to_string(),
            model: "fluora".into(),
            firmware_version: "1.0".into(),
            nickname: "Test".into(),
            rssi: Some(-40),
            power: false,
            brightness: 0.1,
            auto_palette: crate::types::Palette::default(),
            scene_palette: crate::types::Palette::default(),
            manual_palette: crate::types::Palette::default(),
            mode: DeviceMode::Scene,
            scenes: Vec::new(),
            animations: Vec::new(),
            active_scene_index: Some(0),
            active_animation_index: None,
            mac: Some(MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap()),
            ip,
            routes: full_routes(),
        }
    }

    async fn new_mux() -> Arc<UdpMultiplexer> {
        let mux = Arc::new(
            UdpMultiplexer::bind(&MultiplexerConfig {
                listen_port: 0,
                ..Default::default()
            })
            .unwrap(),
        );
        mux.start();
        mux
    }

    fn quick_controller_config() -> ControllerConfig {
        ControllerConfig {
            state_timeout: Duration::from_millis(100),
            ip_resolve_cooldown: Duration::from_secs(300),
            reassembly_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    async fn controller_without_state(mux: Arc<UdpMultiplexer>, port: u16) -> DeviceController {
        let discovery = Arc::new(DiscoveryService::new(mux.clone(), DiscoveryConfig::default(), port));
        let decoder = Arc::new(FixedDecoder {
            template: snapshot_for("SN1", "127.0.0.1".parse().unwrap()),
        });
        let identity = DeviceIdentity::new(MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap(), "SN1".to_string());
        let controller = DeviceController::new_unregistered(identity, mux, discovery, decoder, quick_controller_config(), port);
        controller.bind_ip("127.0.0.1".parse().unwrap()).await;
        controller
    }

    #[tokio::test]
    async fn mutators_fail_before_any_snapshot_observed() {
        let mux = new_mux().await;
        let controller = controller_without_state(mux.clone(), 65400).await;

        assert!(matches!(controller.turn_on().await, Err(Error::RoutesUnavailable(RouteKind::Power))));
        mux.stop();
    }

    #[tokio::test]
    async fn out_of_range_values_are_rejected_before_any_send() {
        let mux = new_mux().await;
        let controller = controller_without_state(mux.clone(), 65401).await;

        assert!(matches!(controller.set_brightness(1.5).await, Err(Error::InvalidRange(_))));
        assert!(matches!(controller.set_hue(-0.1).await, Err(Error::InvalidRange(_))));
        mux.stop();
    }

    #[tokio::test]
    async fn brightness_rounds_to_two_decimals_optimistically() {
        let mux = new_mux().await;
        let controller = controller_without_state(mux.clone(), 65402).await;
        *controller.state.write().await = Some(snapshot_for("SN1", "127.0.0.1".parse().unwrap()));

        controller.set_brightness(0.333).await.unwrap();
        assert_eq!(controller.state().await.unwrap().brightness, 0.33);
        mux.stop();
    }

    #[tokio::test]
    async fn mismatched_serial_snapshot_is_dropped() {
        let mux = new_mux().await;
        let port = mux.local_addr().unwrap().port();
        let discovery = Arc::new(DiscoveryService::new(mux.clone(), DiscoveryConfig::default(), port));
        let decoder = Arc::new(FixedDecoder {
            template: snapshot_for("WRONG_SERIAL", "127.0.0.1".parse().unwrap()),
        });
        let identity = DeviceIdentity::new(MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap(), "SN1".to_string());
        let controller = DeviceController::new_unregistered(identity, mux.clone(), discovery, decoder, quick_controller_config(), port);
        controller.bind_ip("127.0.0.1".parse().unwrap()).await;

        // A single fragment is enough to trigger a decode with the
        // wrong serial baked into the fixed decoder's template.
        let fragment = FragmentRepr {
            total_fragments: 1,
            fragment_index: 0,
            group_id: 0,
            payload: b"whatever".to_vec(),
        }
        .to_bytes();
        mux.send_to(&fragment, controller.current_ip().await.map(|ip| SocketAddr::new(ip.into(), port)).unwrap())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(controller.state().await.is_none());
        mux.stop();
    }

    #[tokio::test]
    async fn set_effect_skips_mode_switch_when_already_in_target_mode() {
        let mux = new_mux().await;
        let controller = controller_without_state(mux.clone(), 65403).await;
        let mut snapshot = snapshot_for("SN1", "127.0.0.1".parse().unwrap());
        snapshot.mode = DeviceMode::Scene;
        *controller.state.write().await = Some(snapshot);

        // Capture outbound datagrams on a loopback peer standing in for
        // the device at the control port.
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Re-point the controller's control port to the fake peer so we
        // can observe exactly what gets sent.
        let port = peer.local_addr().unwrap().port();
        let config = ControllerConfig {
            control_port: port,
            ..controller.config.clone()
        };
        let controller = DeviceController { config, ..controller };

        let seen = Arc::new(StdSyncMutex::new(Vec::new()));
        let seen2 = seen.clone();
        let recorder = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                match tokio::time::timeout(Duration::from_millis(100), peer.recv_from(&mut buf)).await {
                    Ok(Ok((len, _))) => seen2.lock().unwrap().push(buf[..len].to_vec()),
                    _ => break,
                }
            }
        });

        controller.set_effect(EffectId::Scene(2)).await.unwrap();
        recorder.await.unwrap();

        // Already in Scene mode: only the active-scene-index command is sent.
        assert_eq!(seen.lock().unwrap().len(), 1);
        mux.stop();
    }
}
