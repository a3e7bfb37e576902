//! Tunable configuration for each major component.
//!
//! Defaults mirror the original implementation's module-level constants
//! so embedding applications get identical behavior out of the box.

use std::time::Duration;

/// Snapshot fetches (`/getState`) and discovery probes (`/discovery`)
/// are addressed here, per §6's port table. Passed explicitly to
/// `DiscoveryService`/`DeviceController`/`Poller` constructors (rather
/// than defaulted inside them) since it's shared across components, not
/// particular to any one of them.
pub const DEFAULT_COMMAND_PORT: u16 = 9090;

/// Configuration for `UdpMultiplexer`.
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// UDP port the multiplexer binds and listens on.
    pub listen_port: u16,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        MultiplexerConfig { listen_port: 6454 }
    }
}

/// Configuration for `DiscoveryService`.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How long `discover` waits for replies after its last broadcast.
    pub discovery_timeout: Duration,
    /// How long `verify`/`find_by_serial` wait for a direct reply.
    pub verify_timeout: Duration,
    /// Number of broadcasts `discover` sends.
    pub broadcast_count: u32,
    /// Delay between successive broadcasts within one `discover` call.
    pub broadcast_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            discovery_timeout: Duration::from_secs_f64(5.0),
            verify_timeout: Duration::from_secs_f64(3.0),
            broadcast_count: 3,
            broadcast_interval: Duration::from_millis(200),
        }
    }
}

/// Control mutations (power, brightness, mode, palette, scene/animation
/// selection) go to a distinct port from snapshot fetches and discovery
/// probes, per §6's port table.
pub const DEFAULT_CONTROL_PORT: u16 = 6767;

/// Configuration for `DeviceController`.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long `get_state` waits for a fresh snapshot before failing.
    pub state_timeout: Duration,
    /// Minimum interval between broadcast-based IP resolution attempts
    /// for the same device, to avoid flooding the network when a device
    /// stays offline.
    pub ip_resolve_cooldown: Duration,
    /// Deadline for the controller's own per-device fragment reassembler,
    /// which runs on its own `PacketReassembler` behind a source filter
    /// rather than on the shared multiplexer.
    pub reassembly_timeout: Duration,
    /// The control port control mutations are addressed to. Distinct
    /// from the command port (passed separately to every constructor)
    /// that snapshot fetches and discovery probes use.
    pub control_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            state_timeout: Duration::from_secs_f64(10.0),
            ip_resolve_cooldown: Duration::from_secs_f64(300.0),
            reassembly_timeout: Duration::from_secs(5),
            control_port: DEFAULT_CONTROL_PORT,
        }
    }
}

/// Configuration for `Poller`.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Consecutive failed polls before a resolution attempt is triggered.
    pub max_failed_polls: u32,
    /// Base backoff between poll attempts once failures start.
    pub base_backoff: Duration,
    /// Backoff ceiling; doubles on each further failure up to this cap.
    pub max_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            max_failed_polls: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs_f64(60.0),
        }
    }
}
