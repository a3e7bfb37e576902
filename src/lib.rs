//! Client engine for discovering and controlling PixelAir networked
//! lighting devices: a UDP multiplexer, a fragmented-datagram
//! reassembler, a discovery/IP-resolution state machine, and a
//! per-device controller and poller built on top of them.

pub mod config;
pub mod decoder;
pub mod device;
pub mod discovery;
pub mod error;
pub mod iface;
pub mod net;
pub mod reassembly;
pub mod types;
pub mod wire;

pub use config::{ControllerConfig, DiscoveryConfig, MultiplexerConfig, PollerConfig};
pub use decoder::{DecodeError, StateDecoder};
pub use device::{DeviceController, Poller, SubscriptionId};
pub use discovery::DiscoveryService;
pub use error::{Error, Result, RouteKind};
pub use net::{Claim, HandlerId, PacketHandler, UdpMultiplexer};
pub use types::{
    AnimationInfo, ControlRoutes, DeviceIdentity, DeviceMode, DeviceSnapshot, DiscoveredDevice, EffectId,
    EffectInfo, MacAddress, Palette, SceneInfo,
};
