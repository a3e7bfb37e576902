//! Shared data model types (spec's DATA MODEL section).

mod effect;
mod identity;
mod mac;
mod routes;
mod snapshot;

pub use effect::{AnimationInfo, DeviceMode, EffectId, EffectInfo, SceneInfo};
pub use identity::{DeviceIdentity, DiscoveredDevice};
pub use mac::MacAddress;
pub use routes::ControlRoutes;
pub use snapshot::{DeviceSnapshot, Palette};
