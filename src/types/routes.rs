//! Control route availability.
//!
//! A "route" is the firmware-specific opaque path string a device has
//! advertised for one of its controllable properties in some prior
//! state snapshot (power, brightness, mode, ...). These are never
//! guessed or persisted across restarts: they come verbatim from the
//! most recent successful snapshot, supplied by the external
//! `StateDecoder`. Mutators on `DeviceController` refuse to fire until
//! the corresponding route has been observed at least once.

use super::effect::DeviceMode;
use crate::error::{Error, RouteKind};

/// The control routes observed on a device, one opaque string per
/// controllable property. `None` means this property's route has never
/// appeared in a snapshot yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlRoutes {
    pub power: Option<String>,
    pub brightness: Option<String>,
    pub mode: Option<String>,
    pub active_scene_index: Option<String>,
    pub active_animation_index: Option<String>,
    pub auto_hue: Option<String>,
    pub auto_saturation: Option<String>,
    pub scene_hue: Option<String>,
    pub scene_saturation: Option<String>,
    pub manual_hue: Option<String>,
    pub manual_saturation: Option<String>,
}

impl ControlRoutes {
    /// True once power, brightness, and mode have all been observed —
    /// the minimum needed to drive a device at all.
    pub fn has_core_routes(&self) -> bool {
        self.power.is_some() && self.brightness.is_some() && self.mode.is_some()
    }

    pub fn get(&self, kind: RouteKind) -> Option<&str> {
        match kind {
            RouteKind::Power => self.power.as_deref(),
            RouteKind::Brightness => self.brightness.as_deref(),
            RouteKind::Mode => self.mode.as_deref(),
            RouteKind::ActiveSceneIndex => self.active_scene_index.as_deref(),
            RouteKind::ActiveAnimationIndex => self.active_animation_index.as_deref(),
            RouteKind::AutoHue => self.auto_hue.as_deref(),
            RouteKind::AutoSaturation => self.auto_saturation.as_deref(),
            RouteKind::SceneHue => self.scene_hue.as_deref(),
            RouteKind::SceneSaturation => self.scene_saturation.as_deref(),
            RouteKind::ManualHue => self.manual_hue.as_deref(),
            RouteKind::ManualSaturation => self.manual_saturation.as_deref(),
        }
    }

    pub fn require(&self, kind: RouteKind) -> Result<&str, Error> {
        self.get(kind).ok_or(Error::RoutesUnavailable(kind))
    }
}

impl RouteKind {
    /// Which hue route applies while the device is in `mode`.
    pub fn hue_for_mode(mode: DeviceMode) -> Self {
        match mode {
            DeviceMode::Auto => RouteKind::AutoHue,
            DeviceMode::Scene => RouteKind::SceneHue,
            DeviceMode::Manual => RouteKind::ManualHue,
        }
    }

    /// Which saturation route applies while the device is in `mode`.
    pub fn saturation_for_mode(mode: DeviceMode) -> Self {
        match mode {
            DeviceMode::Auto => RouteKind::AutoSaturation,
            DeviceMode::Scene => RouteKind::SceneSaturation,
            DeviceMode::Manual => RouteKind::ManualSaturation,
        }
    }
}
