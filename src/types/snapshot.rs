//! Device state snapshot and its derived effect views.

use std::net::Ipv4Addr;

use super::effect::{AnimationInfo, DeviceMode, EffectId, EffectInfo, SceneInfo};
use super::mac::MacAddress;
use super::routes::ControlRoutes;

/// A (hue, saturation) pair, both in `[0, 1]`. Each of the three modes
/// carries its own independent palette — switching from SCENE to
/// MANUAL does not disturb the saved scene's colors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Palette {
    pub hue: f32,
    pub saturation: f32,
}

/// A point-in-time picture of a device's reported state, decoded from a
/// fragmented state datagram by a `StateDecoder`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub serial: String,
    pub model: String,
    pub firmware_version: String,
    pub nickname: String,
    pub rssi: Option<i32>,

    pub power: bool,
    pub brightness: f32,
    pub auto_palette: Palette,
    pub scene_palette: Palette,
    pub manual_palette: Palette,
    pub mode: DeviceMode,

    pub scenes: Vec<SceneInfo>,
    pub animations: Vec<AnimationInfo>,
    pub active_scene_index: Option<u32>,
    pub active_animation_index: Option<u32>,

    pub mac: Option<MacAddress>,
    pub ip: Ipv4Addr,

    pub routes: ControlRoutes,
}

impl DeviceSnapshot {
    /// The palette (hue, saturation) belonging to `mode`.
    pub fn palette(&self, mode: DeviceMode) -> Palette {
        match mode {
            DeviceMode::Auto => self.auto_palette,
            DeviceMode::Scene => self.scene_palette,
            DeviceMode::Manual => self.manual_palette,
        }
    }

    /// The palette belonging to the currently active mode.
    pub fn current_palette(&self) -> Palette {
        self.palette(self.mode)
    }

    /// Overwrite the hue component of `mode`'s palette in place — used
    /// for the controller's optimistic update after a successful
    /// `set_hue`.
    pub fn set_hue(&mut self, mode: DeviceMode, value: f32) {
        match mode {
            DeviceMode::Auto => self.auto_palette.hue = value,
            DeviceMode::Scene => self.scene_palette.hue = value,
            DeviceMode::Manual => self.manual_palette.hue = value,
        }
    }

    /// Overwrite the saturation component of `mode`'s palette in place.
    pub fn set_saturation(&mut self, mode: DeviceMode, value: f32) {
        match mode {
            DeviceMode::Auto => self.auto_palette.saturation = value,
            DeviceMode::Scene => self.scene_palette.saturation = value,
            DeviceMode::Manual => self.manual_palette.saturation = value,
        }
    }

    /// The id of whatever effect is currently driving the device's
    /// output, derived from `mode` plus the matching active index.
    pub fn current_effect_id(&self) -> EffectId {
        match self.mode {
            DeviceMode::Auto => EffectId::Auto,
            DeviceMode::Scene => EffectId::Scene(self.active_scene_index.unwrap_or(0)),
            DeviceMode::Manual => EffectId::Manual(self.active_animation_index.unwrap_or(0)),
        }
    }

    /// A human-readable label for `current_effect_id`, e.g. `"Scene:
    /// Sunset"`, or the bare animation name with its category prefix
    /// stripped. Falls back to the id's machine form if no matching
    /// entry is found (the device reported an index we don't know the
    /// name for yet).
    pub fn current_effect(&self) -> String {
        match self.current_effect_id() {
            EffectId::Auto => "Auto".to_string(),
            EffectId::Scene(index) => self
                .scenes
                .iter()
                .find(|s| s.index == index)
                .map(|s| format!("Scene: {}", s.name))
                .unwrap_or_else(|| format!("Scene: {index}")),
            EffectId::Manual(index) => self
                .animations
                .iter()
                .find(|a| a.index == index)
                .map(|a| a.name.clone())
                .unwrap_or_else(|| format!("manual:{index}")),
        }
    }

    /// Every effect compatible with this device's reported model,
    /// flattened into the (mode, selection) id space: the auto
    /// placeholder, every scene, and every manual animation whose
    /// category is compatible with `model`.
    pub fn effects(&self) -> Vec<EffectInfo> {
        let mut out = Vec::with_capacity(1 + self.scenes.len() + self.animations.len());
        out.push(EffectInfo {
            id: EffectId::Auto,
            display_name: "Auto".to_string(),
        });
        for scene in &self.scenes {
            out.push(EffectInfo {
                id: EffectId::Scene(scene.index),
                display_name: format!("Scene: {}", scene.name),
            });
        }
        for animation in &self.animations {
            if animation.compatible_with_model(&self.model) {
                out.push(EffectInfo {
                    id: EffectId::Manual(animation.index),
                    display_name: animation.name.clone(),
                });
            }
        }
        out
    }

    /// Display names of `effects()`, in the same order — convenience
    /// for UIs that only need the label list.
    pub fn effect_list(&self) -> Vec<String> {
        self.effects().into_iter().map(|e| e.display_name).collect()
    }

    /// Resolve a display name (as returned by `effect_list`) back to an
    /// effect id, for `set_effect_by_name`.
    pub fn effect_id_for_name(&self, name: &str) -> Option<EffectId> {
        self.effects().into_iter().find(|e| e.display_name == name).map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_snapshot() -> DeviceSnapshot {
        DeviceSnapshot {
            serial: "SN123".into(),
            model: "fluora".into(),
            firmware_version: "1.2.3".into(),
            nickname: "Living Room".into(),
            rssi: Some(-42),
            power: true,
            brightness: 0.5,
            auto_palette: Palette::default(),
            scene_palette: Palette::default(),
            manual_palette: Palette::default(),
            mode: DeviceMode::Scene,
            scenes: vec![SceneInfo {
                index: 0,
                name: "Sunset".into(),
            }],
            animations: vec![
                AnimationInfo {
                    index: 0,
                    name: "Rainbow".into(),
                    category: String::new(),
                },
                AnimationInfo {
                    index: 1,
                    name: "Pulse".into(),
                    category: "fluora/audio".into(),
                },
                AnimationInfo {
                    index: 2,
                    name: "Wave".into(),
                    category: "monos".into(),
                },
            ],
            active_scene_index: Some(0),
            active_animation_index: None,
            mac: None,
            ip: "10.0.0.5".parse().unwrap(),
            routes: ControlRoutes::default(),
        }
    }

    #[test]
    fn current_effect_follows_mode() {
        let snap = base_snapshot();
        assert_eq!(snap.current_effect_id(), EffectId::Scene(0));
        assert_eq!(snap.current_effect(), "Scene: Sunset");
    }

    #[test]
    fn effects_excludes_incompatible_animations() {
        let snap = base_snapshot();
        let names = snap.effect_list();
        assert!(names.contains(&"Rainbow".to_string()));
        assert!(names.contains(&"Pulse".to_string()));
        assert!(!names.contains(&"Wave".to_string()));
    }

    #[test]
    fn effect_id_for_name_round_trips() {
        let snap = base_snapshot();
        assert_eq!(
            snap.effect_id_for_name("Scene: Sunset"),
            Some(EffectId::Scene(0))
        );
        assert_eq!(snap.effect_id_for_name("nonexistent"), None);
    }

    #[test]
    fn each_mode_keeps_an_independent_palette() {
        let mut snap = base_snapshot();
        snap.set_hue(DeviceMode::Scene, 0.2);
        snap.set_hue(DeviceMode::Manual, 0.8);
        assert_eq!(snap.palette(DeviceMode::Scene).hue, 0.2);
        assert_eq!(snap.palette(DeviceMode::Manual).hue, 0.8);
        assert_eq!(snap.palette(DeviceMode::Auto).hue, 0.0);
        assert_eq!(snap.current_palette().hue, 0.2);
    }
}
