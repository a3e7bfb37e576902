//! Effect identification and the auto/scene/manual mode model.

use std::fmt;

use crate::error::Error;

/// The three ways a device can be driving its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Auto,
    Scene,
    Manual,
}

impl DeviceMode {
    pub fn as_route_value(&self) -> i32 {
        match self {
            DeviceMode::Auto => 0,
            DeviceMode::Scene => 1,
            DeviceMode::Manual => 2,
        }
    }

    pub fn from_route_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(DeviceMode::Auto),
            1 => Some(DeviceMode::Scene),
            2 => Some(DeviceMode::Manual),
            _ => None,
        }
    }
}

/// A flattened (mode, selection-within-mode) pair, the unit that
/// `set_effect` and `current_effect_id` both operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectId {
    Auto,
    Scene(u32),
    Manual(u32),
}

impl EffectId {
    /// Parse `"auto"`, `"scene:<n>"`, or `"manual:<n>"`.
    pub fn parse(input: &str) -> Result<Self, Error> {
        if input == "auto" {
            return Ok(EffectId::Auto);
        }
        if let Some(rest) = input.strip_prefix("scene:") {
            let index: u32 = rest.parse().map_err(|_| Error::UnknownEffect(input.to_string()))?;
            return Ok(EffectId::Scene(index));
        }
        if let Some(rest) = input.strip_prefix("manual:") {
            let index: u32 = rest.parse().map_err(|_| Error::UnknownEffect(input.to_string()))?;
            return Ok(EffectId::Manual(index));
        }
        Err(Error::UnknownEffect(input.to_string()))
    }

    pub fn mode(&self) -> DeviceMode {
        match self {
            EffectId::Auto => DeviceMode::Auto,
            EffectId::Scene(_) => DeviceMode::Scene,
            EffectId::Manual(_) => DeviceMode::Manual,
        }
    }

    pub fn index(&self) -> Option<u32> {
        match self {
            EffectId::Auto => None,
            EffectId::Scene(i) | EffectId::Manual(i) => Some(*i),
        }
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectId::Auto => write!(f, "auto"),
            EffectId::Scene(i) => write!(f, "scene:{i}"),
            EffectId::Manual(i) => write!(f, "manual:{i}"),
        }
    }
}

/// A saved-scene entry as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    pub index: u32,
    pub name: String,
}

/// A manual-animation entry. `category` is the `/` prefix on the
/// animation's raw id (`"fluora"`, `"monos"`, `"fluora/audio"`, or empty
/// for a generic animation) and gates which models it is compatible with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationInfo {
    pub index: u32,
    pub name: String,
    pub category: String,
}

impl AnimationInfo {
    /// Split a raw manual-animation id of the wire form
    /// `"<category>::<name>"` into its parts. An id with no `::`
    /// separator is treated as an uncategorized (always-compatible)
    /// animation, per spec: "If an id lacks a prefix, it is treated as
    /// compatible." `index` is the device's active-animation-index
    /// value this entry corresponds to, supplied separately since it
    /// isn't carried in the id string itself.
    pub fn from_raw_id(index: u32, raw_id: &str) -> Self {
        match raw_id.split_once("::") {
            Some((category, name)) => AnimationInfo {
                index,
                name: name.to_string(),
                category: category.to_string(),
            },
            None => AnimationInfo {
                index,
                name: raw_id.to_string(),
                category: String::new(),
            },
        }
    }

    /// Whether this animation's category is usable on `model`.
    ///
    /// An animation with no category prefix is always compatible. The
    /// compatibility table keys on a *substring* of the reported model
    /// name, matching case-insensitively (a device reports model
    /// strings like `"Fluora Gen2"`, not the bare key) — a model
    /// containing `fluora` accepts `generic`, `fluora`, and
    /// `fluora/audio` categories; one containing `monos` accepts
    /// `generic` and `monos`; any other model only accepts `generic`.
    pub fn compatible_with_model(&self, model: &str) -> bool {
        if self.category.is_empty() {
            return true;
        }
        let model = model.to_ascii_lowercase();
        let allowed: &[&str] = if model.contains("fluora") {
            &["generic", "fluora", "fluora/audio"]
        } else if model.contains("monos") {
            &["generic", "monos"]
        } else {
            &["generic"]
        };
        allowed.contains(&self.category.as_str())
    }
}

/// A single entry in the flattened, user-facing effect list: an
/// auto-mode placeholder, a scene, or a compatible manual animation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectInfo {
    pub id: EffectId,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auto() {
        assert_eq!(EffectId::parse("auto").unwrap(), EffectId::Auto);
    }

    #[test]
    fn parses_scene_and_manual() {
        assert_eq!(EffectId::parse("scene:3").unwrap(), EffectId::Scene(3));
        assert_eq!(EffectId::parse("manual:7").unwrap(), EffectId::Manual(7));
    }

    #[test]
    fn rejects_garbage() {
        assert!(EffectId::parse("scene:abc").is_err());
        assert!(EffectId::parse("nonsense").is_err());
        assert!(EffectId::parse("").is_err());
    }

    #[test]
    fn round_trips_through_display() {
        for id in [EffectId::Auto, EffectId::Scene(2), EffectId::Manual(5)] {
            let text = id.to_string();
            assert_eq!(EffectId::parse(&text).unwrap(), id);
        }
    }

    #[test]
    fn from_raw_id_splits_category_and_name() {
        let parsed = AnimationInfo::from_raw_id(1, "fluora/audio::pulse");
        assert_eq!(parsed.category, "fluora/audio");
        assert_eq!(parsed.name, "pulse");
    }

    #[test]
    fn from_raw_id_without_separator_is_uncategorized() {
        let parsed = AnimationInfo::from_raw_id(0, "rainbow");
        assert_eq!(parsed.category, "");
        assert_eq!(parsed.name, "rainbow");
        assert!(parsed.compatible_with_model("anything"));
    }

    #[test]
    fn animation_compatibility_matches_model_rules() {
        let fluora_audio = AnimationInfo {
            index: 0,
            name: "pulse".into(),
            category: "fluora/audio".into(),
        };
        assert!(fluora_audio.compatible_with_model("fluora"));
        assert!(!fluora_audio.compatible_with_model("monos"));

        let generic = AnimationInfo {
            index: 1,
            name: "rainbow".into(),
            category: String::new(),
        };
        assert!(generic.compatible_with_model("anything"));

        let monos_only = AnimationInfo {
            index: 2,
            name: "wave".into(),
            category: "monos".into(),
        };
        assert!(monos_only.compatible_with_model("monos"));
        assert!(!monos_only.compatible_with_model("fluora"));
        assert!(!monos_only.compatible_with_model("unknown-model"));
    }
}
