// ── Normalized features ──
//
// A device's capabilities and state as the host sees them, independent of
// the bridge wire format. A device carries at most one feature per kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

/// Host-side sentinel meaning "don't change this value".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// Leave the value untouched.
    Ignore,
    /// Restore the last value the device had.
    KeepLast,
}

/// A concrete value, or one of the "don't change" sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setpoint<T> {
    Value(T),
    Marker(Marker),
}

impl<T: Copy> Setpoint<T> {
    /// The concrete value, `None` for sentinels.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Marker(_) => None,
        }
    }
}

impl<T> From<T> for Setpoint<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

// ── Feature ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    SwitchState,
    Dimming,
    ColorTemperature,
    Color,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Feature {
    SwitchState {
        on: bool,
    },
    /// Level in `0.0..=1.0`.
    Dimming {
        level: f64,
    },
    /// Current temperature plus the supported range, all in Kelvin.
    /// Deltas carry no range. `min_kelvin` is the warm end (the bridge's
    /// `mirek_maximum`) and `max_kelvin` the cool end.
    ColorTemperature {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kelvin: Option<Setpoint<u32>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_kelvin: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_kelvin: Option<u32>,
    },
    /// Hue in degrees (`0..=359`), saturation in `0.0..=1.0`.
    Color {
        hue: Setpoint<u16>,
        saturation: Setpoint<f64>,
    },
    Maintenance {
        unreachable: bool,
    },
}

impl Feature {
    pub fn kind(&self) -> FeatureKind {
        match self {
            Self::SwitchState { .. } => FeatureKind::SwitchState,
            Self::Dimming { .. } => FeatureKind::Dimming,
            Self::ColorTemperature { .. } => FeatureKind::ColorTemperature,
            Self::Color { .. } => FeatureKind::Color,
            Self::Maintenance { .. } => FeatureKind::Maintenance,
        }
    }

    pub fn switch(on: bool) -> Self {
        Self::SwitchState { on }
    }

    pub fn dimming(level: f64) -> Self {
        Self::Dimming { level }
    }

    pub fn color(hue: u16, saturation: f64) -> Self {
        Self::Color {
            hue: hue.into(),
            saturation: saturation.into(),
        }
    }

    pub fn maintenance(unreachable: bool) -> Self {
        Self::Maintenance { unreachable }
    }
}

// ── FeatureSet ───────────────────────────────────────────────────────

/// Features keyed by kind; inserting replaces any feature of the same kind.
///
/// Serialized as a plain list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Feature>", into = "Vec<Feature>")]
pub struct FeatureSet {
    features: BTreeMap<FeatureKind, Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, returning the replaced feature of the same kind.
    pub fn insert(&mut self, feature: Feature) -> Option<Feature> {
        self.features.insert(feature.kind(), feature)
    }

    pub fn get(&self, kind: FeatureKind) -> Option<&Feature> {
        self.features.get(&kind)
    }

    pub fn contains(&self, kind: FeatureKind) -> bool {
        self.features.contains_key(&kind)
    }

    pub fn remove(&mut self, kind: FeatureKind) -> Option<Feature> {
        self.features.remove(&kind)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    /// Fold `delta` into this set, replacing only kinds already present.
    ///
    /// A color-temperature delta without a range inherits the cached range.
    /// Returns whether anything actually changed.
    pub fn merge_existing(&mut self, delta: &FeatureSet) -> bool {
        let mut changed = false;
        for incoming in delta.iter() {
            let Some(current) = self.features.get_mut(&incoming.kind()) else {
                continue;
            };
            let merged = inherit_range(current, *incoming);
            if *current != merged {
                *current = merged;
                changed = true;
            }
        }
        changed
    }
}

fn inherit_range(current: &Feature, incoming: Feature) -> Feature {
    match (current, incoming) {
        (
            Feature::ColorTemperature {
                min_kelvin: cached_min,
                max_kelvin: cached_max,
                ..
            },
            Feature::ColorTemperature {
                kelvin,
                min_kelvin,
                max_kelvin,
            },
        ) => Feature::ColorTemperature {
            kelvin,
            min_kelvin: min_kelvin.or(*cached_min),
            max_kelvin: max_kelvin.or(*cached_max),
        },
        (_, incoming) => incoming,
    }
}

impl From<Vec<Feature>> for FeatureSet {
    fn from(features: Vec<Feature>) -> Self {
        features.into_iter().collect()
    }
}

impl From<FeatureSet> for Vec<Feature> {
    fn from(set: FeatureSet) -> Self {
        set.features.into_values().collect()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut set = Self::new();
        for feature in iter {
            set.insert(feature);
        }
        set
    }
}

impl Extend<Feature> for FeatureSet {
    fn extend<I: IntoIterator<Item = Feature>>(&mut self, iter: I) {
        for feature in iter {
            self.insert(feature);
        }
    }
}

impl IntoIterator for FeatureSet {
    type Item = Feature;
    type IntoIter = std::collections::btree_map::IntoValues<FeatureKind, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_values()
    }
}
