// ── Normalized device ──

use serde::{Deserialize, Serialize};
use strum::Display;

use super::feature::FeatureSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    Light,
    Switch,
}

/// A bridge device as the host sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Bridge device id (the owner id of its services).
    pub id: String,
    pub name: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub archetype: Option<String>,
    pub device_type: DeviceType,
    pub features: FeatureSet,
}
