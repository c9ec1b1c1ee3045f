// Bridge-native CLIP v2 resource models.
//
// Every field the bridge may omit is an `Option` and skipped on
// serialization, so the same `Light` type serves both as a decoded
// resource and as a sparse PUT body.

use serde::{Deserialize, Serialize};

/// Reference to another resource: `{ "rid": "...", "rtype": "device" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub rid: String,
    pub rtype: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct On {
    pub on: bool,
}

/// Brightness in percent, `0.0..=100.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimming {
    pub brightness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirekSchema {
    pub mirek_minimum: u16,
    pub mirek_maximum: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTemperature {
    /// `null` while the light is in xy color mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirek: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirek_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirek_schema: Option<MirekSchema>,
}

/// CIE 1931 chromaticity coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<XyPoint>,
}

/// A `light` resource, or a sparse update to one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Light {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ResourceIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<On>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimming: Option<Dimming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<ColorTemperature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl Light {
    /// Id of the device that owns this light service.
    pub fn owner_id(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.rid.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductData {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub manufacturer_name: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_archetype: Option<String>,
    #[serde(default)]
    pub software_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub archetype: Option<String>,
}

/// A physical `device` resource and the services it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub product_data: Option<ProductData>,
    #[serde(default)]
    pub metadata: Option<DeviceMetadata>,
    #[serde(default)]
    pub services: Vec<ResourceIdentifier>,
}

impl Device {
    /// Id of the first `light` service, if the device has one.
    pub fn light_service(&self) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.rtype == "light")
            .map(|s| s.rid.as_str())
    }
}

/// A `zigbee_connectivity` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZigbeeConnectivity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub owner: Option<ResourceIdentifier>,
    /// `"connected"`, `"disconnected"`, `"connectivity_issue"`, ...
    #[serde(default)]
    pub status: Option<String>,
}

impl ZigbeeConnectivity {
    pub fn owner_id(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.rid.as_str())
    }

    pub fn is_connected(&self) -> bool {
        self.status.as_deref() == Some("connected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sparse_update_skips_absent_fields() {
        let update = Light {
            on: Some(On { on: true }),
            dimming: Some(Dimming { brightness: 42.0 }),
            ..Light::default()
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            json!({ "on": { "on": true }, "dimming": { "brightness": 42.0 } })
        );
    }

    #[test]
    fn light_tolerates_null_mirek_and_unknown_fields() {
        let light: Light = serde_json::from_value(json!({
            "id": "l1",
            "type": "light",
            "owner": { "rid": "d1", "rtype": "device" },
            "color_temperature": { "mirek": null, "mirek_valid": false },
            "color": { "xy": { "x": 0.3, "y": 0.3 }, "gamut_type": "C" }
        }))
        .unwrap();
        assert_eq!(light.owner_id(), Some("d1"));
        let ct = light.color_temperature.unwrap();
        assert_eq!(ct.mirek, None);
        assert_eq!(ct.mirek_valid, Some(false));
    }

    #[test]
    fn device_finds_light_service() {
        let device: Device = serde_json::from_value(json!({
            "id": "d1",
            "services": [
                { "rid": "z1", "rtype": "zigbee_connectivity" },
                { "rid": "l1", "rtype": "light" }
            ]
        }))
        .unwrap();
        assert_eq!(device.light_service(), Some("l1"));
    }
}
