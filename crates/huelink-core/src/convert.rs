// ── Feature conversion ──
//
// Stateless mapping between normalized features and bridge light
// resources. Missing or malformed fields mean "feature absent"; nothing
// here fails.

use tracing::{debug, warn};

use huelink_api::ResourceSnapshot;
use huelink_api::models::{
    Color, ColorTemperature, Device as BridgeDevice, Dimming, Light, On, XyPoint,
    ZigbeeConnectivity,
};

use crate::color::{
    MIREK_MAX, MIREK_MIN, hue_saturation_from_xy, kelvin_to_mirek, mirek_to_kelvin,
    xy_from_hue_saturation,
};
use crate::model::{Device, DeviceType, Feature, FeatureKind, FeatureSet};

const PLUG_ARCHETYPE: &str = "plug";

// ── Host → bridge ────────────────────────────────────────────────────

/// Build the sparse light update for a requested feature set.
///
/// Dimming decides the on state when present, overriding any switch
/// feature. Sentinel temperatures and colors are left out.
pub fn render(features: &FeatureSet) -> Light {
    let mut light = Light::default();

    if let Some(Feature::SwitchState { on }) = features.get(FeatureKind::SwitchState) {
        light.on = Some(On { on: *on });
    }

    if let Some(Feature::Dimming { level }) = features.get(FeatureKind::Dimming) {
        if (0.0..=1.0).contains(level) {
            let brightness = level * 100.0;
            light.dimming = Some(Dimming { brightness });
            light.on = Some(On {
                on: brightness > 0.0,
            });
        }
    }

    if let Some(Feature::ColorTemperature {
        kelvin: Some(kelvin),
        ..
    }) = features.get(FeatureKind::ColorTemperature)
    {
        if let Some(kelvin) = kelvin.value() {
            light.color_temperature = Some(ColorTemperature {
                mirek: Some(kelvin_to_mirek(kelvin, MIREK_MIN, MIREK_MAX)),
                ..ColorTemperature::default()
            });
        }
    }

    if let Some(Feature::Color { hue, saturation }) = features.get(FeatureKind::Color) {
        if let (Some(hue), Some(saturation)) = (hue.value(), saturation.value()) {
            let (x, y) = xy_from_hue_saturation(hue, saturation);
            light.color = Some(Color {
                xy: Some(XyPoint { x, y }),
            });
        }
    }

    light
}

// ── Bridge → host ────────────────────────────────────────────────────

/// Full feature snapshot of a light, used at discovery.
///
/// Empty when the light has no on/off state. Color-capable lights always
/// get a color feature, zeroed when the bridge reports no usable xy.
pub fn supported_features(light: &Light) -> FeatureSet {
    snapshot(light, true)
}

/// Feature snapshot of a freshly fetched light state.
///
/// Like [`supported_features`], except color temperature is reported only
/// when the bridge included a mirek value.
pub fn light_features(light: &Light) -> FeatureSet {
    snapshot(light, false)
}

fn snapshot(light: &Light, initial: bool) -> FeatureSet {
    let Some(on) = light.on else {
        return FeatureSet::new();
    };

    let mut features = FeatureSet::new();
    features.insert(Feature::switch(on.on));

    if let Some(dimming) = light.dimming {
        features.insert(Feature::dimming(dimming.brightness / 100.0));
    }

    if let Some(ct) = &light.color_temperature {
        if initial || ct.mirek.is_some() {
            if let Some(feature) = temperature_with_range(ct) {
                features.insert(feature);
            }
        }
    }

    if let Some(color) = &light.color {
        let (hue, saturation) = color
            .xy
            .and_then(|xy| hue_saturation_from_xy(xy.x, xy.y))
            .unwrap_or((0, 0.0));
        features.insert(Feature::color(hue, saturation));
    }

    features
}

/// Temperature feature with the Kelvin range derived from the mirek
/// schema. The highest mirek is the warmest, lowest Kelvin, so
/// `min_kelvin` comes from `mirek_maximum` and `max_kelvin` from
/// `mirek_minimum`; hosts always get `min_kelvin <= max_kelvin`.
fn temperature_with_range(ct: &ColorTemperature) -> Option<Feature> {
    let schema = ct.mirek_schema?;
    let min_kelvin = mirek_to_kelvin(schema.mirek_maximum).ok()?;
    let max_kelvin = mirek_to_kelvin(schema.mirek_minimum).ok()?;
    let kelvin = if ct.mirek_valid == Some(true) {
        ct.mirek.and_then(|m| mirek_to_kelvin(m).ok())
    } else {
        None
    };
    Some(Feature::ColorTemperature {
        kelvin: kelvin.map(Into::into),
        min_kelvin: Some(min_kelvin),
        max_kelvin: Some(max_kelvin),
    })
}

// ── Live deltas ──────────────────────────────────────────────────────

/// Features changed by one light update, plus whether the true brightness
/// has to be fetched from the bridge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    pub features: FeatureSet,
    /// Light id to fetch; set when a light turned on and no cached
    /// brightness is known.
    pub fetch_light: Option<String>,
}

/// Map a light update from the event stream against the cached device.
///
/// Turning off implies zero brightness. Turning on restores the cached
/// brightness if there is one, otherwise asks for a fetch. A valid color
/// temperature suppresses any xy color in the same update.
pub fn compute_delta(cached: Option<&Device>, light: &Light) -> Delta {
    let mut delta = Delta::default();

    if let Some(on) = light.on {
        delta.features.insert(Feature::switch(on.on));
        if on.on {
            match cached.and_then(|d| d.features.get(FeatureKind::Dimming)) {
                Some(dimming) => {
                    delta.features.insert(*dimming);
                }
                None => {
                    delta.fetch_light.clone_from(&light.id);
                    if light.id.is_none() {
                        warn!("light turned on without an id, cannot fetch brightness");
                    }
                }
            }
        } else {
            delta.features.insert(Feature::dimming(0.0));
        }
    }

    if let Some(dimming) = light.dimming {
        delta
            .features
            .insert(Feature::dimming(dimming.brightness / 100.0));
    }

    let temperature_valid = light
        .color_temperature
        .as_ref()
        .is_some_and(|ct| ct.mirek_valid == Some(true));

    if temperature_valid {
        let kelvin = light
            .color_temperature
            .as_ref()
            .and_then(|ct| ct.mirek)
            .filter(|m| *m > 0)
            .and_then(|m| mirek_to_kelvin(m).ok());
        if let Some(kelvin) = kelvin {
            delta.features.insert(Feature::ColorTemperature {
                kelvin: Some(kelvin.into()),
                min_kelvin: None,
                max_kelvin: None,
            });
        }
    } else if let Some(xy) = light.color.as_ref().and_then(|c| c.xy) {
        if let Some((hue, saturation)) = hue_saturation_from_xy(xy.x, xy.y) {
            delta.features.insert(Feature::color(hue, saturation));
        }
    }

    delta
}

/// Reachability feature for a connectivity status.
pub fn maintenance(connectivity: &ZigbeeConnectivity) -> Feature {
    Feature::maintenance(!connectivity.is_connected())
}

// ── Devices ──────────────────────────────────────────────────────────

/// Normalized device from its bridge device, light and connectivity.
///
/// Plugs without dimming are switches; everything else is a light.
pub fn device_from_resources(
    device: &BridgeDevice,
    light: &Light,
    connectivity: &ZigbeeConnectivity,
) -> Device {
    let mut features = supported_features(light);
    features.insert(maintenance(connectivity));

    let product = device.product_data.as_ref();
    let archetype = product.and_then(|p| p.product_archetype.clone());
    let device_type = if archetype.as_deref() == Some(PLUG_ARCHETYPE)
        && !features.contains(FeatureKind::Dimming)
    {
        DeviceType::Switch
    } else {
        DeviceType::Light
    };

    Device {
        id: device.id.clone(),
        name: device.metadata.as_ref().and_then(|m| m.name.clone()),
        model: product.and_then(|p| p.model_id.clone()),
        firmware_version: product.and_then(|p| p.software_version.clone()),
        archetype,
        device_type,
        features,
    }
}

/// Join a resource listing into normalized devices.
///
/// Only devices with both a light and a connectivity service are kept.
pub fn devices_from_snapshot(snapshot: &ResourceSnapshot) -> Vec<Device> {
    let light_for = |device_id: &str| {
        snapshot
            .lights
            .iter()
            .find(|l| l.owner_id() == Some(device_id))
    };
    let connectivity_for = |device_id: &str| {
        snapshot
            .connectivity
            .iter()
            .find(|c| c.owner_id() == Some(device_id))
    };

    for light in &snapshot.lights {
        let owned = light
            .owner_id()
            .is_some_and(|owner| snapshot.devices.iter().any(|d| d.id == owner));
        if !owned {
            warn!(light_id = ?light.id, "light service does not map to any device");
        }
    }

    let devices: Vec<Device> = snapshot
        .devices
        .iter()
        .filter_map(|device| {
            let light = light_for(&device.id)?;
            let connectivity = connectivity_for(&device.id)?;
            Some(device_from_resources(device, light, connectivity))
        })
        .collect();

    debug!(
        listed = snapshot.devices.len(),
        converted = devices.len(),
        "converted bridge devices"
    );
    devices
}
