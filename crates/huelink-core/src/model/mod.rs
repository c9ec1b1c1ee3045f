// ── Domain model ──
//
// Normalized devices and features, plus the per-bridge state shared by the
// control and event paths.

pub mod bridge;
pub mod device;
pub mod feature;

pub use bridge::{AutoOffTimer, Bridge, BridgeInfo, BridgeState};
pub use device::{Device, DeviceType};
pub use feature::{Feature, FeatureKind, FeatureSet, Marker, Setpoint};
