//! Reactive control layer between a host smart-home platform and Hue
//! bridges.
//!
//! Hosts build a [`Controller`] from a [`CoreConfig`], a [`BridgeStore`],
//! an [`HttpTransport`](huelink_api::HttpTransport) and an
//! [`AddressResolver`], then:
//!
//! - queue [`ControlCommand`]s, which run serially per bridge with a fixed
//!   pause between them and optional auto-off timers;
//! - start and stop each bridge's event stream, whose updates arrive as
//!   [`HostMessage::StatusChanged`] on the controller's receiver;
//! - discover devices and manage which of them are reported.
//!
//! Normalized [`Feature`]s are the only device state hosts see; the
//! [`convert`] module maps them to and from bridge resources using
//! [`color`] math.

pub mod color;
pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod light_state;
pub mod model;
pub mod publish;
pub mod resolve;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{AUTO_OFF_SUFFIX, ControlCommand, ControlQueue, MAX_ON_TIME_SECS, QueueState};
pub use config::{CoreConfig, TlsVerification};
pub use controller::Controller;
pub use error::CoreError;
pub use publish::{ControlError, ControlResponse, HostMessage, Publisher, StatusEvent};
pub use resolve::{
    AddressResolver, BridgeLookup, CachingResolver, DirectResolver, DiscoveredBridge,
};
pub use store::{BridgeStore, MemoryBridgeStore};
pub use stream::{EventDispatcher, EventStreamSupervisor, StreamState};

// ── Model re-exports ────────────────────────────────────────────────
pub use model::{
    AutoOffTimer, Bridge, BridgeInfo, BridgeState, Device, DeviceType, Feature, FeatureKind,
    FeatureSet, Marker, Setpoint,
};
