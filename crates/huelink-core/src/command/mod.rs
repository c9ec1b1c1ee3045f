// ── Control commands ──
//
// A request to change one device's features, optionally with an on-time
// after which the device is switched off again.

mod queue;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{Feature, FeatureSet};

pub use queue::{ControlQueue, QueueState};

/// Exclusive upper bound for an on-time, in seconds.
pub const MAX_ON_TIME_SECS: f64 = 8_000_000.0;

/// Suffix appended to the correlation id of a synthesized auto-off.
pub const AUTO_OFF_SUFFIX: &str = "_OnTimeOff";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub correlation_id: String,
    pub device_id: String,
    pub features: FeatureSet,
    /// Seconds until the device is switched off again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_time: Option<f64>,
}

impl ControlCommand {
    pub fn new(
        correlation_id: impl Into<String>,
        device_id: impl Into<String>,
        features: FeatureSet,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            device_id: device_id.into(),
            features,
            on_time: None,
        }
    }

    #[must_use]
    pub fn with_on_time(mut self, seconds: f64) -> Self {
        self.on_time = Some(seconds);
        self
    }

    /// Delay before the auto-off, if the on-time is usable.
    ///
    /// Fractions of a second are dropped; on-times under one second or at
    /// or above [`MAX_ON_TIME_SECS`] are ignored.
    pub fn auto_off_after(&self) -> Option<Duration> {
        let seconds = self.on_time?.trunc();
        if !(1.0..MAX_ON_TIME_SECS).contains(&seconds) {
            return None;
        }
        Duration::try_from_secs_f64(seconds).ok()
    }

    /// The switch-off command fired when this command's on-time elapses.
    pub fn auto_off(&self) -> Self {
        Self {
            correlation_id: format!("{}{AUTO_OFF_SUFFIX}", self.correlation_id),
            device_id: self.device_id.clone(),
            features: [Feature::switch(false)].into_iter().collect(),
            on_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(on_time: f64) -> ControlCommand {
        ControlCommand::new("req-1", "dev-1", FeatureSet::new()).with_on_time(on_time)
    }

    #[test]
    fn on_time_bounds() {
        assert_eq!(command(5.0).auto_off_after(), Some(Duration::from_secs(5)));
        assert_eq!(command(7.9).auto_off_after(), Some(Duration::from_secs(7)));
        assert_eq!(command(0.0).auto_off_after(), None);
        assert_eq!(command(0.5).auto_off_after(), None);
        assert_eq!(command(-3.0).auto_off_after(), None);
        assert_eq!(command(8_000_000.0).auto_off_after(), None);
        assert_eq!(command(f64::NAN).auto_off_after(), None);
        assert_eq!(
            ControlCommand::new("req-1", "dev-1", FeatureSet::new()).auto_off_after(),
            None
        );
    }

    #[test]
    fn auto_off_switches_off_under_derived_id() {
        let off = command(5.0).auto_off();
        assert_eq!(off.correlation_id, "req-1_OnTimeOff");
        assert_eq!(off.device_id, "dev-1");
        assert_eq!(off.on_time, None);
        assert_eq!(off.features, [Feature::switch(false)].into_iter().collect());
    }
}
