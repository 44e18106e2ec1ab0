use crate::camera::{ConfigurationProfile, Control};
use serde::{Deserialize, Serialize};

/// Per-project camera settings derived once by calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    #[serde(rename = "LensPosition")]
    pub lens_position: f32,

    #[serde(rename = "AnalogueGain")]
    pub analogue_gain: f32,

    /// Microseconds
    #[serde(rename = "ExposureTime")]
    pub exposure_time: u32,
}

impl CalibrationSettings {
    /// Pin the profile to these settings
    pub fn apply_to(&self, profile: &mut ConfigurationProfile) {
        profile.set_control(Control::LensPosition, self.lens_position);
        profile.set_control(Control::AnalogueGain, self.analogue_gain);
        profile.set_control(Control::ExposureTime, self.exposure_time);
    }
}
