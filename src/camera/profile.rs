use super::controls::{
    CameraConfiguration, Control, ControlMode, ControlValue, Rectangle, Transform,
};
use super::modes::{central_focus_area, largest_mode, smallest_mode, SensorMode};
use super::variant::CameraVariant;
use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Exposure time of the picture profile before calibration, in microseconds
const PICTURE_EXPOSURE_TIME: u32 = 10_000;
const PICTURE_ANALOGUE_GAIN: f32 = 1.0;
const BASE_SHARPNESS: f32 = 4.0;

/// What a configuration profile is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilePurpose {
    Focus,
    Exposure,
    Picture,
}

impl fmt::Display for ProfilePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfilePurpose::Focus => write!(f, "focus"),
            ProfilePurpose::Exposure => write!(f, "exposure"),
            ProfilePurpose::Picture => write!(f, "picture"),
        }
    }
}

/// A built camera configuration for one purpose
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationProfile {
    purpose: ProfilePurpose,
    config: CameraConfiguration,
}

impl ConfigurationProfile {
    pub fn purpose(&self) -> ProfilePurpose {
        self.purpose
    }

    pub fn configuration(&self) -> &CameraConfiguration {
        &self.config
    }

    pub fn set_control(&mut self, control: Control, value: impl Into<ControlValue>) {
        self.config.set(control, value);
    }

    pub fn get_control(&self, control: Control) -> Option<&ControlValue> {
        self.config.control(control)
    }
}

/// Builds the focus, exposure and picture profiles for one camera
pub struct ConfigBuilder {
    variant: CameraVariant,
    largest: SensorMode,
    smallest: SensorMode,
}

impl ConfigBuilder {
    /// Pick the modes the profiles are built from
    pub fn from_modes(variant: CameraVariant, modes: &[SensorMode]) -> Result<Self> {
        let largest = largest_mode(modes)?.clone();
        let smallest = smallest_mode(modes)?.clone();

        debug!(
            "Profile modes for {}: largest {}x{}, smallest {}x{}",
            variant,
            largest.size.width,
            largest.size.height,
            smallest.size.width,
            smallest.size.height
        );

        Ok(Self {
            variant,
            largest,
            smallest,
        })
    }

    fn base(&self, prefer_smallest: bool) -> CameraConfiguration {
        let mode = if prefer_smallest && !self.variant.always_largest_mode() {
            &self.smallest
        } else {
            &self.largest
        };

        let mut config = CameraConfiguration {
            sensor_size: mode.size,
            bit_depth: Some(mode.bit_depth),
            main_size: mode.size,
            crop_limits: mode.crop_limits,
            transform: Transform::default(),
            controls: BTreeMap::new(),
        };

        config.set(Control::AeExposureMode, ControlMode::Long);
        config.set(Control::NoiseReductionMode, ControlMode::Off);
        config.set(Control::Sharpness, BASE_SHARPNESS);
        self.variant.apply_override(&mut config);
        config
    }

    fn focus_window(&self) -> Result<Rectangle> {
        Ok(central_focus_area(&self.largest)?)
    }

    pub fn picture(&self) -> ConfigurationProfile {
        let mut config = self.base(false);
        config.set(Control::AeEnable, false);
        config.set(Control::ExposureTime, PICTURE_EXPOSURE_TIME);
        config.set(Control::AnalogueGain, PICTURE_ANALOGUE_GAIN);
        config.set(Control::AfMode, ControlMode::Manual);
        fixed_white_balance(&mut config);

        ConfigurationProfile {
            purpose: ProfilePurpose::Picture,
            config,
        }
    }

    pub fn focus(&self) -> Result<ConfigurationProfile> {
        let mut config = self.base(true);
        config.set(Control::AfMode, ControlMode::Auto);
        config.set(Control::AfRange, ControlMode::Macro);
        config.set(Control::AfMetering, ControlMode::Windows);
        config.set(Control::AfSpeed, ControlMode::Normal);
        config.set(Control::AwbEnable, true);
        config.set(Control::AwbMode, ControlMode::Auto);
        config.set(
            Control::AfWindows,
            ControlValue::Windows(vec![self.focus_window()?]),
        );

        Ok(ConfigurationProfile {
            purpose: ProfilePurpose::Focus,
            config,
        })
    }

    pub fn exposure(&self) -> Result<ConfigurationProfile> {
        let mut config = self.base(false);
        config.set(Control::AeEnable, true);
        config.set(Control::AeConstraintMode, ControlMode::Highlight);
        config.set(Control::AeMeteringMode, ControlMode::Matrix);
        config.set(Control::AfMetering, ControlMode::Windows);
        config.set(Control::AfMode, ControlMode::Manual);
        config.set(
            Control::AfWindows,
            ControlValue::Windows(vec![self.focus_window()?]),
        );
        fixed_white_balance(&mut config);

        Ok(ConfigurationProfile {
            purpose: ProfilePurpose::Exposure,
            config,
        })
    }
}

fn fixed_white_balance(config: &mut CameraConfiguration) {
    config.set(Control::AwbEnable, false);
    config.set(Control::AwbMode, ControlMode::Custom);
    config.set(Control::ColourGains, ControlValue::Gains(1.0, 1.0));
}
