use super::controls::{CameraConfiguration, Control, Transform};
use crate::error::CameraError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exposure compensation applied to every Owlsight profile, in EV
const OWLSIGHT_EXPOSURE_VALUE: f32 = -0.66;

/// Supported camera modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CameraVariant {
    /// Arducam Owlsight (OV64A40), camera port 0
    Owlsight,
    /// Raspberry Pi Camera Module 3 NoIR (IMX708), camera port 1, mounted upside down
    V3,
}

impl CameraVariant {
    /// Camera index on the board, also the project descriptor selector
    pub fn index(&self) -> u8 {
        match self {
            CameraVariant::Owlsight => 0,
            CameraVariant::V3 => 1,
        }
    }

    pub fn tuning_file(&self) -> &'static str {
        match self {
            CameraVariant::Owlsight => "ov64a40.json",
            CameraVariant::V3 => "imx708_noir.json",
        }
    }

    /// The V3 needs full resolution even while focusing
    pub fn always_largest_mode(&self) -> bool {
        matches!(self, CameraVariant::V3)
    }

    /// Module-specific tweak applied on top of every profile
    pub fn apply_override(&self, config: &mut CameraConfiguration) {
        match self {
            CameraVariant::Owlsight => config.set(Control::ExposureValue, OWLSIGHT_EXPOSURE_VALUE),
            CameraVariant::V3 => config.transform = Transform::rotate_180(),
        }
    }
}

impl TryFrom<u8> for CameraVariant {
    type Error = CameraError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CameraVariant::Owlsight),
            1 => Ok(CameraVariant::V3),
            value => Err(CameraError::UnknownVariant { value }),
        }
    }
}

impl From<CameraVariant> for u8 {
    fn from(variant: CameraVariant) -> Self {
        variant.index()
    }
}

impl fmt::Display for CameraVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraVariant::Owlsight => write!(f, "owlsight"),
            CameraVariant::V3 => write!(f, "v3"),
        }
    }
}
