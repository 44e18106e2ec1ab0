use super::controls::CameraConfiguration;
use super::modes::SensorMode;
use super::variant::CameraVariant;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// libcamera `AfState` value reported after a successful focus scan
pub const AF_STATE_FOCUSED: i64 = 2;

/// Per-frame metadata reported by the camera driver.
///
/// The values the capture core reads are typed; everything else the driver
/// reports is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverMetadata {
    #[serde(rename = "ExposureTime", skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<u32>,

    #[serde(rename = "AnalogueGain", skip_serializing_if = "Option::is_none")]
    pub analogue_gain: Option<f32>,

    #[serde(rename = "LensPosition", skip_serializing_if = "Option::is_none")]
    pub lens_position: Option<f32>,

    #[serde(rename = "AfState", skip_serializing_if = "Option::is_none")]
    pub af_state: Option<i64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A completed capture held by the driver until released
#[async_trait::async_trait]
pub trait CaptureRequest: Send + Sync {
    /// Write the encoded image to `path`
    async fn save(&self, path: &Path) -> Result<()>;

    fn metadata(&self) -> &DriverMetadata;

    /// Hand the buffers back to the driver
    async fn release(&mut self) -> Result<()>;
}

/// Low-level camera device
#[async_trait::async_trait]
pub trait CameraDriver: Send + Sync {
    /// Stable identifier of the device, recorded in capture metadata
    fn camera_id(&self) -> String;

    async fn sensor_modes(&mut self) -> Result<Vec<SensorMode>>;

    /// Apply a configuration; takes effect from the next start
    async fn configure(&mut self, config: &CameraConfiguration) -> Result<()>;

    async fn start(&mut self) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    /// Capture one still encoded as `format` (jpg, png, ...)
    async fn capture_request(&mut self, format: &str) -> Result<Box<dyn CaptureRequest>>;

    /// Run one autofocus scan; `true` when the lens settled in focus
    async fn autofocus_cycle(&mut self) -> Result<bool>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens camera drivers for a variant
pub trait CameraDriverFactory: Send + Sync {
    fn open(&self, variant: CameraVariant) -> Result<Box<dyn CameraDriver>>;
}
