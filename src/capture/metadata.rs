use crate::camera::DriverMetadata;
use crate::error::{MeapisError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Where and when one capture was stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub project: String,
    /// Image name without extension
    pub filename: String,
    pub timestamp_utc: DateTime<Utc>,
    /// Image path; the would-be path when the image was not saved
    pub path: PathBuf,
    pub camera: String,
}

/// Output of one capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    #[serde(flatten)]
    pub record: CaptureRecord,
    pub driver: DriverMetadata,
}

impl CaptureMetadata {
    pub fn lens_position(&self) -> Option<f32> {
        self.driver.lens_position
    }

    pub fn analogue_gain(&self) -> Option<f32> {
        self.driver.analogue_gain
    }

    pub fn exposure_time(&self) -> Option<u32> {
        self.driver.exposure_time
    }
}

/// Write `value` as pretty JSON to `path`
pub(crate) async fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        MeapisError::component("capture", &format!("Failed to serialize metadata: {}", e))
    })?;

    fs::write(path, json).await.map_err(|e| {
        MeapisError::component(
            "capture",
            &format!("Failed to write {}: {}", path.display(), e),
        )
    })?;

    debug!("Saved metadata to {}", path.display());
    Ok(())
}

/// Sidecar path for an image: `<image>.json`
pub fn sidecar_path(image: &Path) -> PathBuf {
    let mut name = image.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}
