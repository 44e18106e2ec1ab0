mod calibration;
mod controller;
pub(crate) mod metadata;
#[cfg(test)]
mod tests;

pub use calibration::CalibrationPipeline;
pub use controller::CaptureController;
pub use metadata::{sidecar_path, CaptureMetadata, CaptureRecord};
