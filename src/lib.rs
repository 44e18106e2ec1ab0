pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod light;
pub mod project;
pub mod runner;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use camera::{Camera, CameraDriver, CameraDriverFactory, CameraVariant, ConfigBuilder};
pub use capture::{CalibrationPipeline, CaptureController, CaptureMetadata, CaptureRecord};
pub use config::MeapisConfig;
pub use error::{CameraError, MeapisError, Result};
pub use light::LightController;
pub use project::{CalibrationSettings, Project, ProjectDescriptor, ProjectStore};
pub use runner::{ProjectRunner, RunnerStatus, ShutdownReason};
pub use scheduler::CaptureScheduler;
