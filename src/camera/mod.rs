mod controls;
mod device;
mod driver;
mod modes;
mod profile;
mod rpicam;
mod simulated;
mod tuning;
mod variant;

pub use controls::{
    CameraConfiguration, Control, ControlMode, ControlValue, Rectangle, Size, Transform,
};
pub use device::{Camera, CaptureOptions};
pub use driver::{
    CameraDriver, CameraDriverFactory, CaptureRequest, DriverMetadata, AF_STATE_FOCUSED,
};
pub use modes::{central_focus_area, largest_mode, smallest_mode, SensorMode, EXCLUDED_MODE_WIDTH};
pub use profile::{ConfigBuilder, ConfigurationProfile, ProfilePurpose};
pub use rpicam::{parse_sensor_modes, RpicamCameraFactory, RpicamDriver, StillInvocation};
pub use simulated::{simulated_modes, SimulatedCameraFactory, SimulatedDriver};
pub use tuning::{patch_autofocus, prepare_tuning_file};
pub use variant::CameraVariant;
