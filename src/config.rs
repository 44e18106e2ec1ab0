use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MeapisConfig {
    pub system: SystemConfig,
    pub light: LightConfig,
    pub camera: CameraConfig,
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Hardware environment: simulated devices or the Raspberry Pi
    #[serde(default = "default_environment")]
    pub environment: RunEnvironment,

    /// Root of the projects tree
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LightConfig {
    /// Line offset on the GPIO controller driving the light
    #[serde(default = "default_gpio_line")]
    pub gpio_line: u32,

    /// Sysfs GPIO root directory
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    /// Label of the GPIO controller, e.g. `pinctrl-rp1`; the header pin
    /// controller is picked when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chip_label: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Still capture command
    #[serde(default = "default_still_command")]
    pub still_command: String,

    /// Camera listing command used for sensor mode discovery
    #[serde(default = "default_list_command")]
    pub list_command: String,

    /// Directory holding the libcamera tuning files
    #[serde(default = "default_tuning_dir")]
    pub tuning_dir: PathBuf,

    /// Scratch directory for in-flight captures and patched tuning files
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Time the sensor runs before a still is taken, in milliseconds
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CalibrationConfig {
    /// Autofocus cycles tried per focus attempt before calibration fails
    #[serde(default = "default_max_autofocus_attempts")]
    pub max_autofocus_attempts: u32,

    /// Pause between focusing and metering, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunEnvironment {
    Sim,
    Raspi,
}

impl RunEnvironment {
    pub fn tag(&self) -> &'static str {
        match self {
            RunEnvironment::Sim => "sim",
            RunEnvironment::Raspi => "raspi",
        }
    }
}

impl MeapisConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("meapis.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("system.environment", default_environment().tag())?
            .set_default(
                "system.data_dir",
                default_data_dir().to_string_lossy().to_string(),
            )?
            .set_default("light.gpio_line", default_gpio_line() as i64)?
            .set_default(
                "light.sysfs_root",
                default_sysfs_root().to_string_lossy().to_string(),
            )?
            .set_default("camera.still_command", default_still_command())?
            .set_default("camera.list_command", default_list_command())?
            .set_default(
                "camera.tuning_dir",
                default_tuning_dir().to_string_lossy().to_string(),
            )?
            .set_default(
                "camera.staging_dir",
                default_staging_dir().to_string_lossy().to_string(),
            )?
            .set_default(
                "camera.capture_timeout_ms",
                default_capture_timeout_ms() as i64,
            )?
            .set_default(
                "calibration.max_autofocus_attempts",
                default_max_autofocus_attempts() as i64,
            )?
            .set_default(
                "calibration.settle_delay_ms",
                default_settle_delay_ms() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // MEAPIS_SYSTEM__DATA_DIR=/srv/meapis style overrides
            .add_source(Environment::with_prefix("MEAPIS").separator("__"))
            .build()?;

        let config: MeapisConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Message(
                "System data_dir must not be empty".to_string(),
            ));
        }

        if self.camera.capture_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera capture_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.calibration.max_autofocus_attempts == 0 {
            return Err(ConfigError::Message(
                "Calibration max_autofocus_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render this configuration as TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for MeapisConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig {
                environment: default_environment(),
                data_dir: default_data_dir(),
            },
            light: LightConfig {
                gpio_line: default_gpio_line(),
                sysfs_root: default_sysfs_root(),
                chip_label: None,
            },
            camera: CameraConfig {
                still_command: default_still_command(),
                list_command: default_list_command(),
                tuning_dir: default_tuning_dir(),
                staging_dir: default_staging_dir(),
                capture_timeout_ms: default_capture_timeout_ms(),
            },
            calibration: CalibrationConfig {
                max_autofocus_attempts: default_max_autofocus_attempts(),
                settle_delay_ms: default_settle_delay_ms(),
            },
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_autofocus_attempts: default_max_autofocus_attempts(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

// Default value functions
fn default_environment() -> RunEnvironment {
    RunEnvironment::Sim
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_gpio_line() -> u32 {
    17
}
fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

fn default_still_command() -> String {
    "rpicam-still".to_string()
}
fn default_list_command() -> String {
    "rpicam-hello".to_string()
}
const VC4_TUNING_DIR: &str = "/usr/share/libcamera/ipa/rpi/vc4";
const PISP_TUNING_DIR: &str = "/usr/share/libcamera/ipa/rpi/pisp";

/// Tuning directory for the board described by a device-tree `compatible`
/// value (NUL-separated entries). BCM2712 boards use the PiSP pipeline.
pub fn tuning_dir_for(compatible: &str) -> PathBuf {
    let pisp = compatible
        .split('\0')
        .any(|entry| entry == "brcm,bcm2712" || entry.starts_with("raspberrypi,5"));

    PathBuf::from(if pisp { PISP_TUNING_DIR } else { VC4_TUNING_DIR })
}

fn default_tuning_dir() -> PathBuf {
    let compatible = std::fs::read("/proc/device-tree/compatible")
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    tuning_dir_for(&compatible)
}
fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp/meapis")
}
fn default_capture_timeout_ms() -> u64 {
    1000
}

fn default_max_autofocus_attempts() -> u32 {
    10
}
fn default_settle_delay_ms() -> u64 {
    1000
}
