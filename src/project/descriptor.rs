use crate::camera::CameraVariant;
use crate::error::{MeapisError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PICTURES_DIR: &str = "pictures";
pub const METADATA_DIR: &str = "metadata";
pub const SETUP_DIR: &str = "setup";
pub const SETTINGS_FILE: &str = "camera_settings.json";

/// Contents of a project's `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    /// 0 = Owlsight, 1 = V3
    #[serde(default)]
    pub camera: u8,

    /// Output filename stem; the project name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Seconds between captures
    #[serde(default = "default_interval")]
    pub interval: u64,

    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_use_light")]
    pub use_light: bool,
}

impl Default for ProjectDescriptor {
    fn default() -> Self {
        Self {
            camera: 0,
            filename: None,
            interval: default_interval(),
            format: default_format(),
            use_light: default_use_light(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_format() -> String {
    "jpg".to_string()
}

fn default_use_light() -> bool {
    true
}

/// A loaded project; immutable while active
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub variant: CameraVariant,
    pub filename_stem: String,
    pub interval_secs: u64,
    pub image_format: String,
    pub use_light: bool,
    /// Host name embedded in picture filenames
    pub host: String,
    pub root: PathBuf,
    pub pictures_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub setup_dir: PathBuf,
}

impl Project {
    /// Resolve a descriptor into a project rooted at `root`
    pub fn from_descriptor(
        name: &str,
        descriptor: ProjectDescriptor,
        root: &Path,
        host: String,
    ) -> Result<Self> {
        let invalid = |reason: String| MeapisError::InvalidProject {
            name: name.to_string(),
            reason,
        };

        let variant =
            CameraVariant::try_from(descriptor.camera).map_err(|e| invalid(e.to_string()))?;

        if descriptor.interval == 0 {
            return Err(invalid("interval must be greater than 0".to_string()));
        }

        let format = descriptor.format.trim().to_lowercase();
        if format.is_empty() {
            return Err(invalid("format must not be empty".to_string()));
        }

        let filename_stem = descriptor
            .filename
            .filter(|stem| !stem.trim().is_empty())
            .unwrap_or_else(|| name.to_string());

        Ok(Self {
            name: name.to_string(),
            variant,
            filename_stem,
            interval_secs: descriptor.interval,
            image_format: format,
            use_light: descriptor.use_light,
            host,
            root: root.to_path_buf(),
            pictures_dir: root.join(PICTURES_DIR),
            metadata_dir: root.join(METADATA_DIR),
            setup_dir: root.join(SETUP_DIR),
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// `<stem>-<host>-<camera>-<UTC timestamp>[-<postfix>]`, without extension
    pub fn picture_filename(&self, postfix: Option<&str>, at: DateTime<Utc>) -> String {
        let mut filename = format!(
            "{}-{}-{}-{}",
            self.filename_stem,
            self.host,
            self.variant.index(),
            at.format("%Y-%m-%d_%H-%M-%S-%3f")
        );

        if let Some(postfix) = postfix.filter(|p| !p.is_empty()) {
            filename.push('-');
            filename.push_str(postfix);
        }

        filename
    }
}

/// Name of this machine
pub fn host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes and gethostname NUL-terminates on success
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    match std::str::from_utf8(&buf[..end]) {
        Ok(name) if !name.is_empty() => name.to_string(),
        _ => "localhost".to_string(),
    }
}
