use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeapisError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Project not found: {name}")]
    NotFound { name: String },

    #[error("Invalid project name '{name}': {reason}")]
    InvalidProjectName { name: String, reason: String },

    #[error("Invalid project '{name}': {reason}")]
    InvalidProject { name: String, reason: String },

    #[error("No active project")]
    NoActiveProject,

    #[error("Calibration failed for project '{project}': {reason}")]
    Calibration { project: String, reason: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Camera and camera-driver failures
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No usable sensor mode: {details}")]
    ModeSelection { details: String },

    #[error("Invalid focus window: {details}")]
    FocusWindow { details: String },

    #[error("Unknown camera variant: {value}")]
    UnknownVariant { value: u8 },

    #[error("Camera driver failure: {details}")]
    Driver { details: String },

    #[error("Camera {camera} is closed")]
    Closed { camera: String },

    #[error("Capture metadata is missing {key}")]
    MissingMetadata { key: String },
}

impl MeapisError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn calibration<P: Into<String>, R: Into<String>>(project: P, reason: R) -> Self {
        Self::Calibration {
            project: project.into(),
            reason: reason.into(),
        }
    }

    /// True for a missing project configuration
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl CameraError {
    pub fn driver<S: Into<String>>(details: S) -> Self {
        Self::Driver {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MeapisError>;
