mod descriptor;
mod naming;
mod settings;
mod store;

pub use descriptor::{host_name, Project, ProjectDescriptor};
pub use naming::{normalize_project_name, validate_project_name};
pub use settings::CalibrationSettings;
pub use store::ProjectStore;
