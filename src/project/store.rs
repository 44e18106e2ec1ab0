use super::descriptor::{host_name, Project, ProjectDescriptor, METADATA_DIR, PICTURES_DIR, SETUP_DIR};
use super::settings::CalibrationSettings;
use crate::error::{MeapisError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const PROJECTS_DIR: &str = "projects";
const DESCRIPTOR_FILE: &str = "config.json";
const ACTIVE_MARKER_FILE: &str = "current.txt";

/// Filesystem persistence of projects, calibration records and the
/// active-project marker
#[derive(Debug, Clone)]
pub struct ProjectStore {
    projects_dir: PathBuf,
    host: String,
}

impl ProjectStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            projects_dir: data_dir.as_ref().join(PROJECTS_DIR),
            host: host_name(),
        }
    }

    /// Override the host name used in picture filenames
    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    pub fn project_dir(&self, name: &str) -> PathBuf {
        self.projects_dir.join(name)
    }

    fn marker_path(&self) -> PathBuf {
        self.projects_dir.join(ACTIVE_MARKER_FILE)
    }

    /// Names of all directories carrying a descriptor, sorted
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.projects_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            if fs::try_exists(entry.path().join(DESCRIPTOR_FILE)).await? {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Read a project descriptor and prepare its output directories
    pub async fn load_project(&self, name: &str) -> Result<Project> {
        let root = self.project_dir(name);
        let descriptor_path = root.join(DESCRIPTOR_FILE);

        let raw = match fs::read(&descriptor_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MeapisError::NotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let descriptor: ProjectDescriptor =
            serde_json::from_slice(&raw).map_err(|e| MeapisError::InvalidProject {
                name: name.to_string(),
                reason: format!("{}: {}", descriptor_path.display(), e),
            })?;

        let project = Project::from_descriptor(name, descriptor, &root, self.host.clone())?;

        for dir in [PICTURES_DIR, METADATA_DIR, SETUP_DIR] {
            fs::create_dir_all(root.join(dir)).await?;
        }

        info!(
            "Loaded project '{}' (camera {}, every {}s, {})",
            project.name, project.variant, project.interval_secs, project.image_format
        );
        Ok(project)
    }

    /// Write a descriptor, creating the project directory
    pub async fn create_project(&self, name: &str, descriptor: &ProjectDescriptor) -> Result<()> {
        let root = self.project_dir(name);
        fs::create_dir_all(&root).await?;
        fs::write(
            root.join(DESCRIPTOR_FILE),
            serde_json::to_vec_pretty(descriptor)?,
        )
        .await?;

        debug!("Created project '{}' at {}", name, root.display());
        Ok(())
    }

    pub async fn load_calibration(&self, project: &Project) -> Result<Option<CalibrationSettings>> {
        let path = project.settings_path();
        match fs::read(&path).await {
            Ok(raw) => {
                let settings = serde_json::from_slice(&raw)?;
                info!("Loaded camera settings from {}", path.display());
                Ok(Some(settings))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_calibration(
        &self,
        project: &Project,
        settings: &CalibrationSettings,
    ) -> Result<()> {
        let path = project.settings_path();
        fs::write(&path, serde_json::to_vec_pretty(settings)?).await?;
        info!("Saved camera settings to {}", path.display());
        Ok(())
    }

    /// Forget a project's calibration so the next start recalibrates
    pub async fn clear_calibration(&self, name: &str) -> Result<bool> {
        let path = self.project_dir(name).join(super::descriptor::SETTINGS_FILE);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Cleared camera settings of project '{}'", name);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Project recorded as active, if any
    pub async fn read_active_marker(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.marker_path()).await {
            Ok(text) => {
                let name = text.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_active_marker(&self, name: Option<&str>) -> Result<()> {
        fs::create_dir_all(&self.projects_dir).await?;
        if let Err(e) = fs::write(self.marker_path(), name.unwrap_or("")).await {
            warn!("Failed to write active project marker: {}", e);
            return Err(e.into());
        }
        debug!("Active project marker set to {:?}", name);
        Ok(())
    }
}
