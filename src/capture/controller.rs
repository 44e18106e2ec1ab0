use super::calibration::CalibrationPipeline;
use super::metadata::{save_json, sidecar_path, CaptureMetadata};
use crate::camera::{Camera, CameraDriverFactory, CaptureOptions, ConfigurationProfile};
use crate::config::CalibrationConfig;
use crate::error::{CameraError, Result};
use crate::light::LightController;
use crate::project::{Project, ProjectStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Owns a project's camera and its calibrated picture profile
pub struct CaptureController {
    project: Arc<Project>,
    light: Arc<LightController>,
    camera: Mutex<Option<Camera>>,
    picture: ConfigurationProfile,
}

impl CaptureController {
    /// Open the camera, calibrating first when the project has no saved
    /// settings. The camera is released again if any step fails.
    pub async fn open(
        project: Arc<Project>,
        store: &ProjectStore,
        cameras: &dyn CameraDriverFactory,
        light: Arc<LightController>,
        calibration: &CalibrationConfig,
    ) -> Result<Self> {
        let mut camera = Camera::open(Arc::clone(&project), cameras)?;

        match Self::prepare(&mut camera, &project, store, &light, calibration).await {
            Ok(picture) => {
                info!(
                    "Capture controller ready for project '{}' on {}",
                    project.name,
                    camera.camera_id()
                );
                Ok(Self {
                    project,
                    light,
                    camera: Mutex::new(Some(camera)),
                    picture,
                })
            }
            Err(e) => {
                error!("Failed to prepare camera for '{}': {}", project.name, e);
                camera.close().await;
                Err(e)
            }
        }
    }

    async fn prepare(
        camera: &mut Camera,
        project: &Project,
        store: &ProjectStore,
        light: &LightController,
        calibration: &CalibrationConfig,
    ) -> Result<ConfigurationProfile> {
        let mut picture = camera.config_builder().await?.picture();

        let settings = match store.load_calibration(project).await? {
            Some(settings) => {
                info!("Using saved camera settings");
                settings
            }
            None => {
                let settings = CalibrationPipeline::new(camera, light, project, calibration)
                    .run(&mut picture)
                    .await?;
                store.save_calibration(project, &settings).await?;
                info!("Computed and saved new camera settings");
                settings
            }
        };

        settings.apply_to(&mut picture);
        camera.setup(&picture).await?;
        Ok(picture)
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    pub fn picture_profile(&self) -> &ConfigurationProfile {
        &self.picture
    }

    /// Take one picture under the picture profile, lit when the project
    /// uses the light, and write its record sidecar
    pub async fn take_picture(&self) -> Result<CaptureMetadata> {
        let mut guard = self.camera.lock().await;
        let camera = guard.as_mut().ok_or_else(|| CameraError::Closed {
            camera: self.project.name.clone(),
        })?;

        if self.project.use_light {
            self.light.turn_on();
        }

        let result = camera.take_picture(None, CaptureOptions::normal()).await;

        if self.project.use_light {
            self.light.turn_off();
        }

        let metadata = result?;
        save_json(&metadata.record, &sidecar_path(&metadata.record.path)).await?;
        Ok(metadata)
    }

    /// Release the camera; later calls do nothing
    pub async fn close(&self) {
        let camera = self.camera.lock().await.take();
        if let Some(mut camera) = camera {
            camera.close().await;
            info!("Capture controller for '{}' closed", self.project.name);
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.camera.lock().await.is_none()
    }
}
