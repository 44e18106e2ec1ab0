use super::controls::CameraConfiguration;
use super::driver::{CameraDriver, CameraDriverFactory, CaptureRequest};
use super::modes::SensorMode;
use super::profile::{ConfigBuilder, ConfigurationProfile};
use super::variant::CameraVariant;
use crate::capture::metadata::{save_json, CaptureMetadata, CaptureRecord};
use crate::error::{CameraError, Result};
use crate::project::Project;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a single capture keeps on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub save: bool,
    pub save_metadata: bool,
    pub filename_postfix: Option<String>,
    /// Replaces both the pictures and metadata directories when set
    pub output_dir: Option<PathBuf>,
}

impl CaptureOptions {
    /// Regular capture into the project's pictures and metadata directories
    pub fn normal() -> Self {
        Self {
            save: true,
            save_metadata: true,
            filename_postfix: None,
            output_dir: None,
        }
    }

    /// Calibration capture saved with a postfix into `dir`
    pub fn diagnostic<S: Into<String>>(postfix: S, dir: PathBuf) -> Self {
        Self {
            save: true,
            save_metadata: true,
            filename_postfix: Some(postfix.into()),
            output_dir: Some(dir),
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::normal()
    }
}

/// One camera bound to a project.
///
/// The device is stopped whenever an operation returns, and released
/// exactly once by [`Camera::close`].
pub struct Camera {
    variant: CameraVariant,
    project: Arc<Project>,
    driver: Box<dyn CameraDriver>,
    bound: Option<CameraConfiguration>,
    modes: Option<Vec<SensorMode>>,
    last_timestamp: Option<DateTime<Utc>>,
    closed: bool,
}

impl Camera {
    /// Open the project's camera through `factory`
    pub fn open(project: Arc<Project>, factory: &dyn CameraDriverFactory) -> Result<Self> {
        let variant = project.variant;
        let driver = factory.open(variant)?;
        info!("Camera {} opened for project '{}'", driver.camera_id(), project.name);

        Ok(Self {
            variant,
            project,
            driver,
            bound: None,
            modes: None,
            last_timestamp: None,
            closed: false,
        })
    }

    pub fn variant(&self) -> CameraVariant {
        self.variant
    }

    pub fn camera_id(&self) -> String {
        self.driver.camera_id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CameraError::Closed {
                camera: self.camera_id(),
            }
            .into());
        }
        Ok(())
    }

    /// Sensor modes, discovered once
    pub async fn sensor_modes(&mut self) -> Result<Vec<SensorMode>> {
        self.ensure_open()?;
        if let Some(modes) = &self.modes {
            return Ok(modes.clone());
        }

        let modes = self.driver.sensor_modes().await?;
        debug!("Discovered {} sensor modes", modes.len());
        self.modes = Some(modes.clone());
        Ok(modes)
    }

    /// Profile builder for this camera's modes
    pub async fn config_builder(&mut self) -> Result<ConfigBuilder> {
        let modes = self.sensor_modes().await?;
        ConfigBuilder::from_modes(self.variant, &modes)
    }

    /// Bind a profile; later captures without an override use it
    pub async fn setup(&mut self, profile: &ConfigurationProfile) -> Result<()> {
        self.ensure_open()?;
        info!("Setting up camera with {} profile", profile.purpose());

        let config = profile.configuration().clone();
        self.driver.configure(&config).await?;
        self.bound = Some(config);
        Ok(())
    }

    /// Take one picture, optionally under a one-off profile.
    ///
    /// Files are written before the capture request is released. The device is
    /// stopped and the bound profile restored on every path.
    pub async fn take_picture(
        &mut self,
        profile: Option<&ConfigurationProfile>,
        options: CaptureOptions,
    ) -> Result<CaptureMetadata> {
        self.ensure_open()?;
        info!("Taking picture");

        if let Some(profile) = profile {
            debug!("Switching to {} profile for this capture", profile.purpose());
            self.driver.configure(profile.configuration()).await?;
        }

        let result = self.capture(&options).await;

        if let Err(e) = self.driver.stop().await {
            if result.is_ok() {
                return Err(e);
            }
            warn!("Failed to stop camera after failed capture: {}", e);
        }

        if profile.is_some() {
            if let Some(bound) = &self.bound {
                if let Err(e) = self.driver.configure(bound).await {
                    if result.is_ok() {
                        return Err(e);
                    }
                    warn!("Failed to restore bound profile: {}", e);
                }
            }
        }

        result
    }

    async fn capture(&mut self, options: &CaptureOptions) -> Result<CaptureMetadata> {
        self.driver.start().await?;

        let timestamp_utc = self.next_timestamp();
        let filename = self
            .project
            .picture_filename(options.filename_postfix.as_deref(), timestamp_utc);

        let mut request = self
            .driver
            .capture_request(&self.project.image_format)
            .await?;

        let record = CaptureRecord {
            project: self.project.name.clone(),
            path: options
                .output_dir
                .as_ref()
                .unwrap_or(&self.project.pictures_dir)
                .join(format!("{}.{}", filename, self.project.image_format)),
            filename,
            timestamp_utc,
            camera: self.driver.camera_id(),
        };

        let persisted = self.persist(&*request, &record, options).await;
        let released = request.release().await;
        let metadata = persisted?;
        released?;

        Ok(metadata)
    }

    /// Capture time, at least one millisecond after the previous capture so
    /// filenames never collide
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            let floor = last + chrono::Duration::milliseconds(1);
            if now < floor {
                now = floor;
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    async fn persist(
        &self,
        request: &dyn CaptureRequest,
        record: &CaptureRecord,
        options: &CaptureOptions,
    ) -> Result<CaptureMetadata> {
        if options.save {
            request.save(&record.path).await?;
            debug!("Saved picture {}", record.path.display());
        }

        let driver = request.metadata().clone();
        if options.save_metadata {
            let dir = options
                .output_dir
                .as_ref()
                .unwrap_or(&self.project.metadata_dir);
            save_json(&driver, &dir.join(format!("{}-metadata.json", record.filename))).await?;
        }

        Ok(CaptureMetadata {
            record: record.clone(),
            driver,
        })
    }

    /// Run one autofocus cycle under the bound profile
    pub async fn autofocus(&mut self) -> Result<bool> {
        self.ensure_open()?;
        info!("Autofocus");

        self.driver.start().await?;
        let result = self.driver.autofocus_cycle().await;

        if let Err(e) = self.driver.stop().await {
            if result.is_ok() {
                return Err(e);
            }
            warn!("Failed to stop camera after failed autofocus: {}", e);
        }

        let success = result?;
        debug!(
            "Autofocus complete ({})",
            if success { "success" } else { "failed" }
        );
        Ok(success)
    }

    /// Release the device; later calls do nothing
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.driver.close().await {
            error!("Failed to close camera {}: {}", self.camera_id(), e);
        }
    }
}
