use crate::camera::{CameraDriverFactory, RpicamCameraFactory, SimulatedCameraFactory};
use crate::capture::{CaptureController, CaptureRecord};
use crate::config::{CalibrationConfig, MeapisConfig, RunEnvironment};
use crate::error::Result;
use crate::light::{LightController, SimulatedOutputLine, SysfsOutputLine};
use crate::project::{Project, ProjectStore};
use crate::scheduler::CaptureScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Longest wait for the capture job to wind down during shutdown
const STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Holds at most one active project and drives its capture schedule.
///
/// `transition` serializes start, stop and shutdown and may be held through
/// a calibration. `state` is only ever held briefly, so status queries and
/// manual captures never wait on a project coming up.
pub struct ProjectRunner {
    pub(super) environment: RunEnvironment,
    pub(super) store: ProjectStore,
    pub(super) cameras: Arc<dyn CameraDriverFactory>,
    pub(super) light: Arc<LightController>,
    pub(super) calibration: CalibrationConfig,
    pub(super) scheduler: CaptureScheduler,
    pub(super) transition: Mutex<()>,
    pub(super) state: Mutex<RunnerState>,
    pub(super) stop_timeout: Duration,
    pub(super) last_capture: Arc<parking_lot::Mutex<Option<CaptureRecord>>>,
}

#[derive(Default)]
pub(super) struct RunnerState {
    pub(super) active: Option<ActiveProject>,
}

pub(super) struct ActiveProject {
    pub(super) project: Arc<Project>,
    pub(super) controller: Arc<CaptureController>,
}

impl ProjectRunner {
    /// Create an idle runner over the given collaborators
    pub fn new(
        environment: RunEnvironment,
        store: ProjectStore,
        cameras: Arc<dyn CameraDriverFactory>,
        light: Arc<LightController>,
        calibration: CalibrationConfig,
    ) -> Self {
        Self {
            environment,
            store,
            cameras,
            light,
            calibration,
            scheduler: CaptureScheduler::new(),
            transition: Mutex::new(()),
            state: Mutex::new(RunnerState::default()),
            stop_timeout: STOP_TIMEOUT,
            last_capture: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Wire up simulated or Raspberry Pi hardware as configured
    pub fn from_config(config: &MeapisConfig) -> Result<Self> {
        let environment = config.system.environment;
        info!("Creating project runner for the {} environment", environment.tag());

        let (cameras, light): (Arc<dyn CameraDriverFactory>, LightController) = match environment
        {
            RunEnvironment::Sim => (
                Arc::new(SimulatedCameraFactory),
                LightController::new(Box::new(SimulatedOutputLine::new())),
            ),
            RunEnvironment::Raspi => (
                Arc::new(RpicamCameraFactory::new(config.camera.clone())),
                LightController::new(Box::new(SysfsOutputLine::open(
                    &config.light.sysfs_root,
                    config.light.gpio_line,
                    config.light.chip_label.as_deref(),
                )?)),
            ),
        };

        Ok(Self::new(
            environment,
            ProjectStore::new(&config.system.data_dir),
            cameras,
            Arc::new(light),
            config.calibration.clone(),
        ))
    }

    /// Bound the wait for the capture job during shutdown
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn light(&self) -> &Arc<LightController> {
        &self.light
    }

    /// Start the requested project, or resume the one named by the
    /// active-project marker.
    ///
    /// Resume failures are logged and leave the runner idle; a failure to
    /// start an explicitly requested project is returned.
    pub async fn start_initial(&self, requested: Option<&str>) -> Result<()> {
        if let Some(name) = requested {
            info!("Starting requested project: {}", name);
            return self.start(name).await;
        }

        let name = match self.store.read_active_marker().await {
            Ok(Some(name)) => name,
            Ok(None) => {
                info!("No initial project to start");
                return Ok(());
            }
            Err(e) => {
                warn!("Failed to read active project marker: {}", e);
                return Ok(());
            }
        };

        info!("Starting initial project: {}", name);
        if let Err(e) = self.start(&name).await {
            if e.is_not_found() {
                warn!("Initial project '{}' has no configuration, staying idle", name);
            } else {
                warn!("Failed to resume project '{}': {}", name, e);
            }
        }
        Ok(())
    }
}
