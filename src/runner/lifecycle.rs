use super::orchestrator::ActiveProject;
use super::ProjectRunner;
use crate::capture::{CaptureController, CaptureMetadata};
use crate::error::{MeapisError, Result};
use crate::project::validate_project_name;
use std::sync::Arc;
use tracing::{error, info, warn};

impl ProjectRunner {
    /// Make `name` the active project.
    ///
    /// A missing or invalid project changes nothing. Otherwise the current
    /// project is stopped first, and if the new one cannot be brought up the
    /// runner is left idle. The runner reads as idle while the new project
    /// calibrates.
    pub async fn start(&self, name: &str) -> Result<()> {
        let name = validate_project_name(name)?;
        let project = Arc::new(self.store.load_project(&name).await?);

        let _transition = self.transition.lock().await;
        if let Some(current) = self.active_project().await {
            info!("Stopping project '{}' to start '{}'", current, name);
        }
        self.stop_active().await;

        let controller = CaptureController::open(
            Arc::clone(&project),
            &self.store,
            self.cameras.as_ref(),
            Arc::clone(&self.light),
            &self.calibration,
        )
        .await
        .map_err(|e| {
            error!("Failed to start project '{}': {}", name, e);
            e
        })?;
        let controller = Arc::new(controller);

        let job_controller = Arc::clone(&controller);
        let last_capture = Arc::clone(&self.last_capture);
        let scheduled = self
            .scheduler
            .schedule(project.interval(), true, move || {
                let controller = Arc::clone(&job_controller);
                let last_capture = Arc::clone(&last_capture);
                async move {
                    let metadata = controller.take_picture().await?;
                    info!("Captured {}", metadata.record.path.display());
                    *last_capture.lock() = Some(metadata.record);
                    Ok(())
                }
            })
            .await;

        if let Err(e) = scheduled {
            error!("Failed to schedule captures for '{}': {}", name, e);
            controller.close().await;
            return Err(e);
        }

        self.state.lock().await.active = Some(ActiveProject {
            project: Arc::clone(&project),
            controller,
        });

        if let Err(e) = self.store.write_active_marker(Some(&name)).await {
            warn!("Project '{}' started but the marker was not saved: {}", name, e);
        }

        info!(
            "Project '{}' started, capturing every {}s",
            name, project.interval_secs
        );
        Ok(())
    }

    /// Stop the active project. Does nothing when idle.
    ///
    /// The active-project marker is kept, so the project is resumed on the
    /// next boot.
    pub async fn stop(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        self.stop_active().await;
        Ok(())
    }

    /// Take the active project out of the state, cancel its schedule, then
    /// release the camera. Returns whether a project was active. Callers
    /// hold the transition lock.
    pub(super) async fn stop_active(&self) -> bool {
        let Some(active) = self.take_active().await else {
            return false;
        };

        self.scheduler.cancel().await;
        active.controller.close().await;

        info!("Project '{}' stopped", active.project.name);
        true
    }

    pub(super) async fn take_active(&self) -> Option<ActiveProject> {
        self.state.lock().await.active.take()
    }

    /// Take one picture right now with the active project's camera
    pub async fn capture_now(&self) -> Result<CaptureMetadata> {
        let controller = {
            let state = self.state.lock().await;
            state
                .active
                .as_ref()
                .map(|active| Arc::clone(&active.controller))
                .ok_or(MeapisError::NoActiveProject)?
        };

        let metadata = controller.take_picture().await?;
        *self.last_capture.lock() = Some(metadata.record.clone());
        Ok(metadata)
    }

    /// Names of all configured projects
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        self.store.list_projects().await
    }
}
