use super::ProjectRunner;
use tokio::time::timeout;
use tracing::{error, info};

impl ProjectRunner {
    /// Stop the active project and release the light.
    ///
    /// The active-project marker is kept so the project resumes on the next
    /// start. Waiting for the capture job is bounded, but the camera of the
    /// active project is always closed and the light is always released.
    /// Returns the process exit code.
    pub async fn shutdown(&self) -> i32 {
        info!("Beginning graceful shutdown");
        let mut exit_code = 0;

        match timeout(self.stop_timeout, self.transition.lock()).await {
            Ok(_transition) => match self.take_active().await {
                Some(active) => {
                    if timeout(self.stop_timeout, self.scheduler.cancel())
                        .await
                        .is_err()
                    {
                        error!(
                            "Capture job did not stop within {:?}",
                            self.stop_timeout
                        );
                        exit_code = 1;
                    }

                    // Waits for an in-flight capture to give the camera back
                    active.controller.close().await;
                    info!("Project '{}' stopped", active.project.name);
                }
                None => info!("No active project"),
            },
            Err(_) => {
                error!(
                    "A project start or stop was still running after {:?}",
                    self.stop_timeout
                );
                exit_code = 1;
            }
        }

        self.light.close();

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        exit_code
    }
}
