use super::{ProjectRunner, RunnerStatus};

impl ProjectRunner {
    pub async fn status(&self) -> RunnerStatus {
        let state = self.state.lock().await;
        let active = state.active.as_ref();

        RunnerStatus {
            env: self.environment.tag().to_string(),
            active_project: active.map(|a| a.project.name.clone()),
            interval: active.map(|a| a.project.interval_secs),
            last_capture: self.last_capture.lock().clone(),
        }
    }

    /// Name of the active project, if any
    pub async fn active_project(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .active
            .as_ref()
            .map(|a| a.project.name.clone())
    }
}
