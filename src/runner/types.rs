use crate::capture::CaptureRecord;
use serde::Serialize;

/// Snapshot reported by [`ProjectRunner::status`](super::ProjectRunner::status)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerStatus {
    /// `sim` or `raspi`
    pub env: String,
    pub active_project: Option<String>,
    /// Capture interval of the active project, in seconds
    pub interval: Option<u64>,
    pub last_capture: Option<CaptureRecord>,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
}
