mod lifecycle;
mod orchestrator;
mod runtime;
mod shutdown;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::ProjectRunner;
pub use types::{RunnerStatus, ShutdownReason};
