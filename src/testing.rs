//! Scriptable camera driver and recording light line shared by the unit tests

use crate::camera::{
    CameraConfiguration, CameraDriver, CameraDriverFactory, CameraVariant, CaptureRequest,
    DriverMetadata, SensorMode, SimulatedDriver,
};
use crate::error::{CameraError, Result};
use crate::light::OutputLine;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct ProbeState {
    opened: u32,
    closed: u32,
    live: u32,
    max_live: u32,
    fail_open: bool,
    autofocus_script: VecDeque<bool>,
    autofocus_calls: u32,
    failing_captures: u32,
    captures: u32,
    strip_gain: bool,
    capture_delay: Duration,
    events: Vec<String>,
}

/// Shared view into every driver a [`ScriptedFactory`] opened
#[derive(Debug, Clone, Default)]
pub struct DriverProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl DriverProbe {
    /// Outcomes of upcoming autofocus cycles; success once exhausted
    pub fn script_autofocus(&self, outcomes: &[bool]) {
        self.state.lock().autofocus_script.extend(outcomes);
    }

    pub fn fail_next_captures(&self, count: u32) {
        self.state.lock().failing_captures = count;
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Make every later capture take this long
    pub fn delay_captures(&self, delay: Duration) {
        self.state.lock().capture_delay = delay;
    }

    /// Drop `AnalogueGain` from every capture's metadata
    pub fn strip_gain(&self, strip: bool) {
        self.state.lock().strip_gain = strip;
    }

    pub fn opened(&self) -> u32 {
        self.state.lock().opened
    }

    pub fn closed(&self) -> u32 {
        self.state.lock().closed
    }

    pub fn live(&self) -> u32 {
        self.state.lock().live
    }

    pub fn max_live(&self) -> u32 {
        self.state.lock().max_live
    }

    pub fn captures(&self) -> u32 {
        self.state.lock().captures
    }

    pub fn autofocus_calls(&self) -> u32 {
        self.state.lock().autofocus_calls
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    fn record(&self, event: &str) {
        self.state.lock().events.push(event.to_string());
    }
}

/// Factory handing out [`ScriptedDriver`]s wired to one probe
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    pub probe: DriverProbe,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraDriverFactory for ScriptedFactory {
    fn open(&self, variant: CameraVariant) -> Result<Box<dyn CameraDriver>> {
        {
            let mut state = self.probe.state.lock();
            if state.fail_open {
                return Err(CameraError::driver("camera busy").into());
            }
            state.opened += 1;
            state.live += 1;
            state.max_live = state.max_live.max(state.live);
            state.events.push("open".to_string());
        }

        Ok(Box::new(ScriptedDriver {
            inner: SimulatedDriver::new(variant),
            probe: self.probe.clone(),
        }))
    }
}

/// Simulated driver with scripted failures and an event log
pub struct ScriptedDriver {
    inner: SimulatedDriver,
    probe: DriverProbe,
}

#[async_trait::async_trait]
impl CameraDriver for ScriptedDriver {
    fn camera_id(&self) -> String {
        self.inner.camera_id()
    }

    async fn sensor_modes(&mut self) -> Result<Vec<SensorMode>> {
        self.inner.sensor_modes().await
    }

    async fn configure(&mut self, config: &CameraConfiguration) -> Result<()> {
        self.probe.record("configure");
        self.inner.configure(config).await
    }

    async fn start(&mut self) -> Result<()> {
        self.probe.record("start");
        self.inner.start().await
    }

    async fn stop(&mut self) -> Result<()> {
        self.probe.record("stop");
        self.inner.stop().await
    }

    async fn capture_request(&mut self, format: &str) -> Result<Box<dyn CaptureRequest>> {
        let (fail, strip_gain, delay) = {
            let mut state = self.probe.state.lock();
            let fail = state.failing_captures > 0;
            if fail {
                state.failing_captures -= 1;
            } else {
                state.captures += 1;
            }
            (fail, state.strip_gain, state.capture_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if fail {
            self.probe.record("capture-failed");
            return Err(CameraError::driver("sensor timeout").into());
        }

        self.probe.record("capture");
        let inner = self.inner.capture_request(format).await?;
        let mut metadata = inner.metadata().clone();
        if strip_gain {
            metadata.analogue_gain = None;
        }

        Ok(Box::new(ScriptedRequest {
            inner,
            metadata,
            probe: self.probe.clone(),
        }))
    }

    async fn autofocus_cycle(&mut self) -> Result<bool> {
        let outcome = {
            let mut state = self.probe.state.lock();
            state.autofocus_calls += 1;
            state.autofocus_script.pop_front()
        };
        self.probe.record("autofocus");

        match outcome {
            Some(false) => {
                if !self.inner.is_running() {
                    return Err(CameraError::driver("autofocus while stopped").into());
                }
                Ok(false)
            }
            _ => self.inner.autofocus_cycle().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        {
            let mut state = self.probe.state.lock();
            state.closed += 1;
            state.live = state.live.saturating_sub(1);
            state.events.push("close".to_string());
        }
        self.inner.close().await
    }
}

struct ScriptedRequest {
    inner: Box<dyn CaptureRequest>,
    metadata: DriverMetadata,
    probe: DriverProbe,
}

#[async_trait::async_trait]
impl CaptureRequest for ScriptedRequest {
    async fn save(&self, path: &Path) -> Result<()> {
        self.probe.record("save");
        self.inner.save(path).await
    }

    fn metadata(&self) -> &DriverMetadata {
        &self.metadata
    }

    async fn release(&mut self) -> Result<()> {
        self.probe.record("release");
        self.inner.release().await
    }
}

/// Output line logging its switching into a probe's event log
pub struct RecordingLine {
    probe: DriverProbe,
}

impl RecordingLine {
    pub fn new(probe: &DriverProbe) -> Self {
        Self {
            probe: probe.clone(),
        }
    }
}

impl OutputLine for RecordingLine {
    fn set_value(&mut self, high: bool) -> Result<()> {
        self.probe
            .record(if high { "light-on" } else { "light-off" });
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.probe.record("light-release");
        Ok(())
    }
}
