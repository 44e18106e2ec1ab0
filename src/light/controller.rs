use super::line::OutputLine;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Exclusive on/off control of the capture light.
///
/// Every operation runs under one lock. Once closed, switching requests are
/// ignored and the underlying line has been released exactly once.
pub struct LightController {
    inner: Mutex<LightState>,
}

struct LightState {
    line: Option<Box<dyn OutputLine>>,
    closed: bool,
}

impl LightController {
    pub fn new(line: Box<dyn OutputLine>) -> Self {
        Self {
            inner: Mutex::new(LightState {
                line: Some(line),
                closed: false,
            }),
        }
    }

    pub fn turn_on(&self) {
        self.switch(true);
    }

    pub fn turn_off(&self) {
        self.switch(false);
    }

    fn switch(&self, high: bool) {
        let mut state = self.inner.lock();
        if state.closed {
            debug!("Light is closed, ignoring switch to {}", on_off(high));
            return;
        }

        if let Some(line) = state.line.as_mut() {
            match line.set_value(high) {
                Ok(()) => debug!("Light {}", on_off(high)),
                Err(e) => warn!("Failed to switch light {}: {}", on_off(high), e),
            }
        }
    }

    /// Drive the output low and release it. Safe to call any number of times.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }

        if let Some(mut line) = state.line.take() {
            if let Err(e) = line.set_value(false) {
                warn!("Failed to drive light low before release: {}", e);
            }
            if let Err(e) = line.release() {
                error!("Failed to release light line: {}", e);
            }
        }

        state.closed = true;
        info!("Light controller closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

fn on_off(high: bool) -> &'static str {
    if high {
        "on"
    } else {
        "off"
    }
}
