use crate::error::{MeapisError, Result};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A single digital output line
pub trait OutputLine: Send {
    /// Drive the line high (`true`) or low (`false`)
    fn set_value(&mut self, high: bool) -> Result<()>;

    /// Give the line back to the system
    fn release(&mut self) -> Result<()>;
}

/// Label prefix of the SoC pin controllers carrying the 40-pin header
const HEADER_CHIP_PREFIX: &str = "pinctrl-";

/// A GPIO controller as listed under the sysfs GPIO root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioChip {
    pub label: String,
    /// Sysfs number of the chip's first line
    pub base: u32,
    pub ngpio: u32,
}

/// Controllers listed under `root`, ordered by base
pub fn list_gpio_chips<P: AsRef<Path>>(root: P) -> Result<Vec<GpioChip>> {
    let root = root.as_ref();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut chips = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with("gpiochip") {
            continue;
        }

        let dir = entry.path();
        let read = |name: &str| fs::read_to_string(dir.join(name)).map(|s| s.trim().to_string());
        let chip = match (read("label"), read("base"), read("ngpio")) {
            (Ok(label), Ok(base), Ok(ngpio)) => match (base.parse(), ngpio.parse()) {
                (Ok(base), Ok(ngpio)) => GpioChip { label, base, ngpio },
                _ => {
                    debug!("Skipping {} with unparsable base or ngpio", dir.display());
                    continue;
                }
            },
            _ => {
                debug!("Skipping unreadable {}", dir.display());
                continue;
            }
        };
        chips.push(chip);
    }

    chips.sort_by_key(|chip| chip.base);
    Ok(chips)
}

/// Sysfs number of line `offset` on the selected controller.
///
/// With `chip_label` the controller must carry exactly that label. Otherwise
/// the header pin controller is preferred, then the lowest base. Without any
/// listed controller the offset is already the sysfs number.
pub fn resolve_sysfs_line<P: AsRef<Path>>(
    root: P,
    offset: u32,
    chip_label: Option<&str>,
) -> Result<u32> {
    let chips = list_gpio_chips(root)?;
    if chips.is_empty() {
        debug!("No GPIO chips listed, using line {} as is", offset);
        return Ok(offset);
    }

    let chip = match chip_label {
        Some(label) => chips.iter().find(|chip| chip.label == label).ok_or_else(|| {
            MeapisError::component("light", &format!("No GPIO chip labelled '{}'", label))
        })?,
        None => chips
            .iter()
            .find(|chip| chip.label.starts_with(HEADER_CHIP_PREFIX))
            .unwrap_or(&chips[0]),
    };

    if offset >= chip.ngpio {
        return Err(MeapisError::component(
            "light",
            &format!(
                "GPIO offset {} out of range for chip '{}' ({} lines)",
                offset, chip.label, chip.ngpio
            ),
        ));
    }

    debug!(
        "GPIO offset {} on chip '{}' is sysfs line {}",
        offset,
        chip.label,
        chip.base + offset
    );
    Ok(chip.base + offset)
}

/// GPIO output line driven through the sysfs interface
pub struct SysfsOutputLine {
    root: PathBuf,
    line: u32,
    line_path: PathBuf,
}

impl SysfsOutputLine {
    /// Export line `offset` of the selected controller under `root` and
    /// configure it as an output driven low
    pub fn open<P: AsRef<Path>>(root: P, offset: u32, chip_label: Option<&str>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let line = resolve_sysfs_line(&root, offset, chip_label)?;
        let line_path = root.join(format!("gpio{}", line));

        if !line_path.exists() {
            fs::write(root.join("export"), line.to_string()).map_err(|e| {
                MeapisError::component("light", &format!("Failed to export GPIO {}: {}", line, e))
            })?;
        }

        // "low" selects output direction with an initial low level in one write
        fs::write(line_path.join("direction"), "low").map_err(|e| {
            MeapisError::component(
                "light",
                &format!("Failed to set GPIO {} direction: {}", line, e),
            )
        })?;

        info!("GPIO line {} (offset {}) configured as output", line, offset);

        Ok(Self {
            root,
            line,
            line_path,
        })
    }
}

impl OutputLine for SysfsOutputLine {
    fn set_value(&mut self, high: bool) -> Result<()> {
        let value = if high { "1" } else { "0" };
        fs::write(self.line_path.join("value"), value).map_err(|e| {
            MeapisError::component(
                "light",
                &format!("Failed to set GPIO {} value: {}", self.line, e),
            )
        })?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        fs::write(self.root.join("unexport"), self.line.to_string()).map_err(|e| {
            MeapisError::component(
                "light",
                &format!("Failed to unexport GPIO {}: {}", self.line, e),
            )
        })?;
        debug!("GPIO line {} released", self.line);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SimulatedLineState {
    high: bool,
    transitions: Vec<bool>,
    releases: u32,
}

/// In-memory output line; clones share the same line state
#[derive(Debug, Clone, Default)]
pub struct SimulatedOutputLine {
    state: Arc<Mutex<SimulatedLineState>>,
}

impl SimulatedOutputLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of the line
    pub fn is_high(&self) -> bool {
        self.state.lock().high
    }

    /// Every level written so far, in order
    pub fn transitions(&self) -> Vec<bool> {
        self.state.lock().transitions.clone()
    }

    /// Number of times the line was released
    pub fn release_count(&self) -> u32 {
        self.state.lock().releases
    }
}

impl OutputLine for SimulatedOutputLine {
    fn set_value(&mut self, high: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.high = high;
        state.transitions.push(high);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.state.lock().releases += 1;
        Ok(())
    }
}
