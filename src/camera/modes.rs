use super::controls::{Rectangle, Size};
use crate::error::CameraError;
use serde::{Deserialize, Serialize};

/// Modes this wide are video-oriented binned modes, unsuitable for stills
pub const EXCLUDED_MODE_WIDTH: u32 = 1920;

/// One sensor readout mode as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorMode {
    pub format: String,
    pub size: Size,
    pub bit_depth: u32,
    pub crop_limits: Rectangle,
}

fn still_modes(modes: &[SensorMode]) -> impl Iterator<Item = &SensorMode> {
    modes
        .iter()
        .filter(|mode| mode.size.width != EXCLUDED_MODE_WIDTH)
}

/// Mode with the largest pixel area
pub fn largest_mode(modes: &[SensorMode]) -> Result<&SensorMode, CameraError> {
    still_modes(modes)
        .max_by_key(|mode| mode.size.area())
        .ok_or_else(|| CameraError::ModeSelection {
            details: format!("none of {} sensor modes is usable for stills", modes.len()),
        })
}

/// Mode with the smallest pixel area
pub fn smallest_mode(modes: &[SensorMode]) -> Result<&SensorMode, CameraError> {
    still_modes(modes)
        .min_by_key(|mode| mode.size.area())
        .ok_or_else(|| CameraError::ModeSelection {
            details: format!("none of {} sensor modes is usable for stills", modes.len()),
        })
}

/// Centered square window, as wide as the mode is high, in crop-limit coordinates.
///
/// The window must sit symmetrically inside the crop limits on both axes;
/// anything else means the mode table is inconsistent.
pub fn central_focus_area(mode: &SensorMode) -> Result<Rectangle, CameraError> {
    let width = mode.size.width as i64;
    let height = mode.size.height as i64;
    let limit_width = mode.crop_limits.width as i64;
    let limit_height = mode.crop_limits.height as i64;

    let min_x = (limit_width - width) / 2;
    let min_y = (limit_height - height) / 2;
    let square_x = min_x + (width - height) / 2;

    if square_x < 0 || min_y < 0 {
        return Err(CameraError::FocusWindow {
            details: format!(
                "mode {}x{} does not fit crop limits {}x{}",
                width, height, limit_width, limit_height
            ),
        });
    }

    let crop = Rectangle::new(
        square_x as u32,
        min_y as u32,
        mode.size.height,
        mode.size.height,
    );

    if crop.x as i64 * 2 + crop.width as i64 != limit_width {
        return Err(CameraError::FocusWindow {
            details: format!(
                "crop width {} at x={} is not centered in sensor width {}",
                crop.width, crop.x, limit_width
            ),
        });
    }

    if crop.y as i64 * 2 + crop.height as i64 != limit_height {
        return Err(CameraError::FocusWindow {
            details: format!(
                "crop height {} at y={} is not centered in sensor height {}",
                crop.height, crop.y, limit_height
            ),
        });
    }

    if crop.width != crop.height {
        return Err(CameraError::FocusWindow {
            details: format!("crop {}x{} is not square", crop.width, crop.height),
        });
    }

    Ok(crop)
}
