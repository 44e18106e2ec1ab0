use crate::camera::{Camera, CaptureOptions, ConfigurationProfile, Control};
use crate::config::CalibrationConfig;
use crate::error::{CameraError, MeapisError, Result};
use crate::light::LightController;
use crate::project::{CalibrationSettings, Project};
use std::time::Duration;
use tracing::{info, warn};

const FOCUS_POSTFIX: &str = "focus";
const EXPOSURE_POSTFIX: &str = "exposure";
/// Successful autofocus attempts; the lens position of the last one is kept
const FOCUS_PASSES: u32 = 2;

/// One-shot derivation of a project's lens position, gain and exposure time.
///
/// Diagnostic captures land in the project's setup directory. The light is
/// switched on for the whole procedure and off again on every exit path.
pub struct CalibrationPipeline<'a> {
    camera: &'a mut Camera,
    light: &'a LightController,
    project: &'a Project,
    config: &'a CalibrationConfig,
}

impl<'a> CalibrationPipeline<'a> {
    pub fn new(
        camera: &'a mut Camera,
        light: &'a LightController,
        project: &'a Project,
        config: &'a CalibrationConfig,
    ) -> Self {
        Self {
            camera,
            light,
            project,
            config,
        }
    }

    /// Calibrate, leaving the derived settings applied to `picture`
    pub async fn run(&mut self, picture: &mut ConfigurationProfile) -> Result<CalibrationSettings> {
        info!("Calibrating camera for project '{}'", self.project.name);

        self.light.turn_on();
        let result = self.calibrate(picture).await;
        self.light.turn_off();

        result.map_err(|e| match e {
            MeapisError::Calibration { .. } => e,
            other => MeapisError::calibration(&self.project.name, other.to_string()),
        })
    }

    async fn calibrate(&mut self, picture: &mut ConfigurationProfile) -> Result<CalibrationSettings> {
        let builder = self.camera.config_builder().await?;
        let focus = builder.focus()?;
        let mut exposure = builder.exposure()?;

        self.camera.setup(&focus).await?;

        let mut lens_position = 0.0;
        for pass in 1..=FOCUS_PASSES {
            lens_position = self.auto_focus(&focus, pass).await?;
        }
        info!("Autofocus complete, LensPosition: {}", lens_position);

        exposure.set_control(Control::LensPosition, lens_position);
        picture.set_control(Control::LensPosition, lens_position);

        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        let metadata = self
            .camera
            .take_picture(
                Some(&exposure),
                CaptureOptions::diagnostic(EXPOSURE_POSTFIX, self.project.setup_dir.clone()),
            )
            .await?;

        let analogue_gain = metadata
            .analogue_gain()
            .ok_or_else(|| missing("AnalogueGain"))?;
        let exposure_time = metadata
            .exposure_time()
            .ok_or_else(|| missing("ExposureTime"))?;
        info!(
            "Autoexposure complete, AnalogueGain: {}, ExposureTime: {}",
            analogue_gain, exposure_time
        );

        let settings = CalibrationSettings {
            lens_position,
            analogue_gain,
            exposure_time,
        };
        settings.apply_to(picture);
        Ok(settings)
    }

    /// Cycle autofocus until it succeeds, bounded by the configured attempts
    async fn auto_focus(&mut self, focus: &ConfigurationProfile, pass: u32) -> Result<f32> {
        let attempts = self.config.max_autofocus_attempts;

        for attempt in 1..=attempts {
            let focused = self.camera.autofocus().await?;
            let metadata = self
                .camera
                .take_picture(
                    Some(focus),
                    CaptureOptions::diagnostic(FOCUS_POSTFIX, self.project.setup_dir.clone()),
                )
                .await?;

            if focused {
                info!("Autofocus pass {} successful", pass);
                return metadata
                    .lens_position()
                    .ok_or_else(|| missing("LensPosition"));
            }

            warn!(
                "Autofocus pass {} failed (attempt {}/{})",
                pass, attempt, attempts
            );
        }

        Err(MeapisError::calibration(
            &self.project.name,
            format!("autofocus did not converge after {} attempts", attempts),
        ))
    }
}

fn missing(key: &str) -> MeapisError {
    CameraError::MissingMetadata {
        key: key.to_string(),
    }
    .into()
}
