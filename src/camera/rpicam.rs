use super::controls::{CameraConfiguration, Control, ControlMode, ControlValue, Rectangle, Size};
use super::driver::{
    CameraDriver, CameraDriverFactory, CaptureRequest, DriverMetadata, AF_STATE_FOCUSED,
};
use super::modes::SensorMode;
use super::tuning::prepare_tuning_file;
use super::variant::CameraVariant;
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Extra time granted to a capture process beyond its own sensor timeout
const PROCESS_GRACE: Duration = Duration::from_secs(30);

/// Opens [`RpicamDriver`]s backed by the rpicam command-line tools
#[derive(Debug, Clone)]
pub struct RpicamCameraFactory {
    config: CameraConfig,
}

impl RpicamCameraFactory {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

impl CameraDriverFactory for RpicamCameraFactory {
    fn open(&self, variant: CameraVariant) -> Result<Box<dyn CameraDriver>> {
        info!(
            "Opening {} camera on port {} via {}",
            variant,
            variant.index(),
            self.config.still_command
        );
        Ok(Box::new(RpicamDriver::new(variant, self.config.clone())))
    }
}

/// Camera driver running one `rpicam-still` process per capture.
///
/// The device is only held while a capture process runs, so `start` and
/// `stop` just gate capture requests.
pub struct RpicamDriver {
    variant: CameraVariant,
    config: CameraConfig,
    tuning_file: Option<PathBuf>,
    tuning_prepared: bool,
    bound: Option<CameraConfiguration>,
    model: Option<String>,
    running: bool,
    focused_lens: Option<f32>,
    sequence: u64,
    closed: bool,
}

impl RpicamDriver {
    pub fn new(variant: CameraVariant, config: CameraConfig) -> Self {
        Self {
            variant,
            config,
            tuning_file: None,
            tuning_prepared: false,
            bound: None,
            model: None,
            running: false,
            focused_lens: None,
            sequence: 0,
            closed: false,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.closed {
            return Err(CameraError::Closed {
                camera: self.camera_id(),
            }
            .into());
        }
        if !self.running {
            return Err(CameraError::driver("camera is not started").into());
        }
        Ok(())
    }

    async fn ensure_tuning(&mut self) -> Result<()> {
        if !self.tuning_prepared {
            self.tuning_file = prepare_tuning_file(
                self.variant,
                &self.config.tuning_dir,
                &self.config.staging_dir,
            )
            .await?;
            self.tuning_prepared = true;
        }
        Ok(())
    }

    fn next_staging_paths(&mut self, encoding: &str) -> (PathBuf, PathBuf) {
        self.sequence += 1;
        let stem = format!(
            "cam{}-{}-{}",
            self.variant.index(),
            std::process::id(),
            self.sequence
        );
        (
            self.config
                .staging_dir
                .join(format!("{}.{}", stem, encoding)),
            self.config.staging_dir.join(format!("{}.json", stem)),
        )
    }

    /// Run one still capture and return its staged image and parsed metadata
    async fn run_still(
        &mut self,
        format: &str,
        trigger_autofocus: bool,
    ) -> Result<(PathBuf, PathBuf, DriverMetadata)> {
        tokio::fs::create_dir_all(&self.config.staging_dir).await?;

        let encoding = encoding_for(format);
        let (image_path, metadata_path) = self.next_staging_paths(encoding);

        let invocation = StillInvocation {
            camera: self.variant.index(),
            timeout_ms: self.config.capture_timeout_ms,
            config: self.bound.as_ref(),
            encoding,
            output: &image_path,
            metadata: &metadata_path,
            tuning_file: self.tuning_file.as_deref(),
            focused_lens: self.focused_lens,
            trigger_autofocus,
        };
        let args = invocation.args();
        debug!("{} {}", self.config.still_command, args.join(" "));

        let mut cmd = Command::new(&self.config.still_command);
        cmd.args(&args).kill_on_drop(true);

        let limit = Duration::from_millis(self.config.capture_timeout_ms) + PROCESS_GRACE;
        let output = tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| {
                CameraError::driver(format!(
                    "{} did not finish within {:?}",
                    self.config.still_command, limit
                ))
            })?
            .map_err(|e| {
                CameraError::driver(format!("failed to run {}: {}", self.config.still_command, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CameraError::driver(format!(
                "{} exited with {}: {}",
                self.config.still_command,
                output.status,
                stderr.trim()
            ))
            .into());
        }

        let raw = tokio::fs::read(&metadata_path).await?;
        let metadata: DriverMetadata = serde_json::from_slice(&raw)?;

        Ok((image_path, metadata_path, metadata))
    }
}

#[async_trait::async_trait]
impl CameraDriver for RpicamDriver {
    fn camera_id(&self) -> String {
        match &self.model {
            Some(model) => format!("{}@{}", model, self.variant.index()),
            None => format!("rpicam@{}", self.variant.index()),
        }
    }

    async fn sensor_modes(&mut self) -> Result<Vec<SensorMode>> {
        if self.closed {
            return Err(CameraError::Closed {
                camera: self.camera_id(),
            }
            .into());
        }

        let output = Command::new(&self.config.list_command)
            .arg("--list-cameras")
            .output()
            .await
            .map_err(|e| {
                CameraError::driver(format!("failed to run {}: {}", self.config.list_command, e))
            })?;

        if !output.status.success() {
            return Err(CameraError::driver(format!(
                "{} --list-cameras exited with {}",
                self.config.list_command, output.status
            ))
            .into());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let (model, modes) = parse_sensor_modes(&text, self.variant.index());
        if model.is_none() {
            return Err(CameraError::driver(format!(
                "no camera listed on port {}",
                self.variant.index()
            ))
            .into());
        }

        self.model = model;
        info!("{} reports {} sensor modes", self.camera_id(), modes.len());
        Ok(modes)
    }

    async fn configure(&mut self, config: &CameraConfiguration) -> Result<()> {
        if self.closed {
            return Err(CameraError::Closed {
                camera: self.camera_id(),
            }
            .into());
        }
        self.ensure_tuning().await?;
        self.bound = Some(config.clone());
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(CameraError::Closed {
                camera: self.camera_id(),
            }
            .into());
        }
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    async fn capture_request(&mut self, format: &str) -> Result<Box<dyn CaptureRequest>> {
        self.ensure_ready()?;
        let (image_path, metadata_path, metadata) = self.run_still(format, false).await?;

        Ok(Box::new(StagedRequest {
            image_path,
            metadata_path,
            metadata,
        }))
    }

    async fn autofocus_cycle(&mut self) -> Result<bool> {
        self.ensure_ready()?;
        let (image_path, metadata_path, metadata) = self.run_still("jpg", true).await?;
        remove_staged(&[image_path, metadata_path]).await;

        let focused = metadata.af_state == Some(AF_STATE_FOCUSED);
        if focused {
            self.focused_lens = metadata.lens_position;
        }

        debug!(
            "Autofocus cycle on {}: state {:?}, lens {:?}",
            self.camera_id(),
            metadata.af_state,
            metadata.lens_position
        );
        Ok(focused)
    }

    async fn close(&mut self) -> Result<()> {
        self.running = false;
        self.closed = true;

        if let Some(tuning) = self.tuning_file.take() {
            remove_staged(&[tuning]).await;
        }
        info!("Camera {} closed", self.camera_id());
        Ok(())
    }
}

/// Capture staged on disk by `rpicam-still`
struct StagedRequest {
    image_path: PathBuf,
    metadata_path: PathBuf,
    metadata: DriverMetadata,
}

#[async_trait::async_trait]
impl CaptureRequest for StagedRequest {
    async fn save(&self, path: &Path) -> Result<()> {
        // copy, not rename: the staging dir is usually on tmpfs
        tokio::fs::copy(&self.image_path, path).await?;
        Ok(())
    }

    fn metadata(&self) -> &DriverMetadata {
        &self.metadata
    }

    async fn release(&mut self) -> Result<()> {
        remove_staged(&[self.image_path.clone(), self.metadata_path.clone()]).await;
        Ok(())
    }
}

async fn remove_staged(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staged file {}: {}", path.display(), e);
            }
        }
    }
}

fn encoding_for(format: &str) -> &str {
    match format {
        "jpeg" => "jpg",
        other => other,
    }
}

/// Arguments of one `rpicam-still` run
#[derive(Debug)]
pub struct StillInvocation<'a> {
    pub camera: u8,
    pub timeout_ms: u64,
    pub config: Option<&'a CameraConfiguration>,
    pub encoding: &'a str,
    pub output: &'a Path,
    pub metadata: &'a Path,
    pub tuning_file: Option<&'a Path>,
    /// Lens position found by the last successful autofocus cycle
    pub focused_lens: Option<f32>,
    pub trigger_autofocus: bool,
}

impl StillInvocation<'_> {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--camera".to_string(),
            self.camera.to_string(),
            "--nopreview".to_string(),
            "--timeout".to_string(),
            self.timeout_ms.to_string(),
            "--encoding".to_string(),
            self.encoding.to_string(),
            "--output".to_string(),
            self.output.display().to_string(),
            "--metadata".to_string(),
            self.metadata.display().to_string(),
            "--metadata-format".to_string(),
            "json".to_string(),
        ];

        if let Some(tuning) = self.tuning_file {
            push(&mut args, "--tuning-file", tuning.display());
        }

        if let Some(config) = self.config {
            self.push_stream(&mut args, config);
            push_exposure(&mut args, config);
            self.push_focus(&mut args, config);
            push_image(&mut args, config);
        } else if self.trigger_autofocus {
            args.push("--autofocus-on-capture".to_string());
        }

        args
    }

    fn push_stream(&self, args: &mut Vec<String>, config: &CameraConfiguration) {
        push(args, "--width", config.main_size.width);
        push(args, "--height", config.main_size.height);

        if let Some(depth) = config.bit_depth {
            push(
                args,
                "--mode",
                format!(
                    "{}:{}:{}:P",
                    config.sensor_size.width, config.sensor_size.height, depth
                ),
            );
        }

        if config.transform.hflip {
            args.push("--hflip".to_string());
        }
        if config.transform.vflip {
            args.push("--vflip".to_string());
        }
    }

    fn push_focus(&self, args: &mut Vec<String>, config: &CameraConfiguration) {
        let af_mode = config.mode(Control::AfMode);
        let lens = config.float(Control::LensPosition);

        match (af_mode, lens) {
            (_, Some(lens)) => {
                push(args, "--autofocus-mode", "manual");
                push(args, "--lens-position", lens);
            }
            (Some(ControlMode::Auto), None) if self.trigger_autofocus => {
                push(args, "--autofocus-mode", "auto");
                args.push("--autofocus-on-capture".to_string());
            }
            (Some(ControlMode::Auto), None) => match self.focused_lens {
                Some(focused) => {
                    push(args, "--autofocus-mode", "manual");
                    push(args, "--lens-position", focused);
                }
                None => push(args, "--autofocus-mode", "auto"),
            },
            (Some(ControlMode::Manual), None) => push(args, "--autofocus-mode", "manual"),
            _ => {}
        }

        if config.mode(Control::AfRange) == Some(ControlMode::Macro) {
            push(args, "--autofocus-range", "macro");
        }
        if config.mode(Control::AfSpeed) == Some(ControlMode::Normal) {
            push(args, "--autofocus-speed", "normal");
        }

        if let Some(ControlValue::Windows(windows)) = config.control(Control::AfWindows) {
            if let Some(window) = windows.first() {
                push(
                    args,
                    "--autofocus-window",
                    window_fractions(window, &config.crop_limits),
                );
            }
        }
    }
}

fn push_exposure(args: &mut Vec<String>, config: &CameraConfiguration) {
    let auto = config.flag(Control::AeEnable).unwrap_or(true);

    if !auto {
        if let Some(time) = config
            .control(Control::ExposureTime)
            .and_then(ControlValue::as_i64)
        {
            push(args, "--shutter", time);
        }
        if let Some(gain) = config.float(Control::AnalogueGain) {
            push(args, "--gain", gain);
        }
    }

    if config.mode(Control::AeExposureMode) == Some(ControlMode::Long) {
        push(args, "--exposure", "long");
    }
    if config.mode(Control::AeMeteringMode) == Some(ControlMode::Matrix) {
        push(args, "--metering", "average");
    }
    if let Some(ev) = config.float(Control::ExposureValue) {
        push(args, "--ev", ev);
    }
}

fn push_image(args: &mut Vec<String>, config: &CameraConfiguration) {
    match config.control(Control::ColourGains) {
        Some(ControlValue::Gains(red, blue)) if config.flag(Control::AwbEnable) == Some(false) => {
            push(args, "--awbgains", format!("{},{}", red, blue));
        }
        _ => {
            if config.mode(Control::AwbMode) == Some(ControlMode::Auto) {
                push(args, "--awb", "auto");
            }
        }
    }

    if config.mode(Control::NoiseReductionMode) == Some(ControlMode::Off) {
        push(args, "--denoise", "off");
    }
    if let Some(sharpness) = config.float(Control::Sharpness) {
        push(args, "--sharpness", sharpness);
    }
}

fn push(args: &mut Vec<String>, flag: &str, value: impl std::fmt::Display) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

/// Express a sensor-space window as `x,y,w,h` fractions of the crop limits
fn window_fractions(window: &Rectangle, limits: &Rectangle) -> String {
    let width = limits.width.max(1) as f64;
    let height = limits.height.max(1) as f64;
    let x = window.x.saturating_sub(limits.x) as f64 / width;
    let y = window.y.saturating_sub(limits.y) as f64 / height;

    format!(
        "{:.4},{:.4},{:.4},{:.4}",
        x,
        y,
        window.width as f64 / width,
        window.height as f64 / height
    )
}

/// Parse `rpicam-hello --list-cameras` output for the camera on `index`.
///
/// Returns the sensor model (None when the camera is not listed) and every
/// mode listed for it.
pub fn parse_sensor_modes(text: &str, index: u8) -> (Option<String>, Vec<SensorMode>) {
    let mut model = None;
    let mut modes = Vec::new();
    let mut in_camera = false;
    let mut format: Option<(String, u32)> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some((number, rest)) = camera_header(trimmed) {
            in_camera = number == index;
            format = None;
            if in_camera {
                model = rest.split_whitespace().next().map(str::to_string);
            }
            continue;
        }

        if !in_camera {
            continue;
        }

        let mut entry = trimmed.strip_prefix("Modes:").map(str::trim).unwrap_or(trimmed);

        if let Some(rest) = entry.strip_prefix('\'') {
            let Some(end) = rest.find('\'') else {
                continue;
            };
            let name = &rest[..end];
            format = Some((name.to_string(), bit_depth_of(name)));
            entry = rest[end + 1..].trim_start().trim_start_matches(':').trim();
        }

        let Some((name, depth)) = format.as_ref() else {
            continue;
        };

        match parse_mode_entry(entry) {
            Some((size, crop_limits)) => modes.push(SensorMode {
                format: name.clone(),
                size,
                bit_depth: *depth,
                crop_limits,
            }),
            None if entry.is_empty() => {}
            None => {
                error!("Unrecognised sensor mode line: {}", trimmed);
            }
        }
    }

    (model, modes)
}

/// `0 : imx708_noir [4608x2592 10-bit RGGB] (/base/...)`
fn camera_header(line: &str) -> Option<(u8, &str)> {
    let (number, rest) = line.split_once(" : ")?;
    let number = number.trim().parse().ok()?;
    Some((number, rest.trim()))
}

/// First run of digits in a pixel format name, e.g. 10 for `SRGGB10_CSI2P`
fn bit_depth_of(format: &str) -> u32 {
    format
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

/// `1536x864 [120.13 fps - (768, 432)/3072x1728 crop]`
fn parse_mode_entry(entry: &str) -> Option<(Size, Rectangle)> {
    let (size, details) = entry.split_once('[')?;
    let size = parse_size(size.trim())?;

    let open = details.find('(')?;
    let close = details.find(')')?;
    let (x, y) = details[open + 1..close].split_once(',')?;
    let x = x.trim().parse().ok()?;
    let y = y.trim().parse().ok()?;

    let limits = details[close + 1..].trim_start().strip_prefix('/')?;
    let limits = limits.split_whitespace().next()?;
    let limits = parse_size(limits.trim_end_matches(']'))?;

    Some((size, Rectangle::new(x, y, limits.width, limits.height)))
}

fn parse_size(text: &str) -> Option<Size> {
    let (width, height) = text.split_once('x')?;
    Some(Size::new(width.trim().parse().ok()?, height.trim().parse().ok()?))
}
