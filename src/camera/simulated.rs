use super::controls::{CameraConfiguration, Control, ControlMode, Rectangle, Size};
use super::driver::{
    CameraDriver, CameraDriverFactory, CaptureRequest, DriverMetadata, AF_STATE_FOCUSED,
};
use super::modes::SensorMode;
use super::variant::CameraVariant;
use crate::error::{CameraError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Lens position the simulated autofocus settles on, in dioptres
const SIM_FOCUSED_LENS: f32 = 8.5;
/// Values the simulated auto-exposure converges to
const SIM_AE_EXPOSURE_TIME: u32 = 16_000;
const SIM_AE_GAIN: f32 = 2.0;

/// Opens [`SimulatedDriver`]s
#[derive(Debug, Clone, Default)]
pub struct SimulatedCameraFactory;

impl CameraDriverFactory for SimulatedCameraFactory {
    fn open(&self, variant: CameraVariant) -> Result<Box<dyn CameraDriver>> {
        Ok(Box::new(SimulatedDriver::new(variant)))
    }
}

/// Sensor modes of the real modules, as libcamera reports them
pub fn simulated_modes(variant: CameraVariant) -> Vec<SensorMode> {
    match variant {
        CameraVariant::V3 => {
            let full = Rectangle::new(0, 0, 4608, 2592);
            vec![
                sim_mode("SRGGB10_CSI2P", 1536, 864, 10, Rectangle::new(768, 432, 3072, 1728)),
                sim_mode("SRGGB10_CSI2P", 2304, 1296, 10, full),
                sim_mode("SRGGB10_CSI2P", 4608, 2592, 10, full),
            ]
        }
        CameraVariant::Owlsight => {
            let full = Rectangle::new(0, 0, 9248, 6944);
            vec![
                sim_mode("SBGGR10_CSI2P", 1920, 1080, 10, full),
                sim_mode("SBGGR10_CSI2P", 2312, 1736, 10, full),
                sim_mode("SBGGR10_CSI2P", 4624, 3472, 10, full),
                sim_mode("SBGGR10_CSI2P", 9248, 6944, 10, full),
            ]
        }
    }
}

fn sim_mode(format: &str, width: u32, height: u32, bit_depth: u32, crop: Rectangle) -> SensorMode {
    SensorMode {
        format: format.to_string(),
        size: Size::new(width, height),
        bit_depth,
        crop_limits: crop,
    }
}

/// In-memory camera producing placeholder stills with plausible metadata
pub struct SimulatedDriver {
    variant: CameraVariant,
    config: Option<CameraConfiguration>,
    running: bool,
    focused_lens: Option<f32>,
    frame_count: u64,
    closed: bool,
}

impl SimulatedDriver {
    pub fn new(variant: CameraVariant) -> Self {
        info!("Opening simulated {} camera", variant);
        Self {
            variant,
            config: None,
            running: false,
            focused_lens: None,
            frame_count: 0,
            closed: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CameraError::Closed {
                camera: self.camera_id(),
            }
            .into());
        }
        Ok(())
    }

    fn frame_metadata(&self) -> DriverMetadata {
        let mut metadata = DriverMetadata::default();
        let config = self.config.as_ref();

        let auto_exposure = config
            .and_then(|c| c.flag(Control::AeEnable))
            .unwrap_or(true);

        if auto_exposure {
            metadata.exposure_time = Some(SIM_AE_EXPOSURE_TIME);
            metadata.analogue_gain = Some(SIM_AE_GAIN);
        } else {
            metadata.exposure_time = config
                .and_then(|c| c.control(Control::ExposureTime))
                .and_then(|v| v.as_i64())
                .map(|v| v as u32);
            metadata.analogue_gain = config.and_then(|c| c.float(Control::AnalogueGain));
        }

        let manual_lens = config.and_then(|c| c.float(Control::LensPosition));
        metadata.lens_position = manual_lens.or(self.focused_lens);

        if config.and_then(|c| c.mode(Control::AfMode)) == Some(ControlMode::Auto) {
            metadata.af_state = Some(if self.focused_lens.is_some() {
                AF_STATE_FOCUSED
            } else {
                0
            });
        }

        metadata
            .extra
            .insert("FrameCount".to_string(), self.frame_count.into());
        metadata
            .extra
            .insert("SensorTemperature".to_string(), serde_json::json!(32.5));
        metadata
    }
}

#[async_trait::async_trait]
impl CameraDriver for SimulatedDriver {
    fn camera_id(&self) -> String {
        format!("sim-{}", self.variant)
    }

    async fn sensor_modes(&mut self) -> Result<Vec<SensorMode>> {
        self.ensure_open()?;
        Ok(simulated_modes(self.variant))
    }

    async fn configure(&mut self, config: &CameraConfiguration) -> Result<()> {
        self.ensure_open()?;
        debug!(
            "Simulated camera configured for {}x{}",
            config.main_size.width, config.main_size.height
        );
        self.config = Some(config.clone());
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    async fn capture_request(&mut self, format: &str) -> Result<Box<dyn CaptureRequest>> {
        self.ensure_open()?;
        if !self.running {
            return Err(CameraError::driver("capture requested while the camera is stopped").into());
        }

        self.frame_count += 1;
        debug!("Simulated {} capture #{}", format, self.frame_count);

        Ok(Box::new(SimulatedRequest {
            data: placeholder_image(self.frame_count),
            metadata: self.frame_metadata(),
        }))
    }

    async fn autofocus_cycle(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if !self.running {
            return Err(CameraError::driver("autofocus requested while the camera is stopped").into());
        }

        self.focused_lens = Some(SIM_FOCUSED_LENS);
        Ok(true)
    }

    async fn close(&mut self) -> Result<()> {
        self.running = false;
        self.closed = true;
        info!("Simulated {} camera closed", self.variant);
        Ok(())
    }
}

/// Minimal JPEG-framed payload
fn placeholder_image(frame: u64) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(&frame.to_be_bytes());
    data.extend_from_slice(&[0x80; 64]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

struct SimulatedRequest {
    data: Vec<u8>,
    metadata: DriverMetadata,
}

#[async_trait::async_trait]
impl CaptureRequest for SimulatedRequest {
    async fn save(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }

    fn metadata(&self) -> &DriverMetadata {
        &self.metadata
    }

    async fn release(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }
}
