use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Sensor-space rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Image orientation applied by the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub hflip: bool,
    pub vflip: bool,
}

impl Transform {
    pub fn rotate_180() -> Self {
        Self {
            hflip: true,
            vflip: true,
        }
    }
}

/// Camera controls understood by the drivers, named as libcamera names them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Control {
    AeEnable,
    AeExposureMode,
    AeConstraintMode,
    AeMeteringMode,
    ExposureTime,
    AnalogueGain,
    ExposureValue,
    AfMode,
    AfRange,
    AfMetering,
    AfSpeed,
    AfWindows,
    LensPosition,
    AwbEnable,
    AwbMode,
    ColourGains,
    NoiseReductionMode,
    Sharpness,
}

/// Enumerated control values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    Auto,
    Manual,
    Normal,
    Long,
    Highlight,
    Matrix,
    Macro,
    Windows,
    Custom,
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Mode(ControlMode),
    Gains(f32, f32),
    Windows(Vec<Rectangle>),
}

impl ControlValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ControlValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ControlValue::Float(value) => Some(*value),
            ControlValue::Int(value) => Some(*value as f32),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ControlValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_mode(&self) -> Option<ControlMode> {
        match self {
            ControlValue::Mode(mode) => Some(*mode),
            _ => None,
        }
    }
}

impl From<bool> for ControlValue {
    fn from(value: bool) -> Self {
        ControlValue::Bool(value)
    }
}

impl From<i64> for ControlValue {
    fn from(value: i64) -> Self {
        ControlValue::Int(value)
    }
}

impl From<u32> for ControlValue {
    fn from(value: u32) -> Self {
        ControlValue::Int(value as i64)
    }
}

impl From<f32> for ControlValue {
    fn from(value: f32) -> Self {
        ControlValue::Float(value)
    }
}

impl From<ControlMode> for ControlValue {
    fn from(mode: ControlMode) -> Self {
        ControlValue::Mode(mode)
    }
}

/// Everything a driver needs to run the sensor for one kind of capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfiguration {
    pub sensor_size: Size,
    pub bit_depth: Option<u32>,
    pub main_size: Size,
    /// Crop limits of the selected sensor mode; control rectangles are relative to these
    pub crop_limits: Rectangle,
    pub transform: Transform,
    pub controls: BTreeMap<Control, ControlValue>,
}

impl CameraConfiguration {
    pub fn control(&self, control: Control) -> Option<&ControlValue> {
        self.controls.get(&control)
    }

    pub fn set(&mut self, control: Control, value: impl Into<ControlValue>) {
        self.controls.insert(control, value.into());
    }

    pub fn mode(&self, control: Control) -> Option<ControlMode> {
        self.control(control).and_then(ControlValue::as_mode)
    }

    pub fn flag(&self, control: Control) -> Option<bool> {
        self.control(control).and_then(ControlValue::as_bool)
    }

    pub fn float(&self, control: Control) -> Option<f32> {
        self.control(control).and_then(ControlValue::as_f32)
    }
}
