use std::fmt;

use thiserror::Error;

use crate::range::IntRange;

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

// Failure reported by a tuning backend for a single call
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Sysfs(#[from] amdgpu_sysfs::error::Error),
    #[error("The GPU does not report {0}")]
    NotReported(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

// Scalar tunables exposed through the get / get range / set protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    GpuMinFrequency,
    GpuMaxFrequency,
    GpuVoltage,
    VramMaxFrequency,
    PowerLimit,
}

impl Parameter {
    pub fn name(self) -> &'static str {
        match self {
            Parameter::GpuMinFrequency => "GPUMinFrequency",
            Parameter::GpuMaxFrequency => "GPUMaxFrequency",
            Parameter::GpuVoltage => "GPUVoltage",
            Parameter::VramMaxFrequency => "MaxVRAMFrequency",
            Parameter::PowerLimit => "PowerLimit",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Parameter::GpuMinFrequency
            | Parameter::GpuMaxFrequency
            | Parameter::VramMaxFrequency => "MHz",
            Parameter::GpuVoltage => "mV",
            Parameter::PowerLimit => "%",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// One fan curve slot, fan speed in percent and temperature in degC
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanCurvePoint {
    pub speed: i32,
    pub temperature: i32,
}

impl From<(i32, i32)> for FanCurvePoint {
    fn from(value: (i32, i32)) -> Self {
        Self {
            speed: value.0,
            temperature: value.1,
        }
    }
}

// Valid ranges for the fan curve points
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanCurveRanges {
    pub speed: IntRange,
    pub temperature: IntRange,
}

// Vendor factory presets, manual tuning has no effect while one is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    PowerSaver,
    Quiet,
    Balanced,
    Turbo,
    Rage,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::PowerSaver,
        Preset::Quiet,
        Preset::Balanced,
        Preset::Turbo,
        Preset::Rage,
    ];
}

// Hardware tuning provider for a single GPU.
// Every call is a blocking round-trip to the driver which either
// succeeds or fails, no call is retried by the caller
#[cfg_attr(test, mockall::automock)]
pub trait TuningDevice {
    // Scalar parameters
    fn value(&self, parameter: Parameter) -> DeviceResult<i32>;
    fn value_range(&self, parameter: Parameter) -> DeviceResult<IntRange>;
    fn set_value(&self, parameter: Parameter, value: i32) -> DeviceResult<()>;

    // Memory timing, values are raw device timing codes
    fn memory_timing(&self) -> DeviceResult<i32>;
    fn supported_memory_timings(&self) -> DeviceResult<Vec<i32>>;
    fn set_memory_timing(&self, timing: i32) -> DeviceResult<()>;

    // Fan curve, the number of slots is fixed by the device
    fn fan_curve(&self) -> DeviceResult<Vec<FanCurvePoint>>;
    fn fan_curve_ranges(&self) -> DeviceResult<FanCurveRanges>;
    fn set_fan_curve(&self, points: &[FanCurvePoint]) -> DeviceResult<()>;

    // Zero RPM fan mode
    fn supports_zero_rpm(&self) -> DeviceResult<bool>;
    fn zero_rpm(&self) -> DeviceResult<bool>;
    fn set_zero_rpm(&self, enabled: bool) -> DeviceResult<()>;

    // Factory presets
    fn is_preset_active(&self, preset: Preset) -> DeviceResult<bool>;
    fn reset_to_factory(&self) -> DeviceResult<()>;
}
