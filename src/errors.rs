use std::path::PathBuf;

use thiserror::Error;

use crate::{device::DeviceError, memory_timing::MemoryTiming};

pub type Result<T> = std::result::Result<T, TuneError>;

// The tuning error type, every variant aborts the run
#[derive(Debug, Error)]
pub enum TuneError {
    #[error("Failed to initialize the GPU tuning service: {reason}")]
    Initialization { reason: String },

    #[error("Failed to read {parameter}: {source}")]
    HardwareRead {
        parameter: &'static str,
        source: DeviceError,
    },
    #[error("Failed to write {parameter}: {source}")]
    HardwareWrite {
        parameter: &'static str,
        source: DeviceError,
    },

    #[error("val: {value}, outside valid range [{min}, {max}]")]
    OutOfRange { value: i32, min: i32, max: i32 },

    #[error("Unknown memory timing setting '{0}'")]
    UnknownTimingName(String),
    #[error("Unknown memory timing value {0}")]
    UnknownTimingMode(i32),
    #[error("{0} is not supported by the gpu")]
    UnsupportedTiming(MemoryTiming),

    #[error("Fan curve has {actual} points but the device exposes {expected} slots")]
    CurveLengthMismatch { expected: usize, actual: usize },

    #[error("Invalid GPU profile: {0}")]
    InvalidProfile(String),
    #[error("Failed to access GPU profile {path:?}: {reason}")]
    Profile { path: PathBuf, reason: String },
}
