use crate::errors::{Result, TuneError};

// Valid value range reported by the device for a tunable parameter
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl IntRange {
    pub fn new(min: i32, max: i32, step: i32) -> Self {
        Self { min, max, step }
    }

    // Quantize the value down to the range step and check it lies
    // in [min, max]. The quantization truncates toward zero, the
    // firmware expects 2499 with a step of 50 to become 2450.
    // A non positive step leaves the value untouched.
    pub fn clamp_and_validate(&self, value: i32) -> Result<i32> {
        let quantized = if self.step > 0 {
            (value / self.step) * self.step
        } else {
            value
        };

        if quantized < self.min || self.max < quantized {
            return Err(TuneError::OutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }

        Ok(quantized)
    }
}
