use tracing::debug;

use crate::{
    device::{Parameter, TuningDevice},
    errors::{Result, TuneError},
};

// Uniform read / validate / write access to one scalar parameter.
// The channel is configured by the parameter it drives, all the
// scalars share the same protocol.
pub struct TuningChannel<'a, D: TuningDevice + ?Sized> {
    device: &'a D,
    parameter: Parameter,
}

impl<'a, D: TuningDevice + ?Sized> TuningChannel<'a, D> {
    pub fn new(device: &'a D, parameter: Parameter) -> Self {
        Self { device, parameter }
    }

    pub fn unit(&self) -> &'static str {
        self.parameter.unit()
    }

    // Read the current value from the device
    pub fn read(&self) -> Result<i32> {
        self.device
            .value(self.parameter)
            .map_err(|source| TuneError::HardwareRead {
                parameter: self.parameter.name(),
                source,
            })
    }

    // Validate the target against the range the device reports right
    // now and write the quantized value. Ranges depend on the firmware
    // state and are never cached. Return the value actually written.
    pub fn write(&self, target: i32) -> Result<i32> {
        let range = self.device.value_range(self.parameter).map_err(
            |source| TuneError::HardwareRead {
                parameter: self.parameter.name(),
                source,
            },
        )?;

        let value = range.clamp_and_validate(target)?;

        self.device
            .set_value(self.parameter, value)
            .map_err(|source| TuneError::HardwareWrite {
                parameter: self.parameter.name(),
                source,
            })?;

        debug!(
            parameter = self.parameter.name(),
            value,
            unit = self.unit(),
            "Set {} to {} {}",
            self.parameter,
            value,
            self.unit()
        );

        Ok(value)
    }
}
