use tracing::{debug, trace, warn};

use crate::{
    device::{FanCurvePoint, TuningDevice},
    errors::{Result, TuneError},
};

const FAN_CURVE: &str = "FanTuningStates";
const FAN_CURVE_RANGES: &str = "FanTuningRanges";
const ZERO_RPM: &str = "ZeroRPMState";

// Manage the device fan curve slots and the zero RPM mode
pub struct FanCurveController<'a, D: TuningDevice + ?Sized> {
    device: &'a D,
}

impl<'a, D: TuningDevice + ?Sized> FanCurveController<'a, D> {
    pub fn new(device: &'a D) -> Self {
        Self { device }
    }

    // Whether the device can stop the fans at low temperature.
    // A failed query counts as "not supported"
    pub fn supports_zero_rpm(&self) -> bool {
        match self.device.supports_zero_rpm() {
            Ok(supported) => supported,
            Err(err) => {
                warn!("Zero RPM capability query failed: {err}");
                false
            }
        }
    }

    // Current zero RPM state, false when the mode is not supported
    pub fn read_zero_rpm(&self) -> Result<bool> {
        if !self.supports_zero_rpm() {
            return Ok(false);
        }

        self.device
            .zero_rpm()
            .map_err(|source| TuneError::HardwareRead {
                parameter: ZERO_RPM,
                source,
            })
    }

    // Enable or disable zero RPM, silently skipped when the device
    // has no such mode
    pub fn apply_zero_rpm(&self, enabled: bool) -> Result<()> {
        if !self.supports_zero_rpm() {
            trace!("Zero RPM not supported, skipping");
            return Ok(());
        }

        self.device.set_zero_rpm(enabled).map_err(|source| {
            TuneError::HardwareWrite {
                parameter: ZERO_RPM,
                source,
            }
        })?;

        debug!(enabled, "Set ZeroRPM to {enabled}");

        Ok(())
    }

    // Read the fan curve slots in device order
    pub fn read_curve(&self) -> Result<Vec<FanCurvePoint>> {
        self.device
            .fan_curve()
            .map_err(|source| TuneError::HardwareRead {
                parameter: FAN_CURVE,
                source,
            })
    }

    // Write the whole curve. The device decides how many slots exist,
    // every slot is validated before a single batched commit, so an
    // invalid point leaves the device curve untouched.
    // Return the points actually committed.
    pub fn write_curve(
        &self,
        target: &[FanCurvePoint],
    ) -> Result<Vec<FanCurvePoint>> {
        let mut slots = self.read_curve()?;

        if slots.len() != target.len() {
            return Err(TuneError::CurveLengthMismatch {
                expected: slots.len(),
                actual: target.len(),
            });
        }

        let ranges = self.device.fan_curve_ranges().map_err(|source| {
            TuneError::HardwareRead {
                parameter: FAN_CURVE_RANGES,
                source,
            }
        })?;

        for (i, (slot, point)) in slots.iter_mut().zip(target).enumerate() {
            slot.speed = ranges.speed.clamp_and_validate(point.speed)?;
            slot.temperature =
                ranges.temperature.clamp_and_validate(point.temperature)?;

            trace!(index = i, "Validated fan curve slot");
        }

        self.device.set_fan_curve(&slots).map_err(|source| {
            TuneError::HardwareWrite {
                parameter: FAN_CURVE,
                source,
            }
        })?;

        for (i, slot) in slots.iter().enumerate() {
            debug!(
                index = i,
                speed = slot.speed,
                temperature = slot.temperature,
                "Set FanState[{}] to ({}%, {} degC)",
                i,
                slot.speed,
                slot.temperature
            );
        }

        Ok(slots)
    }
}
