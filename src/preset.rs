use tracing::{info, warn};

use crate::{
    device::{Preset, TuningDevice},
    errors::{Result, TuneError},
};

// Make sure no factory preset is active before manual tuning.
// Manual values written on top of an active preset are not applied
// by the driver.
pub struct PresetResetGuard<'a, D: TuningDevice + ?Sized> {
    device: &'a D,
}

impl<'a, D: TuningDevice + ?Sized> PresetResetGuard<'a, D> {
    pub fn new(device: &'a D) -> Self {
        Self { device }
    }

    // Return the first active preset. A failed query is logged and
    // treated as an inactive preset.
    pub fn active_preset(&self) -> Option<Preset> {
        Preset::ALL.into_iter().find(|preset| {
            self.device.is_preset_active(*preset).unwrap_or_else(|err| {
                warn!("Failed to query preset {preset:?}: {err}");
                false
            })
        })
    }

    // Reset the device to factory settings if a preset is active.
    // Return whether a reset was issued.
    pub fn ensure_manual_mode(&self) -> Result<bool> {
        let Some(preset) = self.active_preset() else {
            return Ok(false);
        };

        info!("Preset {preset:?} is active, resetting to factory settings");

        self.device.reset_to_factory().map_err(|source| {
            TuneError::HardwareWrite {
                parameter: "ResetToFactory",
                source,
            }
        })?;

        Ok(true)
    }
}
