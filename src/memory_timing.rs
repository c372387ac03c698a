use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::debug;

use crate::{
    device::TuningDevice,
    errors::{Result, TuneError},
};

const NAME_PREFIX: &str = "MEMORYTIMING_";

// VRAM timing modes, the discriminants are the values used by the device
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTiming {
    #[default]
    Default = 0,
    FastTiming = 1,
    FastTimingLevel2 = 2,
    Automatic = 3,
    MemoryTimingLevel1 = 4,
    MemoryTimingLevel2 = 5,
}

impl MemoryTiming {
    pub const ALL: [MemoryTiming; 6] = [
        MemoryTiming::Default,
        MemoryTiming::FastTiming,
        MemoryTiming::FastTimingLevel2,
        MemoryTiming::Automatic,
        MemoryTiming::MemoryTimingLevel1,
        MemoryTiming::MemoryTimingLevel2,
    ];

    // Resolve a timing name. Both the full name
    // ("MEMORYTIMING_FAST_TIMING") and the short one ("FAST_TIMING")
    // are accepted
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|timing| {
                let full = timing.name();
                full == name || full.strip_prefix(NAME_PREFIX) == Some(name)
            })
            .ok_or_else(|| TuneError::UnknownTimingName(name.to_string()))
    }

    // Return the canonical name of the timing mode
    pub fn name(self) -> &'static str {
        match self {
            MemoryTiming::Default => "MEMORYTIMING_DEFAULT",
            MemoryTiming::FastTiming => "MEMORYTIMING_FAST_TIMING",
            MemoryTiming::FastTimingLevel2 => "MEMORYTIMING_FAST_TIMING_LEVEL_2",
            MemoryTiming::Automatic => "MEMORYTIMING_AUTOMATIC",
            MemoryTiming::MemoryTimingLevel1 => {
                "MEMORYTIMING_MEMORYTIMING_LEVEL_1"
            }
            MemoryTiming::MemoryTimingLevel2 => {
                "MEMORYTIMING_MEMORYTIMING_LEVEL_2"
            }
        }
    }

    // Map a raw device value back to a timing mode
    pub fn from_raw(value: i32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|timing| timing.raw() == value)
            .ok_or(TuneError::UnknownTimingMode(value))
    }

    pub fn raw(self) -> i32 {
        self as i32
    }

    // Check the mode is part of the list reported by the device,
    // the list order is irrelevant
    pub fn is_supported_by(self, supported: &[i32]) -> bool {
        supported.contains(&self.raw())
    }

    pub fn ensure_supported_by(self, supported: &[i32]) -> Result<()> {
        if self.is_supported_by(supported) {
            Ok(())
        } else {
            Err(TuneError::UnsupportedTiming(self))
        }
    }
}

impl fmt::Display for MemoryTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Profiles always store the canonical name, aliases are resolved when
// the profile is parsed
impl Serialize for MemoryTiming {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for MemoryTiming {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;

        MemoryTiming::from_name(&name).map_err(de::Error::custom)
    }
}

// Read the current timing mode of the device
pub fn read_memory_timing<D: TuningDevice + ?Sized>(
    device: &D,
) -> Result<MemoryTiming> {
    let raw = device
        .memory_timing()
        .map_err(|source| TuneError::HardwareRead {
            parameter: "MemoryTimingDescription",
            source,
        })?;

    MemoryTiming::from_raw(raw)
}

// Check the device supports the mode and only then write it
pub fn write_memory_timing<D: TuningDevice + ?Sized>(
    device: &D,
    timing: MemoryTiming,
) -> Result<()> {
    let supported = device.supported_memory_timings().map_err(|source| {
        TuneError::HardwareRead {
            parameter: "SupportedMemoryTimingDescriptionList",
            source,
        }
    })?;
    timing.ensure_supported_by(&supported)?;

    device.set_memory_timing(timing.raw()).map_err(|source| {
        TuneError::HardwareWrite {
            parameter: "MemoryTimingDescription",
            source,
        }
    })?;

    debug!(value = timing.name(), "Set MemoryTiming to {timing}");

    Ok(())
}
