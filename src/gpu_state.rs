use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    device::FanCurvePoint,
    errors::{Result, TuneError},
    memory_timing::MemoryTiming,
};

// Complete set of tunable parameters of a GPU, either declared as the
// target of a run or captured from the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GpuState {
    pub gpu_tuning: GpuTuning,
    pub vram_tuning: VramTuning,
    pub fan_tuning: FanTuning,
    pub power_tuning: PowerTuning,
}

// Core clock range in MHz and voltage in mV
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GpuTuning {
    pub min_freq: i32,
    pub max_freq: i32,
    pub voltage: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VramTuning {
    pub memory_timing: MemoryTiming,
    pub max_freq: i32,
}

// Fan curve stored as two parallel lists, speeds[i] and temperatures[i]
// form the i-th slot
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FanTuning {
    pub zero_rpm: bool,
    pub speeds: Vec<i32>,
    pub temperatures: Vec<i32>,
}

// Power limit in percent
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PowerTuning {
    pub power_limit: i32,
}

impl FanTuning {
    pub fn from_points(zero_rpm: bool, points: &[FanCurvePoint]) -> Self {
        Self {
            zero_rpm,
            speeds: points.iter().map(|p| p.speed).collect(),
            temperatures: points.iter().map(|p| p.temperature).collect(),
        }
    }

    pub fn points(&self) -> Vec<FanCurvePoint> {
        self.speeds
            .iter()
            .zip(&self.temperatures)
            .map(|(&speed, &temperature)| FanCurvePoint { speed, temperature })
            .collect()
    }
}

impl GpuState {
    // Profile applied when no profile file is given
    pub fn default_target() -> Self {
        Self {
            gpu_tuning: GpuTuning {
                min_freq: 2400,
                max_freq: 2500,
                voltage: 1125,
            },
            vram_tuning: VramTuning {
                memory_timing: MemoryTiming::Default,
                max_freq: 2614,
            },
            fan_tuning: FanTuning {
                zero_rpm: true,
                speeds: vec![23, 30, 41, 54, 80],
                temperatures: vec![55, 70, 79, 88, 95],
            },
            power_tuning: PowerTuning { power_limit: 15 },
        }
    }

    // Check the profile is self consistent before touching the device
    pub fn validate(&self) -> Result<()> {
        let fan = &self.fan_tuning;

        if fan.speeds.len() != fan.temperatures.len() {
            return Err(TuneError::InvalidProfile(format!(
                "fanTuning has {} speeds but {} temperatures",
                fan.speeds.len(),
                fan.temperatures.len()
            )));
        }

        Ok(())
    }

    // Load and validate a profile from a Json file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading GPU profile from: {:?}", path);

        let file = File::open(path).map_err(|err| TuneError::Profile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let state: GpuState = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| TuneError::Profile {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;

        state.validate()?;

        Ok(state)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let state: GpuState = serde_json::from_str(json)
            .map_err(|err| TuneError::InvalidProfile(err.to_string()))?;

        state.validate()?;

        Ok(state)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| TuneError::InvalidProfile(err.to_string()))
    }

    // Save the state as a profile file
    pub fn save(&self, path: &Path) -> Result<()> {
        let to_profile_err = |reason: String| TuneError::Profile {
            path: path.to_path_buf(),
            reason,
        };

        let file =
            File::create(path).map_err(|err| to_profile_err(err.to_string()))?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|err| to_profile_err(err.to_string()))?;
        writeln!(writer).map_err(|err| to_profile_err(err.to_string()))?;
        writer
            .flush()
            .map_err(|err| to_profile_err(err.to_string()))?;

        Ok(())
    }

    // Return the Json paths of the fields whose value differ
    pub fn differences(&self, other: &GpuState) -> Vec<String> {
        let mut paths = Vec::new();

        if let (Ok(lhs), Ok(rhs)) =
            (serde_json::to_value(self), serde_json::to_value(other))
        {
            collect_differences("", &lhs, &rhs, &mut paths);
        }

        paths
    }
}

fn collect_differences(
    path: &str,
    lhs: &Value,
    rhs: &Value,
    paths: &mut Vec<String>,
) {
    match (lhs, rhs) {
        (Value::Object(lhs), Value::Object(rhs)) => {
            for (key, value) in lhs {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };

                match rhs.get(key) {
                    Some(other) => {
                        collect_differences(&child, value, other, paths)
                    }
                    None => paths.push(child),
                }
            }
        }
        (Value::Array(lhs), Value::Array(rhs)) if lhs.len() == rhs.len() => {
            for (i, (value, other)) in lhs.iter().zip(rhs).enumerate() {
                collect_differences(&format!("{path}[{i}]"), value, other, paths);
            }
        }
        _ => {
            if lhs != rhs {
                paths.push(path.to_string());
            }
        }
    }
}
