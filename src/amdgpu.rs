// Tuning backend for the Linux amdgpu driver, built on amdgpu-sysfs.
// Clocks and voltage go through the overdrive clocks table, the fan curve
// and zero RPM mode through the PMFW fan controls and the power limit
// through the hwmon power cap. Overdrive must be enabled with the
// amdgpu.ppfeaturemask kernel parameter.

use std::{
    fs,
    path::{Path, PathBuf},
};

use amdgpu_sysfs::{
    gpu_handle::{
        GpuHandle, PerformanceLevel,
        fan_control::FanCurve,
        overdrive::{ClocksTable, ClocksTableGen},
    },
    hw_mon::HwMon,
};
use tracing::{debug, info};

use crate::{
    device::{
        DeviceError, DeviceResult, FanCurvePoint, FanCurveRanges, Parameter,
        Preset, TuningDevice,
    },
    errors::{Result, TuneError},
    memory_timing::MemoryTiming,
    range::IntRange,
};

pub const DRM_PATH: &str = "/sys/class/drm";
const AMDGPU_DRIVER: &str = "amdgpu";

pub struct AmdgpuDevice {
    card: String,
    handle: GpuHandle,
}

impl AmdgpuDevice {
    // Open the index-th amdgpu card found under the drm class directory
    pub fn open(drm_root: &Path, index: usize) -> Result<Self> {
        let Some((card, handle)) = amdgpu_cards(drm_root)?.into_iter().nth(index)
        else {
            return Err(TuneError::Initialization {
                reason: format!("No AMD GPU with index {index} found"),
            });
        };

        if let Err(err) = handle.get_clocks_table() {
            return Err(TuneError::Initialization {
                reason: format!(
                    "Overdrive is not available on {card} ({err}), boot with \
                     amdgpu.ppfeaturemask=0xffffffff"
                ),
            });
        }

        if handle.hw_monitors.is_empty() {
            return Err(TuneError::Initialization {
                reason: format!("No hwmon interface found for {card}"),
            });
        }

        info!("Using AMD GPU {card}");

        Ok(Self { card, handle })
    }

    pub fn card(&self) -> &str {
        &self.card
    }

    fn clocks_table(&self) -> DeviceResult<ClocksTableGen> {
        Ok(self.handle.get_clocks_table()?)
    }

    fn hw_mon(&self) -> DeviceResult<&HwMon> {
        self.handle
            .hw_monitors
            .first()
            .ok_or_else(|| DeviceError::NotReported("a hwmon interface".into()))
    }

    // Default power cap in W, the power limit is a percent offset from it
    fn default_power_cap(&self) -> DeviceResult<f64> {
        let default = self.hw_mon()?.get_power_cap_default()?;

        if default <= 0.0 {
            return Err(DeviceError::NotReported("a default power cap".into()));
        }

        Ok(default)
    }

    fn fan_curve_table(&self) -> DeviceResult<FanCurve> {
        Ok(self.handle.get_fan_curve()?)
    }
}

impl TuningDevice for AmdgpuDevice {
    fn value(&self, parameter: Parameter) -> DeviceResult<i32> {
        if parameter == Parameter::PowerLimit {
            let cap = self.hw_mon()?.get_power_cap()?;

            return Ok(cap_to_percent(cap, self.default_power_cap()?));
        }

        clock_value(&self.clocks_table()?, parameter)
            .ok_or_else(|| DeviceError::NotReported(parameter.to_string()))
    }

    fn value_range(&self, parameter: Parameter) -> DeviceResult<IntRange> {
        if parameter == Parameter::PowerLimit {
            let hw_mon = self.hw_mon()?;
            let default = self.default_power_cap()?;

            return Ok(IntRange::new(
                cap_to_percent(hw_mon.get_power_cap_min()?, default),
                cap_to_percent(hw_mon.get_power_cap_max()?, default),
                1,
            ));
        }

        let (min, max) = clock_range(&self.clocks_table()?, parameter)
            .ok_or_else(|| {
                DeviceError::NotReported(format!("the {parameter} range"))
            })?;

        Ok(IntRange::new(min, max, 1))
    }

    fn set_value(&self, parameter: Parameter, value: i32) -> DeviceResult<()> {
        if parameter == Parameter::PowerLimit {
            let cap = percent_to_cap(value, self.default_power_cap()?);

            return Ok(self.hw_mon()?.set_power_cap(cap)?);
        }

        let mut table = self.clocks_table()?;
        update_clocks_table(&mut table, parameter, value)?;

        self.handle.set_clocks_table(&table)?.commit()?;

        Ok(())
    }

    // amdgpu has no memory timing control, only the default mode is
    // reported
    fn memory_timing(&self) -> DeviceResult<i32> {
        Ok(MemoryTiming::Default.raw())
    }

    fn supported_memory_timings(&self) -> DeviceResult<Vec<i32>> {
        Ok(vec![MemoryTiming::Default.raw()])
    }

    fn set_memory_timing(&self, timing: i32) -> DeviceResult<()> {
        if timing == MemoryTiming::Default.raw() {
            return Ok(());
        }

        Err(DeviceError::Unsupported(format!(
            "memory timing {timing} on amdgpu"
        )))
    }

    fn fan_curve(&self) -> DeviceResult<Vec<FanCurvePoint>> {
        Ok(self
            .fan_curve_table()?
            .points
            .iter()
            .map(|&(temperature, speed)| FanCurvePoint {
                speed: i32::from(speed),
                temperature: i32::from(temperature),
            })
            .collect())
    }

    fn fan_curve_ranges(&self) -> DeviceResult<FanCurveRanges> {
        let ranges = self.fan_curve_table()?.allowed_ranges.ok_or_else(|| {
            DeviceError::NotReported("the fan curve ranges".into())
        })?;

        Ok(FanCurveRanges {
            speed: IntRange::new(
                i32::from(*ranges.speed_range.start()),
                i32::from(*ranges.speed_range.end()),
                1,
            ),
            temperature: IntRange::new(
                i32::from(*ranges.temperature_range.start()),
                i32::from(*ranges.temperature_range.end()),
                1,
            ),
        })
    }

    fn set_fan_curve(&self, points: &[FanCurvePoint]) -> DeviceResult<()> {
        let current = self.fan_curve_table()?;

        let points = points
            .iter()
            .map(|point| {
                let out_of_range = |_| {
                    DeviceError::Unsupported(format!(
                        "fan curve point ({}%, {} degC)",
                        point.speed, point.temperature
                    ))
                };

                Ok((
                    point.temperature,
                    point.speed.try_into().map_err(out_of_range)?,
                ))
            })
            .collect::<DeviceResult<Box<[_]>>>()?;

        let new_curve = FanCurve {
            points,
            allowed_ranges: current.allowed_ranges,
        };

        debug!("{}: setting pmfw curve {new_curve:?}", self.card);

        self.handle.set_fan_curve(&new_curve)?.commit()?;

        Ok(())
    }

    fn supports_zero_rpm(&self) -> DeviceResult<bool> {
        Ok(self.handle.get_fan_zero_rpm_enable().is_ok())
    }

    fn zero_rpm(&self) -> DeviceResult<bool> {
        Ok(self.handle.get_fan_zero_rpm_enable()?)
    }

    fn set_zero_rpm(&self, enabled: bool) -> DeviceResult<()> {
        self.handle.set_fan_zero_rpm_enable(enabled)?.commit()?;

        Ok(())
    }

    fn is_preset_active(&self, preset: Preset) -> DeviceResult<bool> {
        let level = self.handle.get_power_force_performance_level()?;

        Ok(level == performance_level(preset))
    }

    // Hand the clocks back to the driver and restore the factory
    // clocks table and fan curve
    fn reset_to_factory(&self) -> DeviceResult<()> {
        self.handle
            .set_power_force_performance_level(PerformanceLevel::Auto)?;
        self.handle.reset_clocks_table()?;

        if self.handle.get_fan_curve().is_ok() {
            self.handle.reset_fan_curve()?;
        }

        debug!("{}: restored factory tuning", self.card);

        Ok(())
    }
}

// Current value of a clocks table parameter. The voltage is the one used
// at the maximum core clock, tables without a voltage curve report none.
fn clock_value(table: &ClocksTableGen, parameter: Parameter) -> Option<i32> {
    match parameter {
        Parameter::GpuMinFrequency => table.get_current_sclk_range().min,
        Parameter::GpuMaxFrequency => table.get_max_sclk(),
        Parameter::GpuVoltage => table.get_max_sclk_voltage(),
        Parameter::VramMaxFrequency => table.get_max_mclk(),
        Parameter::PowerLimit => None,
    }
}

fn clock_range(
    table: &ClocksTableGen,
    parameter: Parameter,
) -> Option<(i32, i32)> {
    let range = match parameter {
        Parameter::GpuMinFrequency => table.get_min_sclk_range(),
        Parameter::GpuMaxFrequency => table.get_max_sclk_range(),
        Parameter::GpuVoltage => table.get_max_voltage_range(),
        Parameter::VramMaxFrequency => table.get_max_mclk_range(),
        Parameter::PowerLimit => None,
    };

    range.and_then(|range| range.into_full())
}

fn update_clocks_table(
    table: &mut ClocksTableGen,
    parameter: Parameter,
    value: i32,
) -> DeviceResult<()> {
    match parameter {
        Parameter::GpuMinFrequency => table.set_min_sclk(value)?,
        Parameter::GpuMaxFrequency => table.set_max_sclk(value)?,
        Parameter::GpuVoltage => table.set_max_voltage(value)?,
        Parameter::VramMaxFrequency => table.set_max_mclk(value)?,
        Parameter::PowerLimit => {
            return Err(DeviceError::Unsupported(
                "power limit in the clocks table".into(),
            ));
        }
    }

    Ok(())
}

// Power cap as a whole percent offset from the default cap. Reads and
// ranges share this conversion, truncating toward zero keeps a cap that
// lies inside the allowed caps inside the reported range.
fn cap_to_percent(cap: f64, default: f64) -> i32 {
    let percent = (cap - default) * 100.0 / default;

    // Drop float noise first, 15% must not read back as 14
    ((percent * 1e6).round() / 1e6).trunc() as i32
}

fn percent_to_cap(percent: i32, default: f64) -> f64 {
    default + default * f64::from(percent) / 100.0
}

// Forced performance level standing for each preset
fn performance_level(preset: Preset) -> PerformanceLevel {
    match preset {
        Preset::PowerSaver => PerformanceLevel::Low,
        Preset::Quiet => PerformanceLevel::ProfileMinSclk,
        Preset::Balanced => PerformanceLevel::ProfileStandard,
        Preset::Turbo => PerformanceLevel::High,
        Preset::Rage => PerformanceLevel::ProfilePeak,
    }
}

// List the amdgpu cards in card number order, connector entries such as
// card0-DP-1 are skipped
fn amdgpu_cards(drm_root: &Path) -> Result<Vec<(String, GpuHandle)>> {
    let entries =
        fs::read_dir(drm_root).map_err(|err| TuneError::Initialization {
            reason: format!("Failed to read {:?}: {err}", drm_root),
        })?;

    let mut cards: Vec<(u32, String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let number = name.strip_prefix("card")?.parse::<u32>().ok()?;

            Some((number, name, entry.path().join("device")))
        })
        .collect();

    cards.sort_by_key(|(number, _, _)| *number);

    Ok(cards
        .into_iter()
        .filter_map(|(_, name, device_path)| {
            match GpuHandle::new_from_path(device_path) {
                Ok(handle) if handle.get_driver() == AMDGPU_DRIVER => {
                    Some((name, handle))
                }
                Ok(handle) => {
                    debug!("Skipping {name}, driver {}", handle.get_driver());
                    None
                }
                Err(err) => {
                    debug!("Skipping {name}: {err}");
                    None
                }
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        gpu_state::GpuState,
        reconciler::{Outcome, Reconciler},
    };

    // Navi style table with a voltage curve, values match the built-in
    // profile
    const CLOCKS_TABLE: &str = "\
OD_SCLK:
0: 2400Mhz
1: 2500Mhz
OD_MCLK:
1: 2614MHz
OD_VDDC_CURVE:
0: 800MHz 711mV
1: 1650MHz 851mV
2: 2500MHz 1125mV
OD_RANGE:
SCLK:     500Mhz       3000Mhz
MCLK:     625Mhz       3000Mhz
VDDC_CURVE_SCLK[0]:     500Mhz       3000Mhz
VDDC_CURVE_VOLT[0]:     750mV        1200mV
VDDC_CURVE_SCLK[1]:     500Mhz       3000Mhz
VDDC_CURVE_VOLT[1]:     750mV        1200mV
VDDC_CURVE_SCLK[2]:     500Mhz       3000Mhz
VDDC_CURVE_VOLT[2]:     750mV        1200mV
";

    // RDNA3 style table, only a voltage offset is exposed
    const OFFSET_CLOCKS_TABLE: &str = "\
OD_SCLK:
0: 500Mhz
1: 2500Mhz
OD_MCLK:
0: 97Mhz
1: 1250MHz
OD_VDDGFX_OFFSET:
0mV
OD_RANGE:
SCLK:     500Mhz       3150Mhz
MCLK:      97Mhz       1500Mhz
";

    const FAN_CURVE: &str = "\
OD_FAN_CURVE:
0: 55C 23%
1: 70C 30%
2: 79C 41%
3: 88C 54%
4: 95C 80%
OD_RANGE:
FAN_CURVE(hotspot temp): 25C 100C
FAN_CURVE(fan speed): 15% 100%
";

    const ZERO_RPM: &str =
        "FAN_ZERO_RPM_ENABLE:\n1\nOD_RANGE:\nZERO_RPM_ENABLE: 0 1\n";

    fn write(path: PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    // Build a fake drm class directory with an NVIDIA card0, an AMD
    // card1 and a connector entry. The AMD card matches the built-in
    // profile with the power cap 15% above default.
    fn fake_sysfs(clocks_table: &str) -> (TempDir, PathBuf) {
        let root = TempDir::new().unwrap();
        let drm = root.path().join("drm");

        write(drm.join("card0/device/uevent"), "DRIVER=nvidia\n");
        fs::create_dir_all(drm.join("card1-DP-1")).unwrap();

        let amd = drm.join("card1/device");
        write(
            amd.join("uevent"),
            "DRIVER=amdgpu\nPCI_ID=1002:731F\nPCI_SUBSYS_ID=1DA2:E409\n\
             PCI_SLOT_NAME=0000:03:00.0\n",
        );
        write(amd.join("pp_od_clk_voltage"), clocks_table);
        write(amd.join("gpu_od/fan_ctrl/fan_curve"), FAN_CURVE);
        write(amd.join("gpu_od/fan_ctrl/fan_zero_rpm_enable"), ZERO_RPM);
        write(amd.join("power_dpm_force_performance_level"), "manual\n");

        let hwmon = amd.join("hwmon/hwmon4");
        write(hwmon.join("name"), "amdgpu\n");
        write(hwmon.join("power1_cap"), "230000000\n");
        write(hwmon.join("power1_cap_default"), "200000000\n");
        write(hwmon.join("power1_cap_min"), "179000000\n");
        write(hwmon.join("power1_cap_max"), "233000000\n");

        (root, drm)
    }

    fn device_file(drm: &Path, file: &str) -> String {
        fs::read_to_string(drm.join("card1/device").join(file)).unwrap()
    }

    #[test]
    fn opens_first_amd_card() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        assert_eq!(device.card(), "card1");
        assert!(matches!(
            AmdgpuDevice::open(&drm, 1),
            Err(TuneError::Initialization { .. })
        ));
    }

    #[test]
    fn open_requires_overdrive() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        fs::remove_file(drm.join("card1/device/pp_od_clk_voltage")).unwrap();

        let err = AmdgpuDevice::open(&drm, 0).err().unwrap();
        assert!(err.to_string().contains("ppfeaturemask"));
    }

    #[test]
    fn open_fails_without_drm_directory() {
        let root = TempDir::new().unwrap();

        assert!(matches!(
            AmdgpuDevice::open(&root.path().join("missing"), 0),
            Err(TuneError::Initialization { .. })
        ));
    }

    #[test]
    fn reads_clock_values_and_ranges() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        assert_eq!(device.value(Parameter::GpuMinFrequency).unwrap(), 2400);
        assert_eq!(device.value(Parameter::GpuMaxFrequency).unwrap(), 2500);
        assert_eq!(device.value(Parameter::GpuVoltage).unwrap(), 1125);
        assert_eq!(device.value(Parameter::VramMaxFrequency).unwrap(), 2614);

        assert_eq!(
            device.value_range(Parameter::GpuMaxFrequency).unwrap(),
            IntRange::new(500, 3000, 1)
        );
        assert_eq!(
            device.value_range(Parameter::GpuVoltage).unwrap(),
            IntRange::new(750, 1200, 1)
        );
    }

    #[test]
    fn clocks_table_updates() {
        let mut table = ClocksTableGen::from_str(CLOCKS_TABLE).unwrap();

        update_clocks_table(&mut table, Parameter::GpuMaxFrequency, 2600)
            .unwrap();
        update_clocks_table(&mut table, Parameter::GpuVoltage, 1100).unwrap();

        assert_eq!(table.get_max_sclk(), Some(2600));
        assert_eq!(table.get_max_sclk_voltage(), Some(1100));

        assert!(
            update_clocks_table(&mut table, Parameter::GpuMaxFrequency, 5000)
                .is_err()
        );
        assert!(
            update_clocks_table(&mut table, Parameter::PowerLimit, 10).is_err()
        );
    }

    #[test]
    fn power_limit_read_and_range_agree() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        assert_eq!(device.value(Parameter::PowerLimit).unwrap(), 15);

        // Caps at -10.5% and +16.5% of the default
        let range = device.value_range(Parameter::PowerLimit).unwrap();
        assert_eq!(range, IntRange::new(-10, 16, 1));

        write(
            drm.join("card1/device/hwmon/hwmon4/power1_cap"),
            "233000000\n",
        );
        let value = device.value(Parameter::PowerLimit).unwrap();

        assert_eq!(value, 16);
        assert!(range.clamp_and_validate(value).is_ok());
    }

    #[test]
    fn power_limit_write_reads_back() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        device.set_value(Parameter::PowerLimit, 5).unwrap();

        assert_eq!(device.value(Parameter::PowerLimit).unwrap(), 5);
        assert_eq!(cap_to_percent(percent_to_cap(15, 212.0), 212.0), 15);
        assert_eq!(cap_to_percent(percent_to_cap(-7, 212.0), 212.0), -7);
    }

    #[test]
    fn fan_curve_and_zero_rpm() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        let curve = device.fan_curve().unwrap();
        assert_eq!(curve.len(), 5);
        assert_eq!(curve[0], FanCurvePoint { speed: 23, temperature: 55 });

        let ranges = device.fan_curve_ranges().unwrap();
        assert_eq!(ranges.speed, IntRange::new(15, 100, 1));
        assert_eq!(ranges.temperature, IntRange::new(25, 100, 1));

        assert!(device.supports_zero_rpm().unwrap());
        assert!(device.zero_rpm().unwrap());

        fs::remove_file(drm.join("card1/device/gpu_od/fan_ctrl/fan_zero_rpm_enable"))
            .unwrap();
        assert!(!device.supports_zero_rpm().unwrap());
    }

    #[test]
    fn only_default_memory_timing() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        assert_eq!(device.memory_timing().unwrap(), 0);
        assert_eq!(device.supported_memory_timings().unwrap(), vec![0]);
        assert!(device.set_memory_timing(0).is_ok());
        assert!(matches!(
            device.set_memory_timing(1),
            Err(DeviceError::Unsupported(_))
        ));
    }

    #[test]
    fn presets_map_to_performance_levels() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        for preset in Preset::ALL {
            assert!(!device.is_preset_active(preset).unwrap());
        }

        write(
            drm.join("card1/device/power_dpm_force_performance_level"),
            "high\n",
        );
        assert!(device.is_preset_active(Preset::Turbo).unwrap());
        assert!(!device.is_preset_active(Preset::Rage).unwrap());
    }

    #[test]
    fn reset_returns_clocks_to_the_driver() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        device.reset_to_factory().unwrap();

        assert_eq!(
            device_file(&drm, "power_dpm_force_performance_level").trim(),
            "auto"
        );
    }

    #[test]
    fn built_in_profile_fits_the_card() {
        let (_root, drm) = fake_sysfs(CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();
        let target = GpuState::default_target();

        let gpu = &target.gpu_tuning;
        for (parameter, value) in [
            (Parameter::GpuMinFrequency, gpu.min_freq),
            (Parameter::GpuMaxFrequency, gpu.max_freq),
            (Parameter::GpuVoltage, gpu.voltage),
            (Parameter::VramMaxFrequency, target.vram_tuning.max_freq),
            (Parameter::PowerLimit, target.power_tuning.power_limit),
        ] {
            let range = device.value_range(parameter).unwrap();
            assert_eq!(range.clamp_and_validate(value).unwrap(), value);
        }

        assert_eq!(
            Reconciler::new(&device).run(&target).unwrap(),
            Outcome::NoOp
        );
        assert_eq!(device_file(&drm, "pp_od_clk_voltage"), CLOCKS_TABLE);
    }

    #[test]
    fn offset_only_card_fails_before_writing() {
        let (_root, drm) = fake_sysfs(OFFSET_CLOCKS_TABLE);
        let device = AmdgpuDevice::open(&drm, 0).unwrap();

        assert!(matches!(
            device.value(Parameter::GpuVoltage),
            Err(DeviceError::NotReported(_))
        ));

        let err = Reconciler::new(&device)
            .run(&GpuState::default_target())
            .unwrap_err();

        assert!(matches!(
            err,
            TuneError::HardwareRead {
                parameter: "GPUVoltage",
                ..
            }
        ));
        assert_eq!(device_file(&drm, "pp_od_clk_voltage"), OFFSET_CLOCKS_TABLE);
    }
}
