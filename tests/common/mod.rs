#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};

use gpu_tune::{
    device::{
        DeviceError, DeviceResult, FanCurvePoint, FanCurveRanges, Parameter,
        Preset, TuningDevice,
    },
    gpu_state::GpuState,
    range::IntRange,
};

// Every mutating call received by the fake, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetValue(Parameter, i32),
    SetMemoryTiming(i32),
    SetZeroRpm(bool),
    SetFanCurve(Vec<FanCurvePoint>),
    ResetToFactory,
}

// In memory GPU that stores what is written and records every write
pub struct FakeDevice {
    pub values: RefCell<HashMap<Parameter, i32>>,
    pub ranges: HashMap<Parameter, IntRange>,
    pub memory_timing: Cell<i32>,
    pub supported_timings: Vec<i32>,
    pub curve: RefCell<Vec<FanCurvePoint>>,
    pub curve_ranges: FanCurveRanges,
    pub zero_rpm_supported: bool,
    pub zero_rpm: Cell<bool>,
    pub active_preset: Cell<Option<Preset>>,
    pub fail_on: Option<Parameter>,
    pub calls: RefCell<Vec<Call>>,
}

impl FakeDevice {
    // A device whose captured state equals `state`
    pub fn matching(state: &GpuState) -> Self {
        let values = HashMap::from([
            (Parameter::GpuMinFrequency, state.gpu_tuning.min_freq),
            (Parameter::GpuMaxFrequency, state.gpu_tuning.max_freq),
            (Parameter::GpuVoltage, state.gpu_tuning.voltage),
            (Parameter::VramMaxFrequency, state.vram_tuning.max_freq),
            (Parameter::PowerLimit, state.power_tuning.power_limit),
        ]);

        let ranges = HashMap::from([
            (Parameter::GpuMinFrequency, IntRange::new(500, 3500, 1)),
            (Parameter::GpuMaxFrequency, IntRange::new(500, 3500, 1)),
            (Parameter::GpuVoltage, IntRange::new(500, 1200, 1)),
            (Parameter::VramMaxFrequency, IntRange::new(2000, 3000, 1)),
            (Parameter::PowerLimit, IntRange::new(-10, 15, 1)),
        ]);

        Self {
            values: RefCell::new(values),
            ranges,
            memory_timing: Cell::new(state.vram_tuning.memory_timing.raw()),
            supported_timings: vec![0, 1, 2],
            curve: RefCell::new(state.fan_tuning.points()),
            curve_ranges: FanCurveRanges {
                speed: IntRange::new(0, 100, 1),
                temperature: IntRange::new(25, 100, 1),
            },
            zero_rpm_supported: true,
            zero_rpm: Cell::new(state.fan_tuning.zero_rpm),
            active_preset: Cell::new(None),
            fail_on: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl TuningDevice for FakeDevice {
    fn value(&self, parameter: Parameter) -> DeviceResult<i32> {
        self.values
            .borrow()
            .get(&parameter)
            .copied()
            .ok_or_else(|| DeviceError::Unsupported(parameter.to_string()))
    }

    fn value_range(&self, parameter: Parameter) -> DeviceResult<IntRange> {
        self.ranges
            .get(&parameter)
            .copied()
            .ok_or_else(|| DeviceError::Unsupported(parameter.to_string()))
    }

    fn set_value(&self, parameter: Parameter, value: i32) -> DeviceResult<()> {
        if self.fail_on == Some(parameter) {
            return Err(DeviceError::Unsupported("injected failure".into()));
        }

        self.values.borrow_mut().insert(parameter, value);
        self.record(Call::SetValue(parameter, value));

        Ok(())
    }

    fn memory_timing(&self) -> DeviceResult<i32> {
        Ok(self.memory_timing.get())
    }

    fn supported_memory_timings(&self) -> DeviceResult<Vec<i32>> {
        Ok(self.supported_timings.clone())
    }

    fn set_memory_timing(&self, timing: i32) -> DeviceResult<()> {
        self.memory_timing.set(timing);
        self.record(Call::SetMemoryTiming(timing));

        Ok(())
    }

    fn fan_curve(&self) -> DeviceResult<Vec<FanCurvePoint>> {
        Ok(self.curve.borrow().clone())
    }

    fn fan_curve_ranges(&self) -> DeviceResult<FanCurveRanges> {
        Ok(self.curve_ranges)
    }

    fn set_fan_curve(&self, points: &[FanCurvePoint]) -> DeviceResult<()> {
        *self.curve.borrow_mut() = points.to_vec();
        self.record(Call::SetFanCurve(points.to_vec()));

        Ok(())
    }

    fn supports_zero_rpm(&self) -> DeviceResult<bool> {
        Ok(self.zero_rpm_supported)
    }

    fn zero_rpm(&self) -> DeviceResult<bool> {
        Ok(self.zero_rpm.get())
    }

    fn set_zero_rpm(&self, enabled: bool) -> DeviceResult<()> {
        self.zero_rpm.set(enabled);
        self.record(Call::SetZeroRpm(enabled));

        Ok(())
    }

    fn is_preset_active(&self, preset: Preset) -> DeviceResult<bool> {
        Ok(self.active_preset.get() == Some(preset))
    }

    fn reset_to_factory(&self) -> DeviceResult<()> {
        self.active_preset.set(None);
        self.record(Call::ResetToFactory);

        Ok(())
    }
}
