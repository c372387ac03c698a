use std::fmt;

use tracing::{debug, info, trace};

use crate::{
    channel::TuningChannel,
    device::{Parameter, TuningDevice},
    errors::Result,
    fan_curve::FanCurveController,
    gpu_state::{FanTuning, GpuState, GpuTuning, PowerTuning, VramTuning},
    memory_timing,
    preset::PresetResetGuard,
};

// Progress of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    PresetCleared,
    Captured,
    Applying,
    Done,
}

// Result of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    // The device state differed and the target was written
    Applied,
    // The device already matched the target, nothing was written
    NoOp,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// Bring the device state to a target state.
// The reconciler borrows the single device handle of the process, every
// call is sequential and nothing is rolled back when a step fails:
// parameters written before the failure stay applied.
pub struct Reconciler<'a, D: TuningDevice + ?Sized> {
    device: &'a D,
    phase: Phase,
}

impl<'a, D: TuningDevice + ?Sized> Reconciler<'a, D> {
    pub fn new(device: &'a D) -> Self {
        Self {
            device,
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    // Run the whole state machine: clear any preset, capture the device
    // state, compare it with the target and write the target if needed
    pub fn run(&mut self, target: &GpuState) -> Result<Outcome> {
        target.validate()?;

        PresetResetGuard::new(self.device).ensure_manual_mode()?;
        self.advance(Phase::PresetCleared);

        let current = self.capture()?;
        self.advance(Phase::Captured);

        if current == *target {
            info!("Current GPU state matches target");
            self.advance(Phase::Done);

            return Ok(Outcome::NoOp);
        }

        for path in target.differences(&current) {
            info!("Field {path} differs from target");
        }

        if self.zero_rpm_unreachable(target) {
            info!(
                "Zero RPM is not supported by the GPU, a target with zeroRpm \
                 enabled never matches the GPU state"
            );
        }

        self.advance(Phase::Applying);
        self.apply(target)?;
        self.advance(Phase::Done);

        Ok(Outcome::Applied)
    }

    // Return the fields that a run would write, without touching the
    // device state
    pub fn plan(&self, target: &GpuState) -> Result<Vec<String>> {
        target.validate()?;

        let current = self.capture()?;

        Ok(target.differences(&current))
    }

    // Read every tunable parameter into a fresh snapshot
    pub fn capture(&self) -> Result<GpuState> {
        let gpu_tuning = GpuTuning {
            min_freq: self.channel(Parameter::GpuMinFrequency).read()?,
            max_freq: self.channel(Parameter::GpuMaxFrequency).read()?,
            voltage: self.channel(Parameter::GpuVoltage).read()?,
        };

        let vram_tuning = VramTuning {
            memory_timing: memory_timing::read_memory_timing(self.device)?,
            max_freq: self.channel(Parameter::VramMaxFrequency).read()?,
        };

        let fan = FanCurveController::new(self.device);
        let fan_tuning =
            FanTuning::from_points(fan.read_zero_rpm()?, &fan.read_curve()?);

        let power_tuning = PowerTuning {
            power_limit: self.channel(Parameter::PowerLimit).read()?,
        };

        let state = GpuState {
            gpu_tuning,
            vram_tuning,
            fan_tuning,
            power_tuning,
        };

        trace!("Captured GPU state: {:?}", state);

        Ok(state)
    }

    // Write the target in the fixed order: core clocks and voltage, VRAM
    // timing and clock, zero RPM and fan curve, power limit.
    // The first failure aborts the remaining steps.
    pub fn apply(&self, target: &GpuState) -> Result<()> {
        target.validate()?;

        let gpu = &target.gpu_tuning;
        self.channel(Parameter::GpuMinFrequency).write(gpu.min_freq)?;
        self.channel(Parameter::GpuMaxFrequency).write(gpu.max_freq)?;
        self.channel(Parameter::GpuVoltage).write(gpu.voltage)?;

        let vram = &target.vram_tuning;
        memory_timing::write_memory_timing(self.device, vram.memory_timing)?;
        self.channel(Parameter::VramMaxFrequency).write(vram.max_freq)?;

        let fan = &target.fan_tuning;
        let controller = FanCurveController::new(self.device);
        controller.apply_zero_rpm(fan.zero_rpm)?;
        controller.write_curve(&fan.points())?;

        self.channel(Parameter::PowerLimit)
            .write(target.power_tuning.power_limit)?;

        Ok(())
    }

    // Whether the target asks for a zero RPM mode the device lacks.
    // The captured zeroRpm is then always false.
    fn zero_rpm_unreachable(&self, target: &GpuState) -> bool {
        target.fan_tuning.zero_rpm
            && !FanCurveController::new(self.device).supports_zero_rpm()
    }

    fn channel(&self, parameter: Parameter) -> TuningChannel<'a, D> {
        TuningChannel::new(self.device, parameter)
    }

    fn advance(&mut self, phase: Phase) {
        debug!("Reconciler: {} -> {}", self.phase, phase);

        self.phase = phase;
    }
}
