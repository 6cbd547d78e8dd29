//! Simulated bench: a flow-model load cell behind the `SampleSource` trait,
//! plus the scripted drive loops for the dose and calibration commands.
//!
//! The rig runs on a `ManualClock` advanced 1 ms per iteration, so every run
//! is deterministic and finishes in milliseconds of wall time regardless of
//! how many simulated seconds it covers.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use gravidose_core::mocks::{RecordingActuator, ScriptedInput};
use gravidose_core::{
    ControlLoop, ControllerBuilder, ControllerState, DosingController, DrdyGate,
};
use gravidose_traits::{Clock, ManualClock, SampleSource};

use crate::store::JsonFileStore;

type SimController = DosingController<RecordingActuator, JsonFileStore, ScriptedInput>;

/// Simulated load-cell front end. Clone-handle type so the drive loop keeps
/// a side handle while the control loop owns the other.
#[derive(Clone)]
pub struct SimScale {
    inner: Rc<RefCell<ScaleInner>>,
}

struct ScaleInner {
    mass_mg: f64,
    /// True physical sensitivity of the simulated cell.
    mg_per_count: f64,
    noise_pp: i32,
    rng: u32,
    period_ms: u16,
    since_sample_ms: u32,
    latched: Option<i32>,
}

impl SimScale {
    pub fn new(mg_per_count: f64, noise_pp: i32) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ScaleInner {
                mass_mg: 0.0,
                mg_per_count: mg_per_count.max(1e-6),
                noise_pp: noise_pp.max(0),
                rng: 0x9E37_79B9,
                period_ms: 100,
                since_sample_ms: 0,
                latched: None,
            })),
        }
    }

    pub fn set_mass_mg(&self, mg: f64) {
        self.inner.borrow_mut().mass_mg = mg;
    }

    /// Advance the physics by `dt_ms`; latch a conversion when the sample
    /// period elapses. Returns true on a fresh conversion (the DRDY edge).
    pub fn advance(&self, dt_ms: u32, feeding: bool, flow_mgps: f64) -> bool {
        let mut s = self.inner.borrow_mut();
        if feeding {
            s.mass_mg += flow_mgps * f64::from(dt_ms) / 1000.0;
        }
        s.since_sample_ms += dt_ms;
        if s.since_sample_ms < u32::from(s.period_ms) {
            return false;
        }
        s.since_sample_ms = 0;
        let noise = if s.noise_pp > 0 {
            // xorshift32; deterministic across runs
            s.rng ^= s.rng << 13;
            s.rng ^= s.rng >> 17;
            s.rng ^= s.rng << 5;
            (s.rng % (s.noise_pp as u32 + 1)) as i32 - s.noise_pp / 2
        } else {
            0
        };
        let counts = (s.mass_mg / s.mg_per_count).round() as i32 + noise;
        s.latched = Some(counts);
        true
    }
}

impl SampleSource for SimScale {
    fn is_ready(&mut self) -> bool {
        self.inner.borrow().latched.is_some()
    }
    fn read(&mut self) -> i32 {
        self.inner.borrow_mut().latched.take().unwrap_or(0)
    }
    fn set_sample_period_ms(&mut self, ms: u16) {
        self.inner.borrow_mut().period_ms = ms.max(1);
    }
    fn fast_capable(&self) -> bool {
        true
    }
}

pub struct Bench {
    pub scale: SimScale,
    pub input: ScriptedInput,
    pub ctl: SimController,
    control_loop: ControlLoop<SimScale>,
    gate: DrdyGate,
    clock: ManualClock,
    flow_mgps: f64,
    /// Material still falling after the actuator closes.
    act_lag_ms: u32,
    lag_left_ms: u32,
    was_on: bool,
}

impl Bench {
    const TICK_MS: u32 = 1;

    pub fn new(
        cfg: &gravidose_config::Config,
        state_path: &Path,
        mg_per_count: f64,
        noise_pp: i32,
        flow_gps: f64,
    ) -> eyre::Result<Self> {
        let store = JsonFileStore::open(state_path)?;
        let scale = SimScale::new(mg_per_count, noise_pp);
        let input = ScriptedInput::new();
        let actuator = RecordingActuator::new();
        let clock = ManualClock::new();
        let ctl = ControllerBuilder::new()
            .with_actuator(actuator)
            .with_store(store)
            .with_input(input.clone())
            .with_estimator_cfg(gravidose_core::EstimatorCfg::from(cfg))
            .with_control_cfg(gravidose_core::ControlCfg::from(&cfg.control))
            .with_calibration_cfg(gravidose_core::CalibrationCfg::from(&cfg.calibration))
            .with_fast_capable(true)
            .build(clock.now_ms())?;
        Ok(Self {
            control_loop: ControlLoop::new(scale.clone()),
            scale,
            input,
            ctl,
            gate: DrdyGate::new(),
            clock,
            flow_mgps: flow_gps * 1000.0,
            act_lag_ms: cfg.control.tau_act_ms,
            lag_left_ms: 0,
            was_on: false,
        })
    }

    pub fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    /// One simulated millisecond.
    pub fn tick(&mut self) {
        self.clock.advance(Self::TICK_MS);
        let now = self.clock.now_ms();

        let on = self.ctl.actuator_on();
        if self.was_on && !on {
            // in-flight material keeps landing for the actuator lag
            self.lag_left_ms = self.act_lag_ms;
        }
        self.was_on = on;
        let feeding = on || self.lag_left_ms > 0;
        self.lag_left_ms = self.lag_left_ms.saturating_sub(Self::TICK_MS);

        if self.scale.advance(Self::TICK_MS, feeding, self.flow_mgps) {
            self.gate.notify(now);
        }
        self.control_loop.service(&self.gate, &mut self.ctl, now);
    }

    /// Drive until `done` or the simulated budget runs out.
    pub fn run_until(&mut self, max_ms: u32, mut done: impl FnMut(&SimController) -> bool) -> bool {
        for _ in 0..max_ms {
            self.tick();
            if done(&self.ctl) {
                return true;
            }
        }
        false
    }
}

pub struct DoseSummary {
    pub target_mg: i32,
    pub final_mg: i32,
    pub overshoot_mg: i32,
    pub elapsed_ms: u32,
    pub kv_mg_per_gps: f32,
    pub stopped_early: bool,
}

/// Run one simulated dispense end to end.
pub fn run_dose(
    cfg: &gravidose_config::Config,
    state_path: &Path,
    grams: f32,
    flow_gps: f32,
    noise_pp: i32,
    shutdown: &AtomicBool,
) -> eyre::Result<DoseSummary> {
    if !(grams.is_finite() && grams > 0.0) {
        eyre::bail!("target grams must be positive");
    }
    if !(flow_gps.is_finite() && flow_gps > 0.0) {
        eyre::bail!("flow rate must be positive");
    }
    let target_mg = gravidose_core::util::lround_mg(grams);

    // the simulated cell matches the configured default sensitivity, so an
    // uncalibrated state file still doses accurately
    let mg_per_count = f64::from(cfg.calibration.default_mg_per_count_q16) / 65536.0;
    let mut bench = Bench::new(cfg, state_path, mg_per_count, noise_pp, f64::from(flow_gps))?;

    // dial the target like a user would, then start
    bench.input.turn(target_mg - bench.ctl.setpoint_mg());
    bench.tick();
    bench.input.press_start();
    bench.tick();
    if bench.ctl.state() != ControllerState::Measuring {
        eyre::bail!("dispense did not start");
    }
    tracing::info!(target_mg, flow_gps, "dose start");

    let t0 = bench.now_ms();
    let budget = cfg.control.measure_timeout_ms + cfg.control.done_hold_ms + 5_000;
    let mut stop_sent = false;
    let mut stopped_early = false;
    let mut elapsed = 0;
    let mut finished = false;
    for _ in 0..budget {
        if !stop_sent && shutdown.load(Ordering::Relaxed) {
            tracing::warn!("interrupt: stopping dispense");
            bench.input.press_start();
            stop_sent = true;
            stopped_early = true;
        }
        bench.tick();
        if elapsed == 0 && bench.ctl.state() != ControllerState::Measuring {
            elapsed = bench.now_ms().wrapping_sub(t0);
        }
        if bench.ctl.state() == ControllerState::Idle {
            finished = true;
            break;
        }
    }
    if !finished {
        eyre::bail!("simulated dispense never completed");
    }

    let final_mg = bench.ctl.filtered_mg();
    tracing::info!(final_mg, elapsed_ms = elapsed, "dose complete");
    Ok(DoseSummary {
        target_mg,
        final_mg,
        overshoot_mg: final_mg - target_mg,
        elapsed_ms: elapsed,
        kv_mg_per_gps: bench.ctl.kv_mg_per_gps(),
        stopped_early,
    })
}

pub struct CalSummary {
    pub factor_q16: i32,
    pub ideal_q16: i32,
    pub span_mg: i32,
}

/// Run the two-point calibration flow against a cell whose true sensitivity
/// is 5% off the configured default, so the capture has something to correct.
pub fn run_calibrate(
    cfg: &gravidose_config::Config,
    state_path: &Path,
    noise_pp: i32,
) -> eyre::Result<CalSummary> {
    let span_mg = cfg.calibration.span_mass_mg;
    let mg_per_count = f64::from(cfg.calibration.default_mg_per_count_q16) / 65536.0 * 1.05;
    let mut bench = Bench::new(cfg, state_path, mg_per_count, noise_pp, 0.0)?;

    // zero capture on the empty pan
    if !bench.run_until(15_000, |c| c.is_stable()) {
        eyre::bail!("bench never stabilized for the zero capture");
    }
    bench.input.long_press_cal();
    bench.tick();
    if bench.ctl.state() != ControllerState::CalSpanPending {
        eyre::bail!("zero capture was refused");
    }

    // place the reference mass, wait for quiet, capture the span
    bench.scale.set_mass_mg(f64::from(span_mg));
    if !bench.run_until(30_000, |c| c.is_stable()) {
        eyre::bail!("bench never stabilized on the reference mass");
    }
    bench.input.long_press_cal();
    bench.tick();
    if !bench.run_until(15_000, |c| c.state() == ControllerState::Idle) {
        eyre::bail!("calibration flow never returned to idle");
    }

    let factor_q16 = bench.ctl.estimator().cal_factor_q16();
    let ideal_q16 = (mg_per_count * 65536.0).round() as i32;
    tracing::info!(factor_q16, ideal_q16, "calibration complete");
    Ok(CalSummary {
        factor_q16,
        ideal_q16,
        span_mg,
    })
}

/// Build the rig and exchange a handful of samples: catches config errors,
/// state-file corruption, and a wedged sample path.
pub fn self_check(cfg: &gravidose_config::Config, state_path: &Path) -> eyre::Result<()> {
    let mg_per_count = f64::from(cfg.calibration.default_mg_per_count_q16) / 65536.0;
    let mut bench = Bench::new(cfg, state_path, mg_per_count, 0, 0.0)?;
    if !bench.run_until(10_000, |c| c.is_stable()) {
        eyre::bail!("estimator did not stabilize on a quiet input");
    }
    if bench.ctl.sensor_fault() {
        eyre::bail!("sample path reported a liveness fault");
    }
    Ok(())
}
