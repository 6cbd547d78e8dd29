//! Validating builder for [`DosingController`].
//!
//! Mirrors boot: configuration is range-checked, then the persisted
//! calibration factor, tare baseline, setpoint, and learned bias are loaded
//! from the store (with sanity fallbacks) before the controller starts in
//! `Idle`.

use gravidose_traits::{Actuator, PersistentStore, UserInput};

use crate::config::{CalibrationCfg, ControlCfg, EstimatorCfg};
use crate::controller::{DosingController, keys};
use crate::error::{BuildError, Result};
use crate::estimator::Estimator;
use crate::util::clamp_i32;

const DEFAULT_SETPOINT_MG: i32 = 14_000;

pub struct ControllerBuilder<A, P, U> {
    actuator: Option<A>,
    store: Option<P>,
    input: Option<U>,
    estimator: EstimatorCfg,
    control: ControlCfg,
    calibration: CalibrationCfg,
    fast_capable: bool,
    default_setpoint_mg: i32,
}

impl<A, P, U> Default for ControllerBuilder<A, P, U> {
    fn default() -> Self {
        Self {
            actuator: None,
            store: None,
            input: None,
            estimator: EstimatorCfg::default(),
            control: ControlCfg::default(),
            calibration: CalibrationCfg::default(),
            fast_capable: false,
            default_setpoint_mg: DEFAULT_SETPOINT_MG,
        }
    }
}

impl<A, P, U> ControllerBuilder<A, P, U>
where
    A: Actuator,
    P: PersistentStore,
    U: UserInput,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actuator(mut self, actuator: A) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn with_store(mut self, store: P) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_input(mut self, input: U) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_estimator_cfg(mut self, cfg: EstimatorCfg) -> Self {
        self.estimator = cfg;
        self
    }

    pub fn with_control_cfg(mut self, cfg: ControlCfg) -> Self {
        self.control = cfg;
        self
    }

    pub fn with_calibration_cfg(mut self, cfg: CalibrationCfg) -> Self {
        self.calibration = cfg;
        self
    }

    /// Whether the converter supports the fast sampling rate (auto-detected
    /// by the source driver).
    pub fn with_fast_capable(mut self, yes: bool) -> Self {
        self.fast_capable = yes;
        self
    }

    pub fn with_default_setpoint_mg(mut self, mg: i32) -> Self {
        self.default_setpoint_mg = mg;
        self
    }

    /// Validate, load persisted state, and build.
    pub fn build(self, now_ms: u32) -> Result<DosingController<A, P, U>> {
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        let mut store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        let input = self
            .input
            .ok_or_else(|| eyre::Report::new(BuildError::MissingInput))?;

        validate_estimator(&self.estimator)?;
        validate_control(&self.control)?;
        validate_calibration(&self.calibration)?;

        // Persisted values, each with a last-known-good fallback.
        let mut cal_q16 = store.load_i32(keys::CAL_Q16, self.calibration.default_mg_per_count_q16);
        if cal_q16 <= 0 {
            cal_q16 = self.calibration.default_mg_per_count_q16;
        }
        let tare_raw = store.load_i32(keys::TARE_RAW, 0);
        let setpoint_mg = clamp_i32(
            store.load_i32(keys::SETPOINT_MG, self.default_setpoint_mg),
            0,
            self.control.setpoint_max_mg,
        );
        let mut kv = store.load_f32(keys::KV, 0.0);
        if !kv.is_finite() {
            kv = 0.0;
        }
        tracing::info!(cal_q16, tare_raw, setpoint_mg, kv, "restored persisted state");

        let mut est = Estimator::new(self.estimator, cal_q16, now_ms);
        est.set_tare_raw(tare_raw);
        est.set_fast_capable(self.fast_capable);

        Ok(DosingController::from_parts(
            est,
            actuator,
            store,
            input,
            self.control,
            self.calibration,
            setpoint_mg,
            kv,
        ))
    }
}

fn validate_estimator(cfg: &EstimatorCfg) -> Result<()> {
    if cfg.idle_period_ms == 0 || cfg.fast_period_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "sample periods must be >= 1 ms",
        )));
    }
    if cfg.fast_period_ms > cfg.idle_period_ms {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "fast period must not exceed idle period",
        )));
    }
    if cfg.iir_alpha_div < 1 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "iir_alpha_div must be >= 1",
        )));
    }
    if cfg.notready_mult == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "notready_mult must be >= 1",
        )));
    }
    if cfg.stability.window_samples < 2 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "stability window must hold at least 2 samples",
        )));
    }
    if cfg.stability.stddev_mg < 0 || cfg.stability.p2p_mg < 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "stability thresholds must be >= 0",
        )));
    }
    for g in [cfg.alpha_g, cfg.beta_h, cfg.accel_ema_w] {
        if !(g.is_finite() && g > 0.0 && g <= 1.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "estimator gains must be in (0, 1]",
            )));
        }
    }
    Ok(())
}

fn validate_control(cfg: &ControlCfg) -> Result<()> {
    if cfg.hysteresis_mg < 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "hysteresis_mg must be >= 0",
        )));
    }
    if cfg.setpoint_max_mg <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "setpoint_max_mg must be > 0",
        )));
    }
    if cfg.measure_timeout_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "measure_timeout_ms must be > 0",
        )));
    }
    if !(cfg.v_min_gps.is_finite() && cfg.v_min_gps > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "v_min_gps must be finite and > 0",
        )));
    }
    if !(cfg.kv_ema_alpha.is_finite() && cfg.kv_ema_alpha > 0.0 && cfg.kv_ema_alpha <= 1.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "kv_ema_alpha must be in (0, 1]",
        )));
    }
    Ok(())
}

fn validate_calibration(cfg: &CalibrationCfg) -> Result<()> {
    if cfg.default_mg_per_count_q16 <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "default calibration factor must be > 0",
        )));
    }
    if cfg.span_mass_mg <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "span_mass_mg must be > 0",
        )));
    }
    Ok(())
}
