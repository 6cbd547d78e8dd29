//! The predictive dosing state machine.
//!
//! Consumes estimator outputs and polled user intents once per loop
//! iteration, drives the actuator, learns a flow-rate-proportional bias from
//! observed overshoot, and runs the two-point calibration flow. All timing is
//! deadline checks against the caller-supplied wrapping millisecond clock;
//! nothing here blocks and nothing returns an error at runtime.

use gravidose_traits::{Actuator, PersistentStore, UserInput};

use crate::config::{CalibrationCfg, ControlCfg};
use crate::estimator::Estimator;
use crate::fixed_point::span_factor_q16;
use crate::status::{ControllerState, StopCause};
use crate::util::{clamp_i32, due, elapsed_ms};

/// Persistent store keys used by the core.
pub mod keys {
    pub const CAL_Q16: &str = "cal_q16";
    pub const TARE_RAW: &str = "tare_raw";
    pub const SETPOINT_MG: &str = "setpoint";
    pub const KV: &str = "kv";
}

#[derive(Debug)]
pub struct DosingController<A, P, U> {
    pub(crate) est: Estimator,
    actuator: A,
    store: P,
    input: U,
    control: ControlCfg,
    calibration: CalibrationCfg,

    state: ControllerState,
    stop_cause: Option<StopCause>,
    setpoint_mg: i32,
    /// Setpoint changed since the last persist. Flushed when the display
    /// hold expires, or at done-hold expiry when a run pre-empted it.
    setpoint_dirty: bool,
    /// Learned correction, mg per (g/s). Reset to zero on recalibration.
    kv_mg_per_gps: f32,
    /// Flow rate captured at the stop command, for the learning update.
    last_v_stop_gps: f32,

    // deadlines on the wrapping ms clock; explicit fields, never statics,
    // so multiple controllers stay independently testable
    show_since: Option<u32>,
    measure_since: Option<u32>,
    done_since: Option<u32>,
    hint_since: Option<u32>,
    err_since: Option<u32>,

    /// Zero-point raw capture for the span calibration.
    cal_raw0: i32,
}

impl<A, P, U> DosingController<A, P, U>
where
    A: Actuator,
    P: PersistentStore,
    U: UserInput,
{
    pub(crate) fn from_parts(
        est: Estimator,
        actuator: A,
        store: P,
        input: U,
        control: ControlCfg,
        calibration: CalibrationCfg,
        setpoint_mg: i32,
        kv_mg_per_gps: f32,
    ) -> Self {
        Self {
            est,
            actuator,
            store,
            input,
            control,
            calibration,
            state: ControllerState::Idle,
            stop_cause: None,
            setpoint_mg,
            setpoint_dirty: false,
            kv_mg_per_gps,
            last_v_stop_gps: 0.0,
            show_since: None,
            measure_since: None,
            done_since: None,
            hint_since: None,
            err_since: None,
            cal_raw0: 0,
        }
    }

    /// Feed one raw ADC conversion into the estimator. Returns whether the
    /// sample was accepted (false = dropped by period decimation).
    pub fn ingest_sample(&mut self, counts: i32, t_ms: u32) -> bool {
        self.est.ingest(counts, t_ms)
    }

    /// One control iteration. Call after `ingest_sample` within the same loop
    /// pass so decisions act on same-iteration-fresh estimates.
    pub fn tick(&mut self, now_ms: u32) {
        self.est.check_liveness(now_ms);
        self.track_fault(now_ms);

        self.handle_calibration_press(now_ms);
        self.handle_setpoint_delta(now_ms);
        self.handle_show_expiry(now_ms);
        self.handle_tare(now_ms);
        self.handle_start_stop(now_ms);
        self.run_predictive_cutoff(now_ms);
        self.handle_done_hold_expiry(now_ms);
    }

    fn track_fault(&mut self, now_ms: u32) {
        if self.est.is_ok() {
            self.err_since = None;
        } else if self.err_since.is_none() {
            self.err_since = Some(now_ms);
        }
    }

    fn handle_calibration_press(&mut self, now_ms: u32) {
        if !self.input.calibration_advance_requested() {
            return;
        }
        match self.state {
            ControllerState::Idle | ControllerState::ShowSetpoint => {
                if self.control.require_stable_for_cal && !self.est.is_stable() {
                    self.show_hint(now_ms);
                    return;
                }
                self.cal_raw0 = self.est.raw_no_tare();
                tracing::info!(raw0 = self.cal_raw0, "calibration zero point captured");
                self.state = ControllerState::CalSpanPending;
            }
            ControllerState::CalSpanPending => {
                if self.control.require_stable_for_cal && !self.est.is_stable() {
                    self.show_hint(now_ms);
                    return;
                }
                self.finish_span_calibration(now_ms);
            }
            // blocked mid-run; a hint instead of an error keeps run context
            ControllerState::Measuring | ControllerState::DoneHold => {
                self.show_hint(now_ms);
            }
        }
    }

    fn finish_span_calibration(&mut self, now_ms: u32) {
        let raw1 = self.est.raw_no_tare();
        let dcounts = raw1 - self.cal_raw0;
        let mut factor = span_factor_q16(self.calibration.span_mass_mg, dcounts);
        if factor <= 0 {
            // degenerate span: keep a usable factor in effect, silently
            tracing::warn!(dcounts, factor, "degenerate span, using default factor");
            factor = self.calibration.default_mg_per_count_q16;
        }
        self.est.set_cal_factor_q16(factor);
        self.store.save_i32(keys::CAL_Q16, factor);
        tracing::info!(key = keys::CAL_Q16, value = factor, "persisted");

        // the learned bias was defined against the old scale factor and is
        // invalid once mass readings are rescaled
        self.kv_mg_per_gps = 0.0;
        self.store.save_f32(keys::KV, 0.0);
        tracing::info!(key = keys::KV, value = 0.0, "persisted");

        self.enter_done_hold(now_ms, StopCause::CalibrationDone);
    }

    fn handle_setpoint_delta(&mut self, now_ms: u32) {
        let dmg = self.input.setpoint_delta_mg();
        if dmg == 0 {
            return;
        }
        self.setpoint_mg = clamp_i32(
            self.setpoint_mg.saturating_add(dmg),
            0,
            self.control.setpoint_max_mg,
        );
        self.setpoint_dirty = true;
        self.show_since = Some(now_ms);
        if self.state == ControllerState::Idle {
            self.state = ControllerState::ShowSetpoint;
        }
    }

    fn handle_show_expiry(&mut self, now_ms: u32) {
        if self.state != ControllerState::ShowSetpoint {
            return;
        }
        if let Some(since) = self.show_since
            && due(now_ms, since, self.control.show_setpoint_ms)
        {
            self.show_since = None;
            self.state = ControllerState::Idle;
            self.persist_setpoint();
        }
    }

    fn persist_setpoint(&mut self) {
        self.setpoint_dirty = false;
        self.store.save_i32(keys::SETPOINT_MG, self.setpoint_mg);
        tracing::info!(key = keys::SETPOINT_MG, value = self.setpoint_mg, "persisted");
    }

    fn handle_tare(&mut self, now_ms: u32) {
        if !self.input.tare_requested() {
            return;
        }
        if self.state == ControllerState::Measuring {
            self.show_hint(now_ms);
        } else if !self.control.require_stable_for_tare || self.est.is_stable() {
            self.est.tare();
            self.store.save_i32(keys::TARE_RAW, self.est.tare_raw());
            tracing::info!(key = keys::TARE_RAW, value = self.est.tare_raw(), "persisted");
        } else {
            self.show_hint(now_ms);
        }
    }

    fn handle_start_stop(&mut self, now_ms: u32) {
        if !self.input.start_or_stop_requested() {
            return;
        }
        match self.state {
            ControllerState::Measuring => {
                self.stop_dispense(now_ms, StopCause::ManualStop);
            }
            ControllerState::Idle | ControllerState::ShowSetpoint => {
                self.actuator.set(true);
                let period = if self.est.fast_capable() {
                    self.est_cfg_fast_period()
                } else {
                    self.est_cfg_idle_period()
                };
                self.est.set_sample_period_ms(period);
                self.state = ControllerState::Measuring;
                self.measure_since = Some(now_ms);
                tracing::info!(setpoint_mg = self.setpoint_mg, "dispense start");
            }
            ControllerState::CalSpanPending => {
                tracing::info!("calibration aborted");
                self.state = ControllerState::Idle;
            }
            ControllerState::DoneHold => {}
        }
    }

    fn run_predictive_cutoff(&mut self, now_ms: u32) {
        if self.state != ControllerState::Measuring {
            return;
        }
        let v = self.est.v_hat_mgps();
        let a = self.est.a_hat_mgps2();
        let tau = (self.control.tau_meas_ms + self.control.tau_act_ms + self.control.tau_margin_ms)
            as f32
            / 1000.0;
        // kinematic look-ahead plus learned bias; may go negative under
        // deceleration, which raises the effective target and stops early
        let offset_dyn = v * tau + 0.5 * a * tau * tau + self.kv_mg_per_gps * (v / 1000.0);
        let effective = self.setpoint_mg.saturating_sub(offset_dyn.round() as i32);

        if self.est.fast_mg() + self.control.hysteresis_mg >= effective {
            tracing::debug!(
                fast_mg = self.est.fast_mg(),
                effective,
                v_mgps = v,
                "predictive cutoff"
            );
            self.stop_dispense(now_ms, StopCause::NormalStop);
        } else if let Some(since) = self.measure_since
            && due(now_ms, since, self.control.measure_timeout_ms)
        {
            tracing::warn!("measurement timeout");
            self.stop_dispense(now_ms, StopCause::TimedOut);
        }
    }

    fn stop_dispense(&mut self, now_ms: u32, cause: StopCause) {
        self.last_v_stop_gps = self.est.flow_gps();
        self.actuator.set(false);
        self.measure_since = None;
        self.enter_done_hold(now_ms, cause);
    }

    fn enter_done_hold(&mut self, now_ms: u32, cause: StopCause) {
        self.state = ControllerState::DoneHold;
        self.stop_cause = Some(cause);
        self.done_since = Some(now_ms);
    }

    fn handle_done_hold_expiry(&mut self, now_ms: u32) {
        if self.state != ControllerState::DoneHold {
            return;
        }
        let Some(since) = self.done_since else { return };
        if !due(now_ms, since, self.control.done_hold_ms) {
            return;
        }
        self.done_since = None;
        // consume the cause exactly once
        if self.stop_cause.take() == Some(StopCause::NormalStop) {
            self.learn_from_run();
        }
        self.est.set_sample_period_ms(self.est_cfg_idle_period());
        // a change dialed just before (or during) the run never saw its
        // display hold expire; flush it now that the run is over
        if self.setpoint_dirty {
            self.persist_setpoint();
        }
        self.state = ControllerState::Idle;
    }

    /// EMA the learned bias toward observed-overshoot / stop-flow-rate.
    /// Uses the slow-path reading so post-stop settling transients are
    /// already rejected by the time the hold expires.
    fn learn_from_run(&mut self) {
        let final_mg = self.est.filtered_mg();
        let eps_mg = final_mg - self.setpoint_mg;
        let v = self.last_v_stop_gps.abs().max(self.control.v_min_gps);
        let target_kv = eps_mg as f32 / v;
        let alpha = self.control.kv_ema_alpha;
        self.kv_mg_per_gps = (1.0 - alpha) * self.kv_mg_per_gps + alpha * target_kv;
        self.store.save_f32(keys::KV, self.kv_mg_per_gps);
        tracing::info!(
            eps_mg,
            v_gps = v,
            kv = self.kv_mg_per_gps,
            "run complete, bias updated"
        );
    }

    fn show_hint(&mut self, now_ms: u32) {
        self.hint_since = Some(now_ms);
    }

    fn est_cfg_idle_period(&self) -> u16 {
        self.est_cfg().idle_period_ms
    }

    fn est_cfg_fast_period(&self) -> u16 {
        self.est_cfg().fast_period_ms
    }

    fn est_cfg(&self) -> &crate::config::EstimatorCfg {
        self.est.cfg()
    }

    // ── presentation-layer getters (one-way; never drive control) ────────

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn setpoint_mg(&self) -> i32 {
        self.setpoint_mg
    }

    pub fn filtered_mg(&self) -> i32 {
        self.est.filtered_mg()
    }

    pub fn is_stable(&self) -> bool {
        self.est.is_stable()
    }

    pub fn kv_mg_per_gps(&self) -> f32 {
        self.kv_mg_per_gps
    }

    pub fn actuator_on(&self) -> bool {
        self.actuator.is_on()
    }

    /// Raw sensor liveness fault, undebounced.
    pub fn sensor_fault(&self) -> bool {
        !self.est.is_ok()
    }

    /// Debounced fault overlay for the display layer.
    pub fn fault_overlay(&self, now_ms: u32) -> bool {
        match self.err_since {
            Some(since) if !self.est.is_ok() => {
                elapsed_ms(now_ms, since) > self.control.error_debounce_ms
            }
            _ => false,
        }
    }

    /// Transient "hold still" hint window for the display layer.
    pub fn hint_active(&self, now_ms: u32) -> bool {
        match self.hint_since {
            Some(since) => !due(now_ms, since, self.control.hint_hold_ms),
            None => false,
        }
    }

    pub fn estimator(&self) -> &Estimator {
        &self.est
    }
}
