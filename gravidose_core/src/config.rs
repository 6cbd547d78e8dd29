//! Runtime configuration structs for the estimator and the dosing controller.
//!
//! These are the in-core types; the TOML-facing schema lives in
//! `gravidose_config` and converts into these via `conversions`.

/// Estimator configuration: sampling cadence, filtering, liveness watchdog,
/// and the fixed α–β gains.
#[derive(Debug, Clone)]
pub struct EstimatorCfg {
    /// Minimum spacing between processed samples while idle (ms).
    pub idle_period_ms: u16,
    /// Spacing while dosing, used only when the converter is fast-capable (ms).
    pub fast_period_ms: u16,
    /// Integer IIR divisor for the display path: `filt += (x - filt) / div`.
    /// The truncating division is deliberate quantized lag, not a true
    /// exponential filter.
    pub iir_alpha_div: i32,
    /// Raw-count offset applied before tare (board-level bias).
    pub raw_offset_counts: i32,
    /// Liveness deadline multiplier over the effective sample period.
    pub notready_mult: u32,
    /// Liveness deadline margin (ms).
    pub notready_margin_ms: u32,
    /// Liveness checks are suppressed for this long after construction (ms).
    pub startup_grace_ms: u32,
    /// α position gain. Fixed constant, not derived at runtime.
    pub alpha_g: f32,
    /// β velocity gain.
    pub beta_h: f32,
    /// EMA weight on the newest dv/dt sample for the acceleration estimate.
    pub accel_ema_w: f32,
    pub stability: StabilityCfg,
}

impl Default for EstimatorCfg {
    fn default() -> Self {
        Self {
            idle_period_ms: 100,
            fast_period_ms: 12,
            iir_alpha_div: 4,
            raw_offset_counts: 0,
            notready_mult: 3,
            notready_margin_ms: 50,
            startup_grace_ms: 1_200,
            alpha_g: 0.4,
            beta_h: 0.08,
            accel_ema_w: 0.2,
            stability: StabilityCfg::default(),
        }
    }
}

/// Quiescence classifier thresholds (applied to the slow/display path).
#[derive(Debug, Clone)]
pub struct StabilityCfg {
    /// Window length; no verdict until full.
    pub window_samples: usize,
    /// Population standard deviation threshold (mg).
    pub stddev_mg: i32,
    /// Peak-to-peak spread threshold (mg).
    pub p2p_mg: i32,
    /// Quiet must persist this long before the flag flips true (ms).
    pub dwell_ms: u32,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            window_samples: 10,
            stddev_mg: 30,
            p2p_mg: 100,
            dwell_ms: 300,
        }
    }
}

/// Dosing state-machine configuration.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Stop once `fast_mg + hysteresis_mg >= effective_target`.
    pub hysteresis_mg: i32,
    /// Setpoint clamp ceiling (mg).
    pub setpoint_max_mg: i32,
    /// Display-hold window after a setpoint change; persists on expiry (ms).
    pub show_setpoint_ms: u32,
    /// Post-stop hold before returning to idle (ms).
    pub done_hold_ms: u32,
    /// Hard cap on a single dispense (ms).
    pub measure_timeout_ms: u32,
    /// Transient user-facing hint duration (ms).
    pub hint_hold_ms: u32,
    /// Sensor fault must persist this long before the overlay shows (ms).
    pub error_debounce_ms: u32,
    /// Time to acquire a confirming sample (ms).
    pub tau_meas_ms: u32,
    /// Actuator reaction latency (ms).
    pub tau_act_ms: u32,
    /// Safety margin on top of the two latencies (ms).
    pub tau_margin_ms: u32,
    /// Flow-rate floor for the learning divisor (g/s).
    pub v_min_gps: f32,
    /// EMA weight for the learned-bias update, in (0, 1].
    pub kv_ema_alpha: f32,
    /// Refuse tare while the reading is not stable.
    pub require_stable_for_tare: bool,
    /// Refuse calibration capture while the reading is not stable.
    pub require_stable_for_cal: bool,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            hysteresis_mg: 100,
            setpoint_max_mg: 200_000,
            show_setpoint_ms: 2_000,
            done_hold_ms: 1_500,
            measure_timeout_ms: 30_000,
            hint_hold_ms: 600,
            error_debounce_ms: 1_000,
            tau_meas_ms: 100,
            tau_act_ms: 80,
            tau_margin_ms: 20,
            v_min_gps: 0.2,
            kv_ema_alpha: 0.15,
            require_stable_for_tare: true,
            require_stable_for_cal: true,
        }
    }
}

/// Two-point calibration configuration.
#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    /// Fallback scale factor, mg per raw count in Q16 fixed point.
    /// Invariant: strictly positive.
    pub default_mg_per_count_q16: i32,
    /// Known reference mass for the span capture (mg).
    pub span_mass_mg: i32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            default_mg_per_count_q16: 8_428,
            span_mass_mg: 22_000,
        }
    }
}
