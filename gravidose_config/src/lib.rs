#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the gravimetric dosing instrument.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - All defaults mirror the tuned instrument constants, so an empty TOML
//!   document yields a working configuration.
//!
//! Units follow the core: masses in milligrams, times in milliseconds,
//! flow rates in grams per second.

use serde::Deserialize;

/// Sampling and signal-conditioning parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplingCfg {
    /// Minimum spacing between processed samples while idle (ms). ~10 SPS.
    pub idle_period_ms: u16,
    /// Spacing while actively dosing, used only when the converter is
    /// fast-capable (ms). ~80 SPS.
    pub fast_period_ms: u16,
    /// Integer IIR divisor for the display path: `filt += (x - filt) / div`.
    pub iir_alpha_div: i32,
    /// Raw-count offset applied before tare (board-level bias).
    pub raw_offset_counts: i32,
    /// Liveness deadline = `max(period, idle_period) * notready_mult + notready_margin_ms`.
    pub notready_mult: u32,
    /// See `notready_mult`.
    pub notready_margin_ms: u32,
    /// Liveness checks are suppressed for this long after startup (ms).
    pub startup_grace_ms: u32,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            idle_period_ms: 100,
            fast_period_ms: 12,
            iir_alpha_div: 4,
            raw_offset_counts: 0,
            notready_mult: 3,
            notready_margin_ms: 50,
            startup_grace_ms: 1200,
        }
    }
}

/// Quiescence-detection parameters (slow/display path).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StabilityCfg {
    /// Ring-buffer length; no verdict until the window is full.
    pub window_samples: usize,
    /// Population standard deviation threshold (mg).
    pub stddev_mg: i32,
    /// Peak-to-peak spread threshold (mg).
    pub p2p_mg: i32,
    /// Quiet must persist this long before `stable` flips true (ms).
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

/// Dosing state-machine parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlCfg {
    /// Stop band: stop once `fast_mg + hysteresis_mg >= effective_target`.
    pub hysteresis_mg: i32,
    /// Setpoint clamp ceiling (mg).
    pub setpoint_max_mg: i32,
    /// Setpoint display-hold window; setpoint persists when it expires (ms).
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
    /// EMA weight for the learned bias update, in (0, 1].
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

/// Two-point calibration parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Fallback scale factor, mg per raw count in Q16 fixed point.
    pub default_mg_per_count_q16: i32,
    /// Known reference mass placed for the span capture (mg).
    pub span_mass_mg: i32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            // 0.1286 mg/count in Q16
            default_mg_per_count_q16: 8_428,
            span_mass_mg: 22_000,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    /// Path to a .log file (JSON lines); stderr when absent.
    pub file: Option<String>,
    /// "info", "debug", ...
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingCfg,
    pub stability: StabilityCfg,
    pub control: ControlCfg,
    pub calibration: CalibrationCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> eyre::Result<Config> {
    let cfg: Config = toml::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Range-check everything the core trusts blindly.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.sampling.idle_period_ms == 0 || self.sampling.fast_period_ms == 0 {
            eyre::bail!("sample periods must be >= 1 ms");
        }
        if self.sampling.fast_period_ms > self.sampling.idle_period_ms {
            eyre::bail!("fast_period_ms must not exceed idle_period_ms");
        }
        if self.sampling.iir_alpha_div < 1 {
            eyre::bail!("iir_alpha_div must be >= 1");
        }
        if self.sampling.notready_mult == 0 {
            eyre::bail!("notready_mult must be >= 1");
        }
        if self.stability.window_samples < 2 {
            eyre::bail!("stability window must hold at least 2 samples");
        }
        if self.stability.stddev_mg < 0 || self.stability.p2p_mg < 0 {
            eyre::bail!("stability thresholds must be >= 0");
        }
        if self.control.hysteresis_mg < 0 {
            eyre::bail!("hysteresis_mg must be >= 0");
        }
        if self.control.setpoint_max_mg <= 0 {
            eyre::bail!("setpoint_max_mg must be > 0");
        }
        if self.control.measure_timeout_ms == 0 {
            eyre::bail!("measure_timeout_ms must be > 0");
        }
        if !(self.control.v_min_gps.is_finite() && self.control.v_min_gps > 0.0) {
            eyre::bail!("v_min_gps must be finite and > 0");
        }
        if !(self.control.kv_ema_alpha.is_finite()
            && self.control.kv_ema_alpha > 0.0
            && self.control.kv_ema_alpha <= 1.0)
        {
            eyre::bail!("kv_ema_alpha must be in (0, 1]");
        }
        if self.calibration.default_mg_per_count_q16 <= 0 {
            eyre::bail!("default_mg_per_count_q16 must be > 0");
        }
        if self.calibration.span_mass_mg <= 0 {
            eyre::bail!("span_mass_mg must be > 0");
        }
        Ok(())
    }
}
