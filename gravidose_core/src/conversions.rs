//! `From` implementations bridging `gravidose_config` (TOML schema) to the
//! core runtime structs, so the CLI never maps fields by hand.

use crate::config::{CalibrationCfg, ControlCfg, EstimatorCfg, StabilityCfg};

impl From<&gravidose_config::Config> for EstimatorCfg {
    fn from(c: &gravidose_config::Config) -> Self {
        let defaults = Self::default();
        Self {
            idle_period_ms: c.sampling.idle_period_ms,
            fast_period_ms: c.sampling.fast_period_ms,
            iir_alpha_div: c.sampling.iir_alpha_div,
            raw_offset_counts: c.sampling.raw_offset_counts,
            notready_mult: c.sampling.notready_mult,
            notready_margin_ms: c.sampling.notready_margin_ms,
            startup_grace_ms: c.sampling.startup_grace_ms,
            // estimator gains are tuned constants, not runtime knobs
            alpha_g: defaults.alpha_g,
            beta_h: defaults.beta_h,
            accel_ema_w: defaults.accel_ema_w,
            stability: StabilityCfg::from(&c.stability),
        }
    }
}

impl From<&gravidose_config::StabilityCfg> for StabilityCfg {
    fn from(c: &gravidose_config::StabilityCfg) -> Self {
        Self {
            window_samples: c.window_samples,
            stddev_mg: c.stddev_mg,
            p2p_mg: c.p2p_mg,
            dwell_ms: c.dwell_ms,
        }
    }
}

impl From<&gravidose_config::ControlCfg> for ControlCfg {
    fn from(c: &gravidose_config::ControlCfg) -> Self {
        Self {
            hysteresis_mg: c.hysteresis_mg,
            setpoint_max_mg: c.setpoint_max_mg,
            show_setpoint_ms: c.show_setpoint_ms,
            done_hold_ms: c.done_hold_ms,
            measure_timeout_ms: c.measure_timeout_ms,
            hint_hold_ms: c.hint_hold_ms,
            error_debounce_ms: c.error_debounce_ms,
            tau_meas_ms: c.tau_meas_ms,
            tau_act_ms: c.tau_act_ms,
            tau_margin_ms: c.tau_margin_ms,
            v_min_gps: c.v_min_gps,
            kv_ema_alpha: c.kv_ema_alpha,
            require_stable_for_tare: c.require_stable_for_tare,
            require_stable_for_cal: c.require_stable_for_cal,
        }
    }
}

impl From<&gravidose_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &gravidose_config::CalibrationCfg) -> Self {
        Self {
            default_mg_per_count_q16: c.default_mg_per_count_q16,
            span_mass_mg: c.span_mass_mg,
        }
    }
}
