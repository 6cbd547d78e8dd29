//! Signal acquisition and estimation: raw load-cell counts in, calibrated
//! mass, velocity, acceleration, and a stability verdict out.
//!
//! Two parallel paths run per accepted sample:
//!
//! - **slow/display**: median-of-3 of raw counts → Q16 scale → integer IIR.
//!   Heavily damped; feeds the display, the stability classifier, and the
//!   end-of-run learning measurement.
//! - **fast/control**: direct Q16 scale → α–β (position/velocity) estimator
//!   with an EMA acceleration estimate. Feeds the predictive cutoff.
//!
//! Time is a wrapping u32 millisecond clock; the estimator never blocks and
//! never errors — anomalies degrade to the `ok` liveness flag.

use crate::config::EstimatorCfg;
use crate::fixed_point::{counts_to_mg_q16, med3};
use crate::util::{due, elapsed_ms};

#[derive(Debug)]
pub struct Estimator {
    cfg: EstimatorCfg,

    // calibration / tare
    cal_q16: i32,
    tare_raw: i32,
    weight_raw: i32,
    last_raw_no_tare: i32,

    // sampling cadence and liveness
    period_ms: u16,
    created_ms: u32,
    last_sample_ms: Option<u32>,
    ok: bool,
    fast_capable: bool,

    // slow/display path
    buf: [i32; 3],
    bi: usize,
    filt_mg: i32,

    // fast α–β estimator
    x_hat_mg: f32,
    v_hat_mgps: f32,
    a_hat_mgps2: f32,
    last_v_hat: f32,

    // stability window over the slow path
    win: Vec<i32>,
    wcount: usize,
    widx: usize,
    stable: bool,
    stable_since: Option<u32>,
}

impl Estimator {
    pub fn new(cfg: EstimatorCfg, cal_q16: i32, now_ms: u32) -> Self {
        let window = cfg.stability.window_samples.max(2);
        let idle = cfg.idle_period_ms.max(1);
        Self {
            win: vec![0; window],
            period_ms: idle,
            created_ms: now_ms,
            last_sample_ms: None,
            ok: true,
            fast_capable: false,
            cal_q16,
            tare_raw: 0,
            weight_raw: 0,
            last_raw_no_tare: 0,
            buf: [0; 3],
            bi: 0,
            filt_mg: 0,
            x_hat_mg: 0.0,
            v_hat_mgps: 0.0,
            a_hat_mgps2: 0.0,
            last_v_hat: 0.0,
            wcount: 0,
            widx: 0,
            stable: false,
            stable_since: None,
            cfg,
        }
    }

    /// Ingest one raw conversion. Returns false when the sample was dropped
    /// by period decimation (the source runs faster than requested).
    pub fn ingest(&mut self, counts: i32, t_ms: u32) -> bool {
        if let Some(last) = self.last_sample_ms
            && elapsed_ms(t_ms, last) < u32::from(self.period_ms)
        {
            return false;
        }
        let prev_sample_ms = self.last_sample_ms;
        self.last_sample_ms = Some(t_ms);
        self.ok = true;

        let raw = counts.saturating_sub(self.cfg.raw_offset_counts);
        self.last_raw_no_tare = raw;
        self.weight_raw = raw.saturating_sub(self.tare_raw);

        // fast path: no median, straight to mg
        let mg_fast = counts_to_mg_q16(self.weight_raw, self.cal_q16);

        // slow path: median-of-3 + integer IIR (truncating division)
        self.buf[self.bi] = self.weight_raw;
        self.bi = (self.bi + 1) % 3;
        let med = med3(self.buf[0], self.buf[1], self.buf[2]);
        let mg_slow = counts_to_mg_q16(med, self.cal_q16);
        self.filt_mg += (mg_slow - self.filt_mg) / self.cfg.iir_alpha_div;

        // α–β update on wall-clock dt since the previous accepted sample
        let dt_ms = match prev_sample_ms {
            None => u32::from(self.period_ms),
            Some(prev) => elapsed_ms(t_ms, prev),
        };
        let mut dt = dt_ms as f32 / 1000.0;
        if dt <= 0.0001 {
            dt = f32::from(self.period_ms) / 1000.0;
        }
        let x_pred = self.x_hat_mg + self.v_hat_mgps * dt;
        let r = mg_fast as f32 - x_pred;
        self.x_hat_mg = x_pred + self.cfg.alpha_g * r;
        self.v_hat_mgps += (self.cfg.beta_h / dt) * r;
        let a_inst = (self.v_hat_mgps - self.last_v_hat) / dt;
        let w = self.cfg.accel_ema_w;
        self.a_hat_mgps2 = (1.0 - w) * self.a_hat_mgps2 + w * a_inst;
        self.last_v_hat = self.v_hat_mgps;

        self.update_stability(t_ms);
        true
    }

    fn update_stability(&mut self, now_ms: u32) {
        let n = self.win.len();
        if self.wcount < n {
            self.wcount += 1;
        }
        self.win[self.widx] = self.filt_mg;
        self.widx = (self.widx + 1) % n;

        if self.wcount < n {
            self.stable = false;
            self.stable_since = None;
            return;
        }

        let mut sum: i64 = 0;
        let mut mn = i32::MAX;
        let mut mx = i32::MIN;
        for &v in &self.win {
            sum += i64::from(v);
            mn = mn.min(v);
            mx = mx.max(v);
        }
        let mean = sum as f32 / n as f32;
        let mut var_sum = 0.0f32;
        for &v in &self.win {
            let d = v as f32 - mean;
            var_sum += d * d;
        }
        // population variance: the window is the whole population of interest
        let var = (var_sum / n as f32).max(0.0);
        let stddev_mg = var.sqrt() as i32;
        let p2p = mx - mn;

        let quiet = stddev_mg <= self.cfg.stability.stddev_mg && p2p <= self.cfg.stability.p2p_mg;
        if quiet {
            let since = *self.stable_since.get_or_insert(now_ms);
            self.stable = due(now_ms, since, self.cfg.stability.dwell_ms);
        } else {
            // any excursion restarts the dwell clock, not just the flag
            self.stable = false;
            self.stable_since = None;
        }
    }

    /// Liveness watchdog: called every loop iteration, sample or not.
    /// Recovery is automatic — the next accepted sample sets `ok` again.
    pub fn check_liveness(&mut self, now_ms: u32) {
        let base = u32::from(self.period_ms.max(self.cfg.idle_period_ms));
        let deadline = base
            .saturating_mul(self.cfg.notready_mult)
            .saturating_add(self.cfg.notready_margin_ms);
        if !due(now_ms, self.created_ms, self.cfg.startup_grace_ms) {
            return;
        }
        let since = self.last_sample_ms.unwrap_or(self.created_ms);
        if elapsed_ms(now_ms, since) > deadline && self.ok {
            tracing::warn!(deadline_ms = deadline, "sample source stalled");
            self.ok = false;
        }
    }

    /// Fold the current reading into the baseline so the next sample reads
    /// zero. Absolute-baseline semantics: repeated calls with no intervening
    /// sample are idempotent.
    pub fn tare(&mut self) {
        self.tare_raw = self.last_raw_no_tare;
        self.weight_raw = 0;
    }

    /// Swap the calibration scalar. Filter buffers and estimator state are
    /// deliberately untouched; position is recomputed from raw counts on the
    /// next sample, and the caller decides whether learned values survive.
    pub fn set_cal_factor_q16(&mut self, q16: i32) {
        self.cal_q16 = q16;
    }

    pub fn cal_factor_q16(&self) -> i32 {
        self.cal_q16
    }

    /// Restore a persisted tare baseline (raw counts).
    pub fn set_tare_raw(&mut self, raw: i32) {
        self.tare_raw = raw;
    }

    pub fn tare_raw(&self) -> i32 {
        self.tare_raw
    }

    /// Request a minimum spacing between processed samples.
    pub fn set_sample_period_ms(&mut self, ms: u16) {
        self.period_ms = ms.max(1);
    }

    pub fn sample_period_ms(&self) -> u16 {
        self.period_ms
    }

    pub(crate) fn cfg(&self) -> &EstimatorCfg {
        &self.cfg
    }

    pub fn set_fast_capable(&mut self, yes: bool) {
        self.fast_capable = yes;
    }

    pub fn fast_capable(&self) -> bool {
        self.fast_capable
    }

    // ── outputs ──────────────────────────────────────────────────────────

    /// Smoothed display reading (mg, slow path).
    pub fn filtered_mg(&self) -> i32 {
        self.filt_mg
    }

    /// Fast position estimate (mg) for the control loop.
    pub fn fast_mg(&self) -> i32 {
        self.x_hat_mg as i32
    }

    /// Velocity estimate, mg/s.
    pub fn v_hat_mgps(&self) -> f32 {
        self.v_hat_mgps
    }

    /// Acceleration estimate, mg/s².
    pub fn a_hat_mgps2(&self) -> f32 {
        self.a_hat_mgps2
    }

    /// Flow rate in grams per second.
    pub fn flow_gps(&self) -> f32 {
        self.v_hat_mgps / 1000.0
    }

    /// Raw counts after offset and tare.
    pub fn raw_counts(&self) -> i32 {
        self.weight_raw
    }

    /// Raw counts after offset but before tare (calibration captures).
    pub fn raw_no_tare(&self) -> i32 {
        self.last_raw_no_tare
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    /// Liveness flag; false while the source has missed its deadline.
    pub fn is_ok(&self) -> bool {
        self.ok
    }
}
