use gravidose_config::load_toml;
use rstest::rstest;

#[test]
fn empty_document_yields_working_defaults() {
    let cfg = load_toml("").expect("defaults must validate");
    assert_eq!(cfg.sampling.idle_period_ms, 100);
    assert_eq!(cfg.sampling.iir_alpha_div, 4);
    assert_eq!(cfg.stability.window_samples, 10);
    assert_eq!(cfg.control.hysteresis_mg, 100);
    assert_eq!(cfg.calibration.span_mass_mg, 22_000);
}

#[test]
fn partial_overrides_keep_other_defaults() {
    let cfg = load_toml(
        r#"
        [control]
        hysteresis_mg = 50
        setpoint_max_mg = 100000

        [stability]
        dwell_ms = 500
        "#,
    )
    .unwrap();
    assert_eq!(cfg.control.hysteresis_mg, 50);
    assert_eq!(cfg.control.setpoint_max_mg, 100_000);
    assert_eq!(cfg.stability.dwell_ms, 500);
    // untouched sections stay at defaults
    assert_eq!(cfg.control.measure_timeout_ms, 30_000);
    assert_eq!(cfg.sampling.fast_period_ms, 12);
}

#[rstest]
#[case("[sampling]\nidle_period_ms = 0")]
#[case("[sampling]\nfast_period_ms = 200")] // faster-than-idle inverted
#[case("[sampling]\niir_alpha_div = 0")]
#[case("[stability]\nwindow_samples = 1")]
#[case("[stability]\nstddev_mg = -1")]
#[case("[control]\nhysteresis_mg = -5")]
#[case("[control]\nsetpoint_max_mg = 0")]
#[case("[control]\nmeasure_timeout_ms = 0")]
#[case("[control]\nv_min_gps = 0.0")]
#[case("[control]\nkv_ema_alpha = 1.5")]
#[case("[calibration]\ndefault_mg_per_count_q16 = 0")]
#[case("[calibration]\nspan_mass_mg = -10")]
fn out_of_range_values_are_rejected(#[case] toml_src: &str) {
    assert!(load_toml(toml_src).is_err(), "should reject: {toml_src}");
}

#[test]
fn unknown_keys_are_tolerated() {
    // Forward compatibility: stray keys must not break old firmware configs.
    let cfg = load_toml("[control]\nhysteresis_mg = 80\nfuture_knob = 1").unwrap();
    assert_eq!(cfg.control.hysteresis_mg, 80);
}
