//! End-to-end state machine tests driven through the public API with the
//! in-crate mocks. Time is passed explicitly, so everything is deterministic.

use gravidose_core::controller::keys;
use gravidose_core::mocks::{MemoryStore, RecordingActuator, ScriptedInput};
use gravidose_core::{ControlCfg, ControllerBuilder, ControllerState, DosingController};

type Ctl = DosingController<RecordingActuator, MemoryStore, ScriptedInput>;

struct Rig {
    ctl: Ctl,
    input: ScriptedInput,
    store: MemoryStore,
    actuator: RecordingActuator,
    t: u32,
}

impl Rig {
    /// Unity calibration (1 mg per count) seeded in the store, so raw counts
    /// read directly as milligrams.
    fn new() -> Self {
        Self::with_control(ControlCfg::default())
    }

    fn with_control(control: ControlCfg) -> Self {
        let store = MemoryStore::new();
        store.seed_i32(keys::CAL_Q16, 1 << 16);
        let input = ScriptedInput::new();
        let actuator = RecordingActuator::new();
        let ctl = ControllerBuilder::new()
            .with_actuator(actuator.clone())
            .with_store(store.clone())
            .with_input(input.clone())
            .with_control_cfg(control)
            .build(0)
            .unwrap();
        Self {
            ctl,
            input,
            store,
            actuator,
            t: 0,
        }
    }

    /// Feed one sample and run one control iteration, 100 ms apart.
    fn step(&mut self, counts: i32) {
        self.t += 100;
        self.ctl.ingest_sample(counts, self.t);
        self.ctl.tick(self.t);
    }

    /// Idle the loop without samples for `ms`.
    fn coast(&mut self, ms: u32) {
        let end = self.t + ms;
        while self.t < end {
            self.t += 100;
            self.ctl.tick(self.t);
        }
    }

    /// Feed a constant reading until the estimator reports stability.
    fn settle(&mut self, counts: i32) {
        for _ in 0..80 {
            self.step(counts);
            if self.ctl.is_stable() {
                return;
            }
        }
        panic!("estimator never settled at {counts} counts");
    }
}

#[test]
fn full_dose_scenario() {
    let mut rig = Rig::new();

    // tare at rest (raw = 0); requires stability
    rig.settle(0);
    rig.input.press_tare();
    rig.step(0);
    assert_eq!(rig.store.get_i32(keys::TARE_RAW), Some(0));

    // encoder delta +1000 mg on top of the 14 g default
    rig.input.turn(1_000);
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::ShowSetpoint);
    assert_eq!(rig.ctl.setpoint_mg(), 15_000);

    // no further delta: display-hold expires, setpoint persists
    rig.coast(2_100);
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    assert_eq!(rig.store.get_i32(keys::SETPOINT_MG), Some(15_000));

    // start: actuator on, measuring
    rig.input.press_start();
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::Measuring);
    assert!(rig.ctl.actuator_on());

    // constant 5 g/s ramp: 500 counts per 100 ms
    let mut counts = 0;
    let mut stop_fast_mg = None;
    for _ in 0..200 {
        counts += 500;
        rig.step(counts);
        if rig.ctl.state() != ControllerState::Measuring {
            stop_fast_mg = Some(rig.ctl.estimator().fast_mg());
            break;
        }
    }
    let stop_fast_mg = stop_fast_mg.expect("predictive cutoff never fired");
    assert_eq!(rig.ctl.state(), ControllerState::DoneHold);
    assert!(!rig.ctl.actuator_on());
    // stop at-or-before target: the cutoff compensates latency, so the
    // commanded-off mass sits below the setpoint
    assert!(
        stop_fast_mg <= 15_000,
        "stopped late at {stop_fast_mg} mg"
    );

    // hold expires, back to idle; natural stop ran the learning update
    rig.coast(1_600);
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    assert!(rig.store.get_f32(keys::KV).is_some());
}

#[test]
fn setpoint_dialed_just_before_start_is_persisted_after_the_run() {
    let mut rig = Rig::new();

    // dial +1000 mg and start inside the display hold: the hold never
    // expires, so the change must be flushed when the run returns to idle
    rig.input.turn(1_000);
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::ShowSetpoint);
    rig.input.press_start();
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::Measuring);
    assert_eq!(rig.store.get_i32(keys::SETPOINT_MG), None);

    let mut counts = 0;
    for _ in 0..200 {
        counts += 500;
        rig.step(counts);
        if rig.ctl.state() != ControllerState::Measuring {
            break;
        }
    }
    assert_eq!(rig.ctl.state(), ControllerState::DoneHold);
    rig.coast(1_600);
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    assert_eq!(rig.store.get_i32(keys::SETPOINT_MG), Some(15_000));

    // an unchanged setpoint is not re-persisted by later runs
    rig.store.seed_i32(keys::SETPOINT_MG, -1);
    rig.input.press_start();
    rig.step(counts);
    rig.input.press_start();
    rig.step(counts);
    rig.coast(1_600);
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    assert_eq!(rig.store.get_i32(keys::SETPOINT_MG), Some(-1));
}

#[test]
fn manual_stop_skips_learning() {
    let mut rig = Rig::new();
    rig.input.press_start();
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::Measuring);

    let mut counts = 0;
    for _ in 0..10 {
        counts += 500;
        rig.step(counts);
    }
    rig.input.press_start(); // stop mid-run
    rig.step(counts);
    assert_eq!(rig.ctl.state(), ControllerState::DoneHold);
    assert!(!rig.ctl.actuator_on());

    // start press during the hold is ignored
    rig.input.press_start();
    rig.step(counts);
    assert_eq!(rig.ctl.state(), ControllerState::DoneHold);

    rig.coast(1_600);
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    assert_eq!(rig.store.get_f32(keys::KV), None);
    assert_eq!(rig.ctl.kv_mg_per_gps(), 0.0);
}

#[test]
fn measurement_timeout_stops_without_learning() {
    let mut rig = Rig::new();
    rig.input.press_start();
    rig.step(0);

    // nothing flows; ride out the 30 s timeout
    for _ in 0..310 {
        rig.step(0);
        if rig.ctl.state() != ControllerState::Measuring {
            break;
        }
    }
    assert_eq!(rig.ctl.state(), ControllerState::DoneHold);
    assert!(!rig.ctl.actuator_on());
    rig.coast(1_600);
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    assert_eq!(rig.store.get_f32(keys::KV), None);
}

#[test]
fn tare_blocked_while_measuring() {
    let mut rig = Rig::new();
    rig.settle(4_000);
    rig.input.press_tare();
    rig.step(4_000);
    let baseline = rig.ctl.estimator().tare_raw();
    assert_eq!(baseline, 4_000);

    rig.input.press_start();
    rig.step(4_000);
    rig.input.press_tare();
    rig.step(4_000);
    assert!(rig.ctl.hint_active(rig.t));
    assert_eq!(rig.ctl.estimator().tare_raw(), baseline);
}

#[test]
fn tare_requires_stability_when_configured() {
    let mut rig = Rig::new();
    // noisy stream: never stable
    for k in 0..12 {
        rig.step(if k % 2 == 0 { 0 } else { 3_000 });
    }
    assert!(!rig.ctl.is_stable());
    rig.input.press_tare();
    rig.step(3_000);
    assert!(rig.ctl.hint_active(rig.t));
    assert_eq!(rig.store.get_i32(keys::TARE_RAW), None);
}

#[test]
fn repeated_tare_is_idempotent() {
    let mut rig = Rig::new();
    rig.settle(7_000);
    rig.input.press_tare();
    rig.step(7_000);
    let first = rig.ctl.estimator().tare_raw();
    // second tare with the same reading held still
    rig.settle(7_000);
    rig.input.press_tare();
    rig.step(7_000);
    assert_eq!(rig.ctl.estimator().tare_raw(), first);
    assert_eq!(rig.ctl.estimator().raw_counts(), 0);
}

#[test]
fn setpoint_clamps_to_range() {
    let mut rig = Rig::new();
    rig.input.turn(-50_000);
    rig.step(0);
    assert_eq!(rig.ctl.setpoint_mg(), 0);
    rig.input.turn(i32::MAX);
    rig.step(0);
    assert_eq!(rig.ctl.setpoint_mg(), 200_000);
}

#[test]
fn two_point_calibration_applies_persists_and_resets_bias() {
    let mut rig = Rig::new();
    // pretend a previous run had learned something
    rig.store.seed_f32(keys::KV, 12.5);

    // zero capture
    rig.settle(0);
    rig.input.long_press_cal();
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::CalSpanPending);

    // place the 22 g reference; span capture once stable
    rig.settle(170_000);
    rig.input.long_press_cal();
    rig.step(170_000);
    assert_eq!(rig.ctl.state(), ControllerState::DoneHold);
    assert_eq!(rig.store.get_i32(keys::CAL_Q16), Some(8_481));
    assert_eq!(rig.ctl.estimator().cal_factor_q16(), 8_481);
    // the learned bias is meaningless under the new scale factor
    assert_eq!(rig.store.get_f32(keys::KV), Some(0.0));
    assert_eq!(rig.ctl.kv_mg_per_gps(), 0.0);

    // calibration completion must not feed the learning update
    rig.coast(1_600);
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    assert_eq!(rig.store.get_f32(keys::KV), Some(0.0));

    // the reference mass now reads 22 g within fixed-point error once the
    // position estimate has re-converged under the new scale
    for _ in 0..60 {
        rig.step(170_000);
    }
    let fast = rig.ctl.estimator().fast_mg();
    assert!((fast - 22_000).abs() <= 3, "span reads {fast} mg");
}

#[test]
fn calibration_abort_returns_to_idle() {
    let mut rig = Rig::new();
    rig.settle(0);
    rig.input.long_press_cal();
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::CalSpanPending);
    rig.input.press_start();
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    // nothing persisted by the aborted flow
    assert_eq!(rig.store.get_i32(keys::CAL_Q16), Some(1 << 16));
}

#[test]
fn calibration_blocked_while_measuring() {
    let mut rig = Rig::new();
    rig.input.press_start();
    rig.step(0);
    rig.input.long_press_cal();
    rig.step(500);
    assert_eq!(rig.ctl.state(), ControllerState::Measuring);
    assert!(rig.ctl.hint_active(rig.t));
}

#[test]
fn degenerate_span_still_yields_positive_factor() {
    let mut rig = Rig::new();
    rig.settle(0);
    rig.input.long_press_cal();
    rig.step(0);
    // no mass placed: span capture sees the same raw value
    rig.settle(0);
    rig.input.long_press_cal();
    rig.step(0);
    assert_eq!(rig.ctl.state(), ControllerState::DoneHold);
    // dcounts == 0 substitutes 1, yielding span_mg << 16, which is positive
    // but absurd; the stored factor must still be strictly positive
    let factor = rig.store.get_i32(keys::CAL_Q16).unwrap();
    assert!(factor > 0);
}

#[test]
fn sensor_fault_sets_flag_and_overlay_debounces() {
    let mut rig = Rig::new();
    rig.step(0);
    // stop feeding samples; ride past grace + liveness deadline
    rig.coast(2_000);
    assert!(rig.ctl.sensor_fault());
    let fault_at = rig.t;
    assert!(!rig.ctl.fault_overlay(fault_at));
    rig.coast(1_200);
    assert!(rig.ctl.fault_overlay(rig.t));

    // one good sample recovers automatically
    rig.step(0);
    assert!(!rig.ctl.sensor_fault());
    assert!(!rig.ctl.fault_overlay(rig.t));

    // run context was never lost
    assert_eq!(rig.ctl.state(), ControllerState::Idle);
    let _ = rig.actuator.transitions(); // keep the handle exercised
}

#[test]
fn setpoint_change_mid_measuring_moves_target_without_state_change() {
    let mut rig = Rig::new();
    rig.input.press_start();
    rig.step(0);
    rig.input.turn(5_000);
    rig.step(500);
    assert_eq!(rig.ctl.state(), ControllerState::Measuring);
    assert_eq!(rig.ctl.setpoint_mg(), 19_000);
}
