//! Test and simulation doubles for the hardware-boundary traits.
//!
//! Each double is a cheap `Rc<RefCell<..>>` handle: clone one side into the
//! controller, keep the other to script intents and inspect effects. The
//! core is single-threaded by design, so `Rc` is sufficient.
//!
//! Shared by the core's integration tests and the CLI's simulated rig.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use gravidose_traits::{Actuator, PersistentStore, SampleSource, UserInput};

/// In-memory key/value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<StoreInner>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    ints: HashMap<String, i32>,
    floats: HashMap<String, f32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a value, as if persisted by an earlier boot.
    pub fn seed_i32(&self, key: &str, v: i32) {
        self.inner.borrow_mut().ints.insert(key.to_owned(), v);
    }

    pub fn seed_f32(&self, key: &str, v: f32) {
        self.inner.borrow_mut().floats.insert(key.to_owned(), v);
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.inner.borrow().ints.get(key).copied()
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.inner.borrow().floats.get(key).copied()
    }
}

impl PersistentStore for MemoryStore {
    fn load_i32(&mut self, key: &str, default: i32) -> i32 {
        self.inner.borrow().ints.get(key).copied().unwrap_or(default)
    }
    fn save_i32(&mut self, key: &str, value: i32) {
        self.inner.borrow_mut().ints.insert(key.to_owned(), value);
    }
    fn load_f32(&mut self, key: &str, default: f32) -> f32 {
        self.inner
            .borrow()
            .floats
            .get(key)
            .copied()
            .unwrap_or(default)
    }
    fn save_f32(&mut self, key: &str, value: f32) {
        self.inner.borrow_mut().floats.insert(key.to_owned(), value);
    }
}

/// Actuator that records every commanded transition.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    inner: Rc<RefCell<ActuatorInner>>,
}

#[derive(Debug, Default)]
struct ActuatorInner {
    on: bool,
    transitions: Vec<bool>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<bool> {
        self.inner.borrow().transitions.clone()
    }
}

impl Actuator for RecordingActuator {
    fn set(&mut self, on: bool) {
        let mut inner = self.inner.borrow_mut();
        if on != inner.on {
            inner.transitions.push(on);
        }
        inner.on = on;
    }
    fn is_on(&self) -> bool {
        self.inner.borrow().on
    }
}

/// Scripted user input: intents are queued by the test and consumed on poll,
/// matching the edge-triggered auto-clearing contract.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    inner: Rc<RefCell<InputInner>>,
}

#[derive(Debug, Default)]
struct InputInner {
    delta_mg: i32,
    tare: bool,
    start: bool,
    cal: bool,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn turn(&self, delta_mg: i32) {
        self.inner.borrow_mut().delta_mg += delta_mg;
    }
    pub fn press_tare(&self) {
        self.inner.borrow_mut().tare = true;
    }
    pub fn press_start(&self) {
        self.inner.borrow_mut().start = true;
    }
    pub fn long_press_cal(&self) {
        self.inner.borrow_mut().cal = true;
    }
}

impl UserInput for ScriptedInput {
    fn setpoint_delta_mg(&mut self) -> i32 {
        std::mem::take(&mut self.inner.borrow_mut().delta_mg)
    }
    fn tare_requested(&mut self) -> bool {
        std::mem::take(&mut self.inner.borrow_mut().tare)
    }
    fn start_or_stop_requested(&mut self) -> bool {
        std::mem::take(&mut self.inner.borrow_mut().start)
    }
    fn calibration_advance_requested(&mut self) -> bool {
        std::mem::take(&mut self.inner.borrow_mut().cal)
    }
}

/// Single-conversion-buffer sample source, the shape of a real load-cell
/// front end: one value latched until read.
#[derive(Debug, Clone)]
pub struct BenchSource {
    inner: Rc<RefCell<SourceInner>>,
}

#[derive(Debug)]
struct SourceInner {
    value: i32,
    ready: bool,
    period_ms: u16,
    fast: bool,
}

impl BenchSource {
    pub fn new(fast_capable: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SourceInner {
                value: 0,
                ready: false,
                period_ms: 100,
                fast: fast_capable,
            })),
        }
    }

    /// Latch a fresh conversion, as the converter's DRDY edge would.
    pub fn latch(&self, counts: i32) {
        let mut inner = self.inner.borrow_mut();
        inner.value = counts;
        inner.ready = true;
    }

    pub fn period_ms(&self) -> u16 {
        self.inner.borrow().period_ms
    }
}

impl SampleSource for BenchSource {
    fn is_ready(&mut self) -> bool {
        self.inner.borrow().ready
    }
    fn read(&mut self) -> i32 {
        let mut inner = self.inner.borrow_mut();
        inner.ready = false;
        inner.value
    }
    fn set_sample_period_ms(&mut self, ms: u16) {
        self.inner.borrow_mut().period_ms = ms.max(1);
    }
    fn fast_capable(&self) -> bool {
        self.inner.borrow().fast
    }
}
