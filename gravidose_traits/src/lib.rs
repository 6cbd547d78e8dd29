pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Raw ADC sample source (load-cell front end).
///
/// The core only calls `read()` after `is_ready()` returned true; a source
/// that buffers exactly one conversion is sufficient.
pub trait SampleSource {
    /// True when a new conversion can be read without blocking.
    fn is_ready(&mut self) -> bool;
    /// Raw signed counts of the latest conversion. Only valid when ready.
    fn read(&mut self) -> i32;
    /// Request a minimum spacing between processed samples, in milliseconds.
    /// Sources that cannot change their conversion rate may ignore this.
    fn set_sample_period_ms(&mut self, _ms: u16) {}
    /// True when the converter supports the fast sampling rate.
    fn fast_capable(&self) -> bool {
        false
    }
}

/// Boolean on/off effector (relay, valve, remote switch).
///
/// Idempotent and infallible from the core's perspective; a missing physical
/// pin is a wiring/configuration matter, not a control concern.
pub trait Actuator {
    fn set(&mut self, on: bool);
    fn is_on(&self) -> bool;
}

/// Durable key/value store for calibration, tare, setpoint, and learned bias.
///
/// Writes are fire-and-forget: persistence failures must not surface into the
/// control loop, so the API has no error returns.
pub trait PersistentStore {
    fn load_i32(&mut self, key: &str, default: i32) -> i32;
    fn save_i32(&mut self, key: &str, value: i32);
    fn load_f32(&mut self, key: &str, default: f32) -> f32;
    fn save_f32(&mut self, key: &str, value: f32);
}

/// Per-iteration polled user intents.
///
/// Every signal is edge-triggered and auto-clearing: reading it consumes it.
/// Input shaping (quadrature decoding, debouncing, long-press detection)
/// happens behind this trait.
pub trait UserInput {
    /// Accumulated setpoint change in mg since the last poll (0 = none).
    fn setpoint_delta_mg(&mut self) -> i32;
    /// Tare button pressed since the last poll.
    fn tare_requested(&mut self) -> bool;
    /// Start/stop button pressed since the last poll.
    fn start_or_stop_requested(&mut self) -> bool;
    /// Calibration long-press since the last poll.
    fn calibration_advance_requested(&mut self) -> bool;
}
