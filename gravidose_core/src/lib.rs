#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control core of a gravimetric dosing instrument (hardware-agnostic).
//!
//! All hardware interactions go through the `gravidose_traits` boundary:
//! `SampleSource`, `Actuator`, `PersistentStore`, `UserInput`.
//!
//! ## Architecture
//!
//! - **Estimation**: raw counts → calibrated mass, velocity, acceleration,
//!   stability verdict (`estimator` module)
//! - **Calibration**: two-point Q16 span factor (`fixed_point` module)
//! - **Control**: predictive-cutoff dosing state machine with learned bias
//!   (`controller` module)
//! - **Handoff**: lock-free data-ready gate for the ISR boundary (`gate`)
//! - **Loop**: cooperative, non-blocking iteration driver (`runner`)
//!
//! ## Fixed-Point Arithmetic
//!
//! Masses are integer **milligrams** (`i32`); the calibration factor is
//! mg-per-count in **Q16** (value × 65536). Scaling uses 64-bit intermediate
//! multiplies and arithmetic shifts for bit-exact, platform-independent
//! behavior.
//!
//! ## Error model
//!
//! Construction validates and can fail; the running core cannot. Sensor
//! stalls, degenerate calibration input, and blocked transitions all degrade
//! to flags and fallback values queryable each iteration.

pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod estimator;
pub mod fixed_point;
pub mod gate;
pub mod mocks;
pub mod runner;
pub mod status;
pub mod util;

pub use builder::ControllerBuilder;
pub use config::{CalibrationCfg, ControlCfg, EstimatorCfg, StabilityCfg};
pub use controller::{DosingController, keys};
pub use error::{BuildError, Result};
pub use estimator::Estimator;
pub use gate::DrdyGate;
pub use runner::ControlLoop;
pub use status::{ControllerState, StopCause};
