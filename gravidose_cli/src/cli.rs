//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "gravidose", version, about = "Gravimetric doser CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/gravidose.toml")]
    pub config: PathBuf,

    /// Persistent state file (calibration, tare, setpoint, learned bias)
    #[arg(long, value_name = "FILE", default_value = "gravidose_state.json")]
    pub state: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispense a target amount on the simulated bench
    Dose {
        /// Target grams to dispense
        #[arg(long)]
        grams: f32,
        /// Simulated flow rate in grams per second
        #[arg(long, value_name = "GPS", default_value_t = 5.0)]
        flow_gps: f32,
        /// Peak-to-peak sensor noise in raw counts
        #[arg(long, value_name = "COUNTS", default_value_t = 8)]
        noise_counts: i32,
        /// Print total runtime on completion
        #[arg(long, action = ArgAction::SetTrue)]
        print_runtime: bool,
    },
    /// Run the two-point calibration flow against the simulated bench
    Calibrate {
        /// Reference mass placed for the span capture, in grams
        #[arg(long, value_name = "GRAMS")]
        span_grams: Option<f32>,
    },
    /// Quick health check (config parses, controller builds, sim ok)
    SelfCheck,
}
