//! Controller state and stop-cause types.

/// Dosing state machine states. ADC faults are deliberately not a state:
/// they are an orthogonal flag so an in-progress run keeps its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    /// Setpoint was just adjusted; persists and falls back to `Idle` after a
    /// display-hold window.
    ShowSetpoint,
    /// Actuator on, predictive cutoff armed.
    Measuring,
    /// Post-stop hold; learning runs on exit for natural stops only.
    DoneHold,
    /// Zero point captured; waiting for the span capture or an abort.
    CalSpanPending,
}

/// Why the controller entered `DoneHold`. Stored alongside the state and
/// consumed exactly once on exit, instead of being inferred from flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// Predictive cutoff fired; the only cause that feeds learning.
    NormalStop,
    /// Start button pressed mid-run.
    ManualStop,
    /// Measurement timeout elapsed.
    TimedOut,
    /// Span calibration just completed.
    CalibrationDone,
}
