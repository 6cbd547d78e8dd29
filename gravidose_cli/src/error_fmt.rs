//! Human-readable error descriptions and structured JSON error formatting.

use gravidose_core::BuildError;

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No actuator was provided to the controller.\nLikely causes: The feeder driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the actuator is created successfully and passed via with_actuator(...).".to_string()
            }
            BuildError::MissingStore => {
                "What happened: No persistent store was provided to the controller.\nLikely causes: The state file could not be opened or was not wired into the builder.\nHow to fix: Check the --state path is readable and writable.".to_string()
            }
            BuildError::MissingInput => {
                "What happened: No user-input source was provided to the controller.\nLikely causes: The input front end was not wired into the builder.\nHow to fix: Pass an input implementation via with_input(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("state file") {
        return format!(
            "What happened: The persistent state file is unreadable.\nLikely causes: Hand-edited or truncated JSON.\nHow to fix: Repair or delete the state file; a fresh one is created on the next run. Original: {msg}"
        );
    }

    if lower.contains("never stabilized") || lower.contains("did not stabilize") {
        return format!(
            "What happened: The reading never went quiet.\nLikely causes: Noise threshold set too tight, or the simulated noise too high.\nHow to fix: Raise [stability] thresholds or lower --noise-counts. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: config/build problems return 2, everything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    let reason = match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingActuator) => "MissingActuator",
        Some(BuildError::MissingStore) => "MissingStore",
        Some(BuildError::MissingInput) => "MissingInput",
        Some(BuildError::InvalidConfig(_)) => "InvalidConfig",
        None => "Error",
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
