//! Human-readable error descriptions and structured JSON error formatting.

use crate::brew::RunError;

/// Exit code when the recipe or the configuration is rejected.
pub const EXIT_INVALID_INPUT: i32 = 3;
/// Exit code when the process was cancelled or timed out.
pub const EXIT_ABORTED: i32 = 4;
/// Exit code after Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 5;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use brew_core::error::{BrewError, BuildError, ProcessError};

    // Typed matches first
    if let Some(re) = err.downcast_ref::<RunError>() {
        return match re {
            RunError::Aborted { reason } if reason == "RequestResponseTimeout" => {
                "What happened: The brewing process was aborted because a confirmation was not answered in time.\nLikely causes: Nobody confirmed an ingredient addition.\nHow to fix: Answer requests promptly, or raise timing.response_timeout_ms in the config.".to_string()
            }
            RunError::Aborted { reason } => format!(
                "What happened: The brewing process was aborted ({reason}).\nLikely causes: The operator cancelled the run.\nHow to fix: Start a new run when ready."
            ),
            RunError::Interrupted => {
                "What happened: Brewing was interrupted by a signal.\nLikely causes: Ctrl-C or a service stop.\nHow to fix: Heater and stirrer were switched off; start a new run.".to_string()
            }
            RunError::TimeScale(v) => format!(
                "What happened: Invalid --time-scale value ({v}).\nHow to fix: Pass a positive factor, e.g. --time-scale 60."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingThermometer | BuildError::MissingHeater | BuildError::MissingStirrer => format!(
                "What happened: Controller could not be assembled ({be}).\nLikely causes: A device failed to initialize.\nHow to fix: Check [hardware] in the config."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BrewError>() {
        return match be {
            BrewError::Process(ProcessError::InvalidRecipe(msg)) => format!(
                "What happened: The recipe was rejected ({msg}).\nLikely causes: Overlapping temperature levels, additions out of order, or a hop added after the boil ends.\nHow to fix: Fix the recipe; `brewctl validate --recipe FILE` checks it without brewing."
            ),
            BrewError::Process(ProcessError::AlreadyRunning) => {
                "What happened: A brewing process is already running.\nHow to fix: Finish or cancel it first.".to_string()
            }
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<brew_core::recipe::RecipeError>() {
        return format!(
            "What happened: The recipe is invalid ({re}).\nHow to fix: Keep levels from overlapping, list additions in ascending time order and keep hops within the boil."
        );
    }

    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!("What happened: TOML could not be parsed.\nDetails: {te}\nHow to fix: Correct the file syntax.");
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("1-wire") || lower.contains("w1_slave") || lower.contains("sensor not found") {
        return "What happened: The thermometer could not be found.\nLikely causes: 1-Wire overlay not enabled or the probe id is wrong.\nHow to fix: Check /sys/bus/w1/devices and hardware.thermometer in the config.".to_string();
    }

    if lower.contains("relay pin") || lower.contains("buzzer pin") || lower.contains("gpio") {
        return "What happened: Failed to initialize GPIO pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [hardware] pins in the config; ensure the process may access GPIO.".to_string();
    }

    if lower.contains("parse recipe") || lower.contains("read recipe") {
        return format!("What happened: The recipe file could not be loaded.\nDetails: {msg}\nHow to fix: Check the path and TOML syntax.");
    }

    if lower.contains("must be") {
        return format!(
            "What happened: Input is invalid ({msg}).\nHow to fix: Edit the file and try again."
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

/// Stable exit codes; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use brew_core::error::{BrewError, BuildError, ProcessError};

    if let Some(re) = err.downcast_ref::<RunError>() {
        return match re {
            RunError::Aborted { .. } => EXIT_ABORTED,
            RunError::Interrupted => EXIT_INTERRUPTED,
            RunError::TimeScale(_) => EXIT_INVALID_INPUT,
        };
    }
    if matches!(
        err.downcast_ref::<BrewError>(),
        Some(BrewError::Process(ProcessError::InvalidRecipe(_)))
    ) || matches!(err.downcast_ref::<BuildError>(), Some(BuildError::InvalidConfig(_)))
        || err.downcast_ref::<toml::de::Error>().is_some()
        || err.downcast_ref::<brew_core::recipe::RecipeError>().is_some()
    {
        return EXIT_INVALID_INPUT;
    }
    if format!("{err:#}").contains("must be") {
        return EXIT_INVALID_INPUT;
    }
    1
}

/// Stable reason name used in JSON error lines.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<RunError>() {
        Some(RunError::Aborted { reason }) if reason == "RequestResponseTimeout" => "Timeout",
        Some(RunError::Aborted { .. }) => "Cancelled",
        Some(RunError::Interrupted) => "Interrupted",
        Some(RunError::TimeScale(_)) => "InvalidInput",
        None if exit_code_for_error(err) == EXIT_INVALID_INPUT => "InvalidInput",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
