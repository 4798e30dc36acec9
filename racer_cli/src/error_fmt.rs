//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_LIMITS;
use racer_core::{BuildError, HaltReason, RacerError};

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        let BuildError::InvalidConfig(msg) = be;
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/racer.toml for a sample."
        );
    }

    if let Some(re) = err.downcast_ref::<RacerError>() {
        return match re {
            RacerError::Timeout => {
                "What happened: The vision sensor stopped delivering frames.\nLikely causes: UART wiring or baud mismatch, sensor power loss, or a frame timeout set too low.\nHow to fix: Check the sensor cable and the [hardware] section; raise hardware.frame_timeout_ms if the sensor is merely slow.".to_string()
            }
            RacerError::HardwareFault(msg) => format!(
                "What happened: A device reported a fault ({msg}).\nLikely causes: GPIO/PWM initialization failed or a UART dropped mid-run.\nHow to fix: Verify wiring and device paths in [hardware], and that the process may access GPIO and the serial ports."
            ),
            RacerError::Sensor(msg) => format!(
                "What happened: The vision sensor misbehaved ({msg}).\nLikely causes: Corrupt object stream or a flaky sensor connection.\nHow to fix: Check the sensor cable; re-run with --log-level=debug to see dropped-block counts."
            ),
            RacerError::Hardware(msg) => format!(
                "What happened: The drivetrain rejected a command ({msg}).\nLikely causes: Motor board fault or lost GPIO access.\nHow to fix: Verify the motor board wiring and [hardware] pin numbers."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config.
    // Alternate formatting joins the whole context chain, so wrapped
    // causes stay visible.
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("opening vision uart") || lower.contains("opening kill switch uart") {
        return "What happened: Failed to open a serial device.\nLikely causes: Wrong device path in [hardware], or insufficient permissions.\nHow to fix: Fix hardware.vision_device / hardware.kill_device, and ensure the user may open the port (dialout group).".to_string();
    }

    if lower.contains("opening motor board") {
        return "What happened: Failed to initialize the motor board.\nLikely causes: Incorrect pin numbers or no PWM/GPIO access.\nHow to fix: Fix the [hardware] pin values; ensure the process has permission to use GPIO and the PWM channels.".to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Out-of-range values in the TOML ({msg}).\nHow to fix: Edit the config file and try again."
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

/// Stable exit codes for deliberate halts.
pub fn exit_code_for_halt(halt: HaltReason) -> i32 {
    match halt {
        HaltReason::Kill | HaltReason::TickLimit => 0,
        HaltReason::Interrupt => 2,
        HaltReason::SearchExhausted => 3,
    }
}

/// Exit codes for faults; frame timeouts get their own code so a watchdog
/// can tell a dead sensor from everything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if matches!(err.downcast_ref::<RacerError>(), Some(RacerError::Timeout)) {
        return 4;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Config";
    }
    match err.downcast_ref::<RacerError>() {
        Some(RacerError::Timeout) => "Timeout",
        Some(RacerError::Sensor(_)) => "Sensor",
        Some(RacerError::Hardware(_)) => "Hardware",
        Some(RacerError::HardwareFault(_)) => "HardwareFault",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let reason = reason_name(err);
    let obj = match LAST_LIMITS.get() {
        Some(l) => json!({
            "reason": reason,
            "message": msg,
            "details": {
                "lost_timeout_ms": l.lost_timeout_ms,
                "max_ticks": l.max_ticks,
                "max_search_failures": l.max_search_failures,
            },
        }),
        None => json!({ "reason": reason, "message": msg }),
    };
    obj.to_string()
}
