//! Host compromise (jailbreak) detection.
//!
//! Four independent signals, any one of which fails the check:
//!
//! 1. A known jailbreak artifact exists on disk
//! 2. A write outside the sandbox succeeds
//! 3. A package-manager URL scheme can be opened
//! 4. An injection marker is set in the environment
//!
//! All signals are always evaluated so the reason names each that fired.

use tracing::debug;

use super::CheckContext;
use crate::types::CheckVerdict;

pub(super) fn host_compromise(name: &str, ctx: &CheckContext<'_>) -> CheckVerdict {
    let indicators = ctx.indicators;
    let env = ctx.env;
    let mut signals = Vec::new();

    // Method 1: jailbreak files
    let artifacts: Vec<&str> = indicators
        .jailbreak_paths
        .iter()
        .map(String::as_str)
        .filter(|path| env.filesystem_path_exists(path))
        .collect();
    if !artifacts.is_empty() {
        signals.push(format!("jailbreak artifacts present ({})", artifacts.join(", ")));
    }

    // Method 2: write outside the sandbox
    if env.attempt_protected_write(&indicators.protected_write_path) {
        signals.push(format!(
            "write outside sandbox succeeded ({})",
            indicators.protected_write_path
        ));
    }

    // Method 3: URL schemes
    let schemes: Vec<&str> = indicators
        .url_schemes
        .iter()
        .map(String::as_str)
        .filter(|scheme| env.can_open_url_scheme(scheme))
        .collect();
    if !schemes.is_empty() {
        signals.push(format!("jailbreak URL schemes openable ({})", schemes.join(", ")));
    }

    // Method 4: injection markers
    let markers: Vec<&str> = indicators
        .host_env_markers
        .iter()
        .map(String::as_str)
        .filter(|var| env.environment_variable(var).is_some())
        .collect();
    if !markers.is_empty() {
        signals.push(format!("injection markers set ({})", markers.join(", ")));
    }

    if signals.is_empty() {
        debug!("No host compromise signals");
        CheckVerdict::pass(name)
    } else {
        CheckVerdict::fail(name, format!("host compromised: {}", signals.join("; ")))
    }
}
