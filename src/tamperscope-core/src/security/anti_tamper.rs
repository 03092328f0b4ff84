//! Runtime tampering detection.
//!
//! Detects:
//! - Attached debuggers (trace flag)
//! - Injected instrumentation modules (Frida, Substrate, Cycript, ...)
//! - Hooked methods and rebound C symbols
//! - Tool classes registered with the Objective-C runtime
//! - Load-time injection variables

use tracing::{debug, warn};

use super::{CheckContext, Detector};
use crate::env::Environment;
use crate::indicators::HookTarget;
use crate::types::CheckVerdict;

/// Bytes read from each hook target's entry point.
const PROLOGUE_LEN: usize = 16;

/// Query the trace flag once.
///
/// A failed query counts as "no debugger"; it is logged, not reported
/// as tampering.
pub fn check_debugger(env: &dyn Environment) -> CheckVerdict {
    let name = Detector::DebuggerPresence.name();
    match env.query_debugger_attached() {
        Ok(false) => CheckVerdict::pass(name),
        Ok(true) => CheckVerdict::fail(name, "debugger attached"),
        Err(e) => {
            warn!(error = %e, "Debugger query failed, assuming no debugger");
            CheckVerdict::pass_with_note(name, format!("not verified: {e}"))
        },
    }
}

pub(super) fn module_injection(name: &str, ctx: &CheckContext<'_>) -> CheckVerdict {
    let modules = match ctx.env.enumerate_loaded_modules() {
        Ok(modules) => modules,
        Err(e) => {
            return CheckVerdict::fail(name, format!("cannot enumerate loaded modules: {e}"))
        },
    };
    let tools: Vec<String> = ctx
        .indicators
        .tool_modules
        .iter()
        .map(|t| t.to_lowercase())
        .collect();

    let injected: Vec<&str> = modules
        .iter()
        .filter(|module| {
            let lower = module.to_lowercase();
            tools.iter().any(|tool| lower.contains(tool.as_str()))
        })
        .map(String::as_str)
        .collect();

    if injected.is_empty() {
        debug!(modules = modules.len(), "No injected modules");
        CheckVerdict::pass(name)
    } else {
        CheckVerdict::fail(name, format!("injected modules: {}", injected.join(", ")))
    }
}

/// Whether the bytes at a function entry form an absolute-branch trampoline.
///
/// Recognizes the two patterns inline hooking frameworks write:
/// - AArch64 `LDR X16|X17, #imm` followed by `BR` of the same register
/// - x86-64 `JMP [RIP+0]` (`FF 25 00 00 00 00`)
///
/// Best effort only. Legitimate veneers can look the same.
pub fn is_branch_trampoline(prologue: &[u8]) -> bool {
    if prologue.starts_with(&[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]) {
        return true;
    }
    if prologue.len() < 8 {
        return false;
    }
    let word = |i: usize| {
        u32::from_le_bytes([
            prologue[i],
            prologue[i + 1],
            prologue[i + 2],
            prologue[i + 3],
        ])
    };
    let (ldr, br) = (word(0), word(4));

    // LDR (literal, 64-bit): 0101_1000 imm19 Rt
    let ldr_reg = ldr & 0x1F;
    let is_ldr = ldr & 0xFF00_0000 == 0x5800_0000 && (ldr_reg == 16 || ldr_reg == 17);
    // BR Xn: 1101_0110_0001_1111_0000_00 Rn 00000
    let is_br = br & 0xFFFF_FC1F == 0xD61F_0000 && (br >> 5) & 0x1F == ldr_reg;
    is_ldr && is_br
}

/// Check a target list for foreign owners and trampolines.
///
/// Targets that do not resolve are skipped; when none resolves the check
/// fails, since nothing was verified.
pub(super) fn hooked_targets(
    name: &str,
    env: &dyn Environment,
    targets: &[HookTarget],
) -> CheckVerdict {
    if targets.is_empty() {
        return CheckVerdict::pass_with_note(name, "no targets configured");
    }

    let mut resolved = 0usize;
    let mut findings = Vec::new();
    for target in targets {
        let Some(symbol) = env.resolve_symbol(&target.symbol) else {
            debug!(symbol = %target.symbol, "Hook target did not resolve");
            continue;
        };
        resolved += 1;

        if !target.owned_by_expected(&symbol.module) {
            findings.push(format!("{} resolves into {}", target.symbol, symbol.module));
            continue;
        }
        if let Some(prologue) = env.read_symbol_prologue(&target.symbol, PROLOGUE_LEN) {
            if is_branch_trampoline(&prologue) {
                let shown = &prologue[..prologue.len().min(8)];
                findings.push(format!(
                    "{} starts with a branch trampoline ({})",
                    target.symbol,
                    hex::encode(shown)
                ));
            }
        }
    }

    if resolved == 0 {
        return CheckVerdict::fail(name, "no hook target could be resolved");
    }
    if findings.is_empty() {
        CheckVerdict::pass(name)
    } else {
        CheckVerdict::fail(name, format!("hooked: {}", findings.join(", ")))
    }
}

pub(super) fn type_registry_injection(name: &str, ctx: &CheckContext<'_>) -> CheckVerdict {
    let types = match ctx.env.enumerate_live_types() {
        Ok(types) => types,
        Err(e) => return CheckVerdict::fail(name, format!("cannot enumerate classes: {e}")),
    };
    let protocols = match ctx.env.enumerate_live_protocols() {
        Ok(protocols) => protocols,
        Err(e) => return CheckVerdict::fail(name, format!("cannot enumerate protocols: {e}")),
    };
    let patterns = &ctx.indicators.type_patterns;
    let matches = |candidate: &str| patterns.iter().any(|p| p.matches(candidate));

    // Root classes are never touched: enumerating them is where the
    // runtime is known to crash.
    let hits: Vec<&str> = types
        .iter()
        .filter(|t| t.has_parent)
        .map(|t| t.name.as_str())
        .chain(protocols.iter().map(String::as_str))
        .filter(|candidate| matches(*candidate))
        .collect();

    if hits.is_empty() {
        CheckVerdict::pass(name)
    } else {
        CheckVerdict::fail(name, format!("injected runtime types: {}", hits.join(", ")))
    }
}

pub(super) fn environment_tamper(name: &str, ctx: &CheckContext<'_>) -> CheckVerdict {
    let set: Vec<&str> = ctx
        .indicators
        .injection_env_vars
        .iter()
        .filter(|var| ctx.env.environment_variable(var).is_some())
        .map(String::as_str)
        .collect();
    if set.is_empty() {
        CheckVerdict::pass(name)
    } else {
        CheckVerdict::fail(name, format!("injection variables set: {}", set.join(", ")))
    }
}
