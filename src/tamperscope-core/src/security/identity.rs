//! Signing identity checks.
//!
//! Signature presence and application identity fail closed. The
//! organization and capability checks read the provisioning document and
//! pass when it is not there: development and simulator builds ship
//! without one, and that is "cannot verify" rather than tampering.

use goblin::mach::load_command::CommandVariant;
use goblin::mach::{Mach, MachO};
use tracing::debug;

use super::CheckContext;
use crate::document::{ContainerDocument, DocumentValue, BUNDLE_IDENTIFIER_KEY};
use crate::types::CheckVerdict;

/// Whether a Mach-O image carries a code-signature load command.
///
/// Universal binaries must be signed in every slice.
pub fn has_code_signature(image: &[u8]) -> Result<bool, String> {
    match Mach::parse(image).map_err(|e| format!("not a Mach-O image: {e}"))? {
        Mach::Binary(macho) => Ok(macho_signed(&macho)),
        Mach::Fat(fat) => {
            let arches = fat.arches().map_err(|e| format!("bad fat header: {e}"))?;
            if arches.is_empty() {
                return Ok(false);
            }
            for arch in arches {
                let start = arch.offset as usize;
                let slice = image
                    .get(start..start.saturating_add(arch.size as usize))
                    .ok_or_else(|| format!("fat slice at {start} out of bounds"))?;
                let macho = MachO::parse(slice, 0).map_err(|e| format!("bad fat slice: {e}"))?;
                if !macho_signed(&macho) {
                    return Ok(false);
                }
            }
            Ok(true)
        },
    }
}

fn macho_signed(macho: &MachO<'_>) -> bool {
    macho
        .load_commands
        .iter()
        .any(|lc| matches!(lc.command, CommandVariant::CodeSignature(_)))
}

fn bundle_identifier(ctx: &CheckContext<'_>) -> Result<String, String> {
    let bytes = ctx
        .env
        .read_bundle_metadata()
        .map_err(|e| format!("bundle metadata unreadable: {e}"))?
        .ok_or_else(|| "bundle metadata missing".to_string())?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| format!("bundle metadata is not UTF-8: {e}"))?;
    let doc = ContainerDocument::parse(text)
        .map_err(|e| format!("bundle metadata unparseable: {e}"))?;
    doc.get(BUNDLE_IDENTIFIER_KEY)
        .ok_or_else(|| format!("bundle metadata has no {BUNDLE_IDENTIFIER_KEY}"))?
        .as_str()
        .map(str::to_string)
        .map_err(|e| format!("{BUNDLE_IDENTIFIER_KEY}: {e}"))
}

pub(super) fn signature_presence(name: &str, ctx: &CheckContext<'_>) -> CheckVerdict {
    let image = match ctx.env.read_own_executable() {
        Ok(image) => image,
        Err(e) => return CheckVerdict::fail(name, format!("executable unreadable: {e}")),
    };
    match has_code_signature(&image) {
        Ok(true) => {},
        Ok(false) => return CheckVerdict::fail(name, "executable has no code signature"),
        Err(e) => return CheckVerdict::fail(name, e),
    }

    match bundle_identifier(ctx) {
        Ok(id) if id == ctx.policy.expected_app_id => CheckVerdict::pass(name),
        Ok(id) => CheckVerdict::fail(
            name,
            format!(
                "bundle identifier {id} does not match expected {}",
                ctx.policy.expected_app_id
            ),
        ),
        Err(reason) => CheckVerdict::fail(name, reason),
    }
}

pub(super) fn identity_match(name: &str, ctx: &CheckContext<'_>) -> CheckVerdict {
    match ctx.env.runtime_app_identifier() {
        Some(id) if id == ctx.policy.expected_app_id => CheckVerdict::pass(name),
        Some(id) => CheckVerdict::fail(
            name,
            format!(
                "application identifier {id} does not match expected {}",
                ctx.policy.expected_app_id
            ),
        ),
        None => CheckVerdict::fail(name, "application identifier unavailable"),
    }
}

pub(super) fn organization_match(name: &str, ctx: &CheckContext<'_>) -> CheckVerdict {
    let doc = match ctx.document() {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "Organization check skipped");
            return CheckVerdict::pass_with_note(name, format!("not verified: {e}"));
        },
    };
    match doc.team_identifiers() {
        Ok(Some(teams)) if teams.contains(&ctx.policy.expected_org_id.as_str()) => {
            CheckVerdict::pass(name)
        },
        Ok(Some(teams)) => CheckVerdict::fail(
            name,
            format!(
                "signing organization {} does not match expected {}",
                teams.join(","),
                ctx.policy.expected_org_id
            ),
        ),
        Ok(None) => CheckVerdict::pass_with_note(name, "not verified: TeamIdentifier missing"),
        Err(e) => CheckVerdict::fail(name, format!("TeamIdentifier malformed: {e}")),
    }
}

fn grants(value: &DocumentValue, expected: &str) -> bool {
    match value {
        DocumentValue::String(s) => s == expected,
        DocumentValue::Array(items) => items.iter().any(|item| item.as_str() == Ok(expected)),
        _ => false,
    }
}

pub(super) fn capability_match(name: &str, ctx: &CheckContext<'_>) -> CheckVerdict {
    let doc = match ctx.document() {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "Capability check skipped");
            return CheckVerdict::pass_with_note(name, format!("not verified: {e}"));
        },
    };
    let entitlements = match doc.entitlements() {
        Ok(Some(entitlements)) => entitlements,
        Ok(None) => return CheckVerdict::pass_with_note(name, "not verified: Entitlements missing"),
        Err(e) => return CheckVerdict::fail(name, format!("Entitlements malformed: {e}")),
    };

    let mut problems = Vec::new();
    let missing: Vec<&str> = ctx
        .policy
        .required_capabilities
        .iter()
        .filter(|key| !entitlements.contains_key(key.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        problems.push(format!("missing capabilities {}", missing.join(",")));
    }

    let key = &ctx.policy.wildcard_capability_key;
    let expected = ctx.policy.expected_wildcard();
    match entitlements.get(key) {
        Some(value) if grants(value, &expected) => {},
        Some(_) => problems.push(format!("{key} does not grant {expected}")),
        None => {
            // already reported when required
            if !missing.contains(&key.as_str()) {
                problems.push(format!("{key} missing"));
            }
        },
    }

    if problems.is_empty() {
        CheckVerdict::pass(name)
    } else {
        CheckVerdict::fail(name, problems.join(", "))
    }
}
