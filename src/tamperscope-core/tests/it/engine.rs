//! Engine scenarios and report aggregation.

use std::sync::Arc;

use proptest::prelude::*;
use tamperscope_core::{
    CheckVerdict, StaticEnvironment, TrustEngine, TrustReport, ADVANCED_CHECKS, BASIC_CHECKS,
};

use crate::fixtures::{self, APP_ID};

fn engine(env: StaticEnvironment, required: &[&str]) -> TrustEngine {
    TrustEngine::new(fixtures::config(required), Arc::new(env))
}

// =============================================================================
// Scenarios
// =============================================================================

/// No container, matching runtime identifier: every basic check passes and
/// only the host signals decide the outcome.
#[test]
fn scenario_no_container_basic_report() {
    let report = engine(fixtures::clean_signed_env(), &["cap.a"]).run_basic_checks();
    for name in ["signature-presence", "identity-match", "organization-match", "capability-match"] {
        assert!(report.verdict(name).unwrap().passed, "{name}: {report:?}");
    }
    assert!(report.is_secure(), "{}", report.summary());

    let debugged = fixtures::clean_signed_env().with_debugger(Ok(true));
    let report = engine(debugged, &["cap.a"]).run_basic_checks();
    assert!(!report.is_secure());
    assert_eq!(report.failure_reasons(), vec!["debugger attached"]);
}

/// A container missing a required capability fails capability-match by name.
#[test]
fn scenario_missing_capability() {
    let ents = "<key>cap.a</key><true/>\
                <key>keychain-access-groups</key><array><string>TEAM1.*</string></array>";
    let env = fixtures::clean_signed_env()
        .with_container(fixtures::envelope(&fixtures::profile("TEAM1", ents)));
    let report = engine(env, &["cap.a", "cap.b"]).run_basic_checks();

    let capability = report.verdict("capability-match").unwrap();
    assert!(!capability.passed);
    assert!(capability.reason.as_deref().unwrap().contains("cap.b"));
    assert!(report.verdict("organization-match").unwrap().passed);
}

/// A loaded Frida gadget fails module-injection.
#[test]
fn scenario_frida_gadget_loaded() {
    let env = fixtures::clean_signed_env()
        .with_modules(["/usr/lib/libSystem.B.dylib", "/usr/lib/libFridaGadget.dylib"]);
    let report = engine(env, &[]).run_basic_checks();
    let injection = report.verdict("module-injection").unwrap();
    assert!(!injection.passed);
    assert!(injection.reason.as_deref().unwrap().contains("libFridaGadget.dylib"));
    assert_eq!(report.failed_checks().count(), 1);
}

#[test]
fn advanced_checks_pass_on_clean_host() {
    let report = engine(fixtures::clean_signed_env(), &[]).run_advanced_checks();
    assert_eq!(report.verdicts.len(), ADVANCED_CHECKS.len());
    assert!(report.is_secure(), "{}", report.summary());
}

#[test]
fn all_checks_concatenate_basic_then_advanced() {
    let env = fixtures::clean_signed_env()
        .with_app_identifier("com.other")
        .with_env_var("DYLD_INSERT_LIBRARIES", "/tmp/x.dylib");
    let engine = engine(env, &[]);
    let all = engine.run_all_checks();

    assert_eq!(all.verdicts.len(), BASIC_CHECKS.len() + ADVANCED_CHECKS.len());
    let basic = engine.run_basic_checks();
    let advanced = engine.run_advanced_checks();
    let mut expected = basic.failure_reasons();
    expected.extend(advanced.failure_reasons());
    assert_eq!(all.failure_reasons(), expected);
    // identity-match (basic) precedes environment-tamper (advanced);
    // DYLD_INSERT_LIBRARIES also fires host-compromise
    assert_eq!(all.failure_reasons().len(), 3);
    assert!(all.failure_reasons()[0].contains("com.other"));
}

#[test]
fn runs_are_idempotent() {
    let env = fixtures::clean_signed_env()
        .with_container(fixtures::envelope(&fixtures::profile("EVIL9", "")))
        .with_modules(["/usr/lib/substitute-loader.dylib"]);
    let engine = engine(env, &["cap.a"]);
    assert_eq!(engine.run_basic_checks(), engine.run_basic_checks());
    assert_eq!(engine.run_advanced_checks(), engine.run_advanced_checks());
}

#[test]
fn debugger_is_the_only_varying_verdict() {
    let env = fixtures::clean_signed_env().with_debugger_sequence(vec![Ok(false), Ok(true)]);
    let engine = engine(env, &[]);
    let first = engine.run_basic_checks();
    let second = engine.run_basic_checks();

    for (a, b) in first.verdicts.iter().zip(&second.verdicts) {
        if a.name == "debugger-presence" {
            assert!(a.passed && !b.passed);
        } else {
            assert_eq!(a, b);
        }
    }
}

#[test]
fn engine_exposes_cached_document() {
    let env = StaticEnvironment::new()
        .with_container(fixtures::envelope(&fixtures::profile("TEAM1", "")))
        .with_app_identifier(APP_ID);
    let engine = engine(env, &[]);
    let doc = engine.document().unwrap();
    assert_eq!(doc.team_identifiers().unwrap(), Some(vec!["TEAM1"]));
}

// =============================================================================
// Report properties
// =============================================================================

fn verdicts() -> impl Strategy<Value = Vec<CheckVerdict>> {
    prop::collection::vec(
        ("[a-z-]{1,20}", any::<bool>(), "[ -~]{0,30}").prop_map(|(name, passed, reason)| {
            if passed {
                CheckVerdict::pass(&name)
            } else {
                CheckVerdict::fail(&name, reason)
            }
        }),
        0..16,
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// is_secure is the AND of all verdicts; one reason per failure.
    #[test]
    fn report_is_conjunction(list in verdicts()) {
        let report = TrustReport::new(list.clone());
        prop_assert_eq!(report.is_secure(), list.iter().all(|v| v.passed));
        prop_assert_eq!(
            report.failure_reasons().len(),
            list.iter().filter(|v| !v.passed).count()
        );
    }

    /// Merging preserves order and the conjunction.
    #[test]
    fn merge_preserves_order(a in verdicts(), b in verdicts()) {
        let merged = TrustReport::new(a.clone()).merge(TrustReport::new(b.clone()));
        let mut expected = TrustReport::new(a).failure_reasons();
        expected.extend(TrustReport::new(b).failure_reasons());
        prop_assert_eq!(merged.failure_reasons(), expected);
    }
}
