//! Detector behavior against synthetic environments.

use std::sync::Arc;

use tamperscope_core::security::has_code_signature;
use tamperscope_core::{
    CheckVerdict, Detector, IndicatorSet, StaticEnvironment, TrustEngine,
};

use crate::fixtures::{self, APP_ID, ORG_ID};

fn verdict(env: StaticEnvironment, required: &[&str], detector: Detector) -> CheckVerdict {
    let engine = TrustEngine::new(fixtures::config(required), Arc::new(env));
    engine.run(&[detector]).verdicts.remove(0)
}

// =============================================================================
// Signature presence
// =============================================================================

#[test]
fn code_signature_load_command_is_found() {
    assert_eq!(has_code_signature(&fixtures::macho(true)), Ok(true));
    assert_eq!(has_code_signature(&fixtures::macho(false)), Ok(false));
    assert!(has_code_signature(b"#!/bin/sh\n").is_err());
}

#[test]
fn universal_binary_needs_every_slice_signed() {
    assert_eq!(has_code_signature(&fixtures::fat_macho(&[true, true])), Ok(true));
    assert_eq!(has_code_signature(&fixtures::fat_macho(&[true, false])), Ok(false));
    assert_eq!(has_code_signature(&fixtures::fat_macho(&[false, true])), Ok(false));
    assert_eq!(has_code_signature(&fixtures::fat_macho(&[])), Ok(false));
}

#[test]
fn universal_binary_slice_out_of_bounds_is_an_error() {
    let mut image = fixtures::fat_macho(&[true]);
    // first fat_arch.offset
    image[16..20].copy_from_slice(&0x00ff_0000u32.to_be_bytes());
    let err = has_code_signature(&image).unwrap_err();
    assert!(err.contains("out of bounds"), "{err}");
}

#[test]
fn signature_presence_passes_for_signed_universal_binary() {
    let env = fixtures::clean_signed_env().with_executable(fixtures::fat_macho(&[true, true]));
    let v = verdict(env, &[], Detector::SignaturePresence);
    assert!(v.passed, "{v:?}");
}

#[test]
fn signature_presence_passes_for_signed_matching_bundle() {
    let v = verdict(fixtures::clean_signed_env(), &[], Detector::SignaturePresence);
    assert!(v.passed, "{v:?}");
}

#[test]
fn signature_presence_fails_for_unsigned_binary() {
    let env = fixtures::clean_signed_env().with_executable(fixtures::macho(false));
    let v = verdict(env, &[], Detector::SignaturePresence);
    assert_eq!(v.reason.as_deref(), Some("executable has no code signature"));
}

#[test]
fn signature_presence_fails_for_foreign_bundle_identifier() {
    let env = fixtures::clean_signed_env().with_bundle_metadata(fixtures::bundle_metadata("com.evil"));
    let v = verdict(env, &[], Detector::SignaturePresence);
    assert!(!v.passed);
    assert!(v.reason.unwrap().contains("com.evil"));
}

#[test]
fn signature_presence_fails_without_bundle_metadata() {
    let env = StaticEnvironment::new().with_executable(fixtures::macho(true));
    assert!(!verdict(env, &[], Detector::SignaturePresence).passed);
}

// =============================================================================
// Absent container fallbacks
// =============================================================================

#[test]
fn absent_container_passes_document_checks_for_any_policy() {
    for required in [&[][..], &["cap.a"][..], &["cap.a", "cap.b", "keychain-access-groups"][..]] {
        for detector in [Detector::OrganizationMatch, Detector::CapabilityMatch] {
            let v = verdict(StaticEnvironment::new(), required, detector);
            assert!(v.passed, "{detector} with {required:?}: {v:?}");
        }
    }
}

#[test]
fn malformed_container_passes_document_checks() {
    let env = || StaticEnvironment::new().with_container(b"\x30\x82 truncated".to_vec());
    assert!(verdict(env(), &["cap.a"], Detector::OrganizationMatch).passed);
    assert!(verdict(env(), &["cap.a"], Detector::CapabilityMatch).passed);
}

#[test]
fn deeply_nested_container_passes_document_checks() {
    let depth = 200_000;
    let doc = format!(
        "<plist><dict><key>k</key>{}{}</dict></plist>",
        "<array>".repeat(depth),
        "</array>".repeat(depth)
    );
    let engine = TrustEngine::new(
        fixtures::config(&["cap.a"]),
        Arc::new(fixtures::clean_signed_env().with_container(fixtures::envelope(&doc))),
    );
    let report = engine.run_basic_checks();
    for name in ["organization-match", "capability-match"] {
        let v = report.verdict(name).unwrap();
        assert!(v.passed, "{v:?}");
        assert!(v.reason.as_deref().unwrap().contains("nesting"), "{v:?}");
    }
}

#[test]
fn identity_match_ignores_container_presence() {
    let with_container = StaticEnvironment::new()
        .with_container(fixtures::envelope(&fixtures::profile(ORG_ID, "")))
        .with_app_identifier("com.other");
    assert!(!verdict(with_container, &[], Detector::IdentityMatch).passed);

    let without = StaticEnvironment::new().with_app_identifier(APP_ID);
    assert!(verdict(without, &[], Detector::IdentityMatch).passed);
}

// =============================================================================
// Capability match
// =============================================================================

fn wildcard(value: &str) -> String {
    format!("<key>keychain-access-groups</key><array><string>{value}</string></array>")
}

#[test]
fn capability_match_requires_every_key() {
    let ents = format!("<key>cap.a</key><true/>{}", wildcard("TEAM1.*"));
    let env = StaticEnvironment::new().with_container(fixtures::envelope(&fixtures::profile(ORG_ID, &ents)));
    let v = verdict(env, &["cap.a", "cap.b"], Detector::CapabilityMatch);
    assert!(!v.passed);
    assert!(v.reason.unwrap().contains("cap.b"));
}

#[test]
fn capability_match_requires_exact_wildcard_even_with_all_keys() {
    for value in ["TEAM1", "TEAM1.com.x.y", "OTHER.*", "TEAM1.**"] {
        let ents = format!("<key>cap.a</key><true/>{}", wildcard(value));
        let env = StaticEnvironment::new().with_container(fixtures::envelope(&fixtures::profile(ORG_ID, &ents)));
        let v = verdict(env, &["cap.a"], Detector::CapabilityMatch);
        assert!(!v.passed, "{value} accepted");
    }
}

#[test]
fn capability_match_passes_with_keys_and_wildcard() {
    let ents = format!("<key>cap.a</key><true/>{}", wildcard("TEAM1.*"));
    let env = StaticEnvironment::new().with_container(fixtures::envelope(&fixtures::profile(ORG_ID, &ents)));
    assert!(verdict(env, &["cap.a"], Detector::CapabilityMatch).passed);
}

#[test]
fn organization_match_rejects_foreign_team() {
    let env = StaticEnvironment::new().with_container(fixtures::envelope(&fixtures::profile("EVIL9", "")));
    let v = verdict(env, &[], Detector::OrganizationMatch);
    assert!(!v.passed);
    assert!(v.reason.unwrap().contains("EVIL9"));
}

// =============================================================================
// Host compromise
// =============================================================================

#[test]
fn host_compromise_fails_on_any_single_signal() {
    let indicators = IndicatorSet::default();
    let signals: Vec<StaticEnvironment> = vec![
        StaticEnvironment::new().with_existing_path(&indicators.jailbreak_paths[0]),
        StaticEnvironment::new().with_writable_path(&indicators.protected_write_path),
        StaticEnvironment::new().with_url_scheme(&indicators.url_schemes[0]),
        StaticEnvironment::new().with_env_var(&indicators.host_env_markers[0], "1"),
    ];
    for env in signals {
        assert!(!verdict(env, &[], Detector::HostCompromise).passed);
    }
    assert!(verdict(StaticEnvironment::new(), &[], Detector::HostCompromise).passed);
}

#[test]
fn host_compromise_reports_all_fired_signals() {
    let env = StaticEnvironment::new()
        .with_existing_path("/Applications/Cydia.app")
        .with_writable_path("/private/jailbreak_test")
        .with_url_scheme("cydia")
        .with_env_var("DYLD_INSERT_LIBRARIES", "/tmp/tweak.dylib");
    let reason = verdict(env, &[], Detector::HostCompromise).reason.unwrap();
    for fragment in ["Cydia.app", "sandbox", "cydia", "DYLD_INSERT_LIBRARIES"] {
        assert!(reason.contains(fragment), "{fragment} missing from {reason}");
    }
}
