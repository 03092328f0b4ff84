//! Property-based tests for provisioning document extraction.

use proptest::prelude::*;

use tamperscope_core::container::{DOCUMENT_END_MARKER, DOCUMENT_START_MARKER};
use tamperscope_core::document::MAX_NESTING_DEPTH;
use tamperscope_core::{
    extract_document, locate_document, ContainerError, DocumentError, DocumentValue,
};

use crate::fixtures;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Arbitrary binary that never contains the start marker.
fn binary_without_marker(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..max_len)
        .prop_filter("must not contain the start marker", |bytes| {
            !contains(bytes, DOCUMENT_START_MARKER)
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// Extraction recovers exactly the embedded document.
    #[test]
    fn extraction_round_trip(
        prefix in binary_without_marker(512),
        suffix in prop::collection::vec(any::<u8>(), 0..512),
        team in "[A-Z0-9]{10}",
        group in "[a-z]{1,12}",
    ) {
        let doc = fixtures::profile(
            &team,
            &format!("<key>application-identifier</key><string>{team}.{group}</string>"),
        );
        let mut bytes = prefix.clone();
        bytes.extend_from_slice(doc.as_bytes());
        bytes.extend_from_slice(&suffix);

        let offset = doc.find("<plist").unwrap();
        let range = locate_document(&bytes).unwrap();
        prop_assert_eq!(range.start, prefix.len() + offset);
        prop_assert_eq!(&bytes[range], doc[offset..].as_bytes());

        let extracted = extract_document(&bytes).unwrap();
        prop_assert_eq!(extracted.team_identifiers().unwrap(), Some(vec![team.as_str()]));
        let entitlements = extracted.entitlements().unwrap().unwrap();
        prop_assert_eq!(
            entitlements.get("application-identifier"),
            Some(&DocumentValue::String(format!("{team}.{group}")))
        );
    }

    /// Without a start marker the container is malformed, never a parse failure.
    #[test]
    fn missing_start_marker_is_malformed(bytes in binary_without_marker(1024)) {
        let err = extract_document(&bytes).unwrap_err();
        prop_assert!(matches!(err, ContainerError::Malformed { .. }), "got {:?}", err);
    }

    /// A start marker with no end marker after it is malformed.
    #[test]
    fn missing_end_marker_is_malformed(
        prefix in binary_without_marker(256),
        tail in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(!contains(&tail, DOCUMENT_END_MARKER));
        let mut bytes = prefix;
        bytes.extend_from_slice(DOCUMENT_START_MARKER);
        bytes.extend_from_slice(&tail);
        prop_assume!(!contains(&bytes, DOCUMENT_END_MARKER));

        let err = extract_document(&bytes).unwrap_err();
        prop_assert!(matches!(err, ContainerError::Malformed { .. }), "got {:?}", err);
    }
}

// ============================================================================
// Deterministic Tests
// ============================================================================

#[test]
fn first_end_marker_after_start_wins() {
    let bytes = b"</plist>\x00<plist><dict/></plist>\xff</plist>";
    let range = locate_document(bytes).unwrap();
    assert_eq!(&bytes[range], b"<plist><dict/></plist>");
}

#[test]
fn markers_without_plist_body_fail_to_parse() {
    let err = extract_document(&fixtures::envelope("<plist></plist>")).unwrap_err();
    assert!(matches!(err, ContainerError::DocumentParseFailed(_)), "got {err:?}");
}

#[test]
fn non_dict_root_fails_to_parse() {
    let err = extract_document(&fixtures::envelope("<plist><string>x</string></plist>"))
        .unwrap_err();
    assert!(matches!(err, ContainerError::DocumentParseFailed(_)), "got {err:?}");
}

#[test]
fn runaway_nesting_fails_to_parse() {
    let depth = 200_000;
    let doc = format!(
        "<plist><dict><key>k</key>{}{}</dict></plist>",
        "<array>".repeat(depth),
        "</array>".repeat(depth)
    );
    let err = extract_document(&fixtures::envelope(&doc)).unwrap_err();
    assert_eq!(
        err,
        ContainerError::DocumentParseFailed(DocumentError::TooDeep {
            limit: MAX_NESTING_DEPTH
        })
    );
}

#[test]
fn profile_fields_are_exposed() {
    let doc = extract_document(&fixtures::envelope(&fixtures::profile("TEAM1", ""))).unwrap();
    assert_eq!(doc.app_id_name(), Some("Example"));
    assert!(doc.entitlements().unwrap().unwrap().is_empty());
    assert_eq!(doc.to_json()["TeamIdentifier"][0], "TEAM1");
}
