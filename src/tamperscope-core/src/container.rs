//! Identity document extraction from the provisioning container.
//!
//! The container is a CMS envelope, but it is never decoded as one. The
//! embedded property list is stored in cleartext and delimits itself, so a
//! byte-pattern search for its open and close tags is enough. The search is
//! byte exact, which keeps offsets valid over the arbitrary binary of the
//! surrounding signature blob.

use tracing::debug;

use crate::document::ContainerDocument;
use crate::env::Environment;
use crate::error::ContainerError;

/// Open tag of the embedded document.
pub const DOCUMENT_START_MARKER: &[u8] = b"<plist";
/// Close tag of the embedded document.
pub const DOCUMENT_END_MARKER: &[u8] = b"</plist>";

/// Locate the embedded document inside raw container bytes.
///
/// Returns the byte range covering both markers.
pub fn locate_document(bytes: &[u8]) -> Result<std::ops::Range<usize>, ContainerError> {
    let start = find(bytes, DOCUMENT_START_MARKER).ok_or_else(|| ContainerError::Malformed {
        reason: "document start marker not found".to_string(),
    })?;
    let after_start = start + DOCUMENT_START_MARKER.len();
    let end = find(&bytes[after_start..], DOCUMENT_END_MARKER)
        .map(|offset| after_start + offset + DOCUMENT_END_MARKER.len())
        .ok_or_else(|| ContainerError::Malformed {
            reason: "document end marker not found".to_string(),
        })?;
    Ok(start..end)
}

/// Extract and parse the embedded identity document.
pub fn extract_document(bytes: &[u8]) -> Result<ContainerDocument, ContainerError> {
    let range = locate_document(bytes)?;
    let payload = std::str::from_utf8(&bytes[range.clone()]).map_err(|e| {
        ContainerError::Malformed {
            reason: format!("document payload is not UTF-8: {e}"),
        }
    })?;
    debug!(
        offset = range.start,
        length = range.len(),
        "Located embedded identity document"
    );
    Ok(ContainerDocument::parse(payload)?)
}

/// Read the container through the environment and extract its document.
pub fn load_document(env: &dyn Environment) -> Result<ContainerDocument, ContainerError> {
    match env.read_container_bytes() {
        Ok(Some(bytes)) => extract_document(&bytes),
        Ok(None) => Err(ContainerError::Absent),
        Err(e) => Err(ContainerError::Unreadable {
            reason: e.to_string(),
        }),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
