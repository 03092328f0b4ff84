//! Synthetic artifacts shared by the integration tests.

use tamperscope_core::{EngineConfig, IdentityPolicy, StaticEnvironment};

pub const APP_ID: &str = "com.x.y";
pub const ORG_ID: &str = "TEAM1";

/// Minimal 64-bit Mach-O executable, optionally with `LC_CODE_SIGNATURE`.
pub fn macho(signed: bool) -> Vec<u8> {
    const MH_MAGIC_64: u32 = 0xfeed_facf;
    const CPU_TYPE_ARM64: u32 = 0x0100_000c;
    const MH_EXECUTE: u32 = 2;
    const LC_CODE_SIGNATURE: u32 = 0x1d;

    let (ncmds, sizeofcmds) = if signed { (1u32, 16u32) } else { (0, 0) };
    let mut out = Vec::new();
    for word in [MH_MAGIC_64, CPU_TYPE_ARM64, 0, MH_EXECUTE, ncmds, sizeofcmds, 0, 0] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    if signed {
        // linkedit_data_command { cmd, cmdsize, dataoff, datasize }
        for word in [LC_CODE_SIGNATURE, 16, 48, 0] {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
    out
}

/// Universal binary with one slice per entry, each signed or not.
pub fn fat_macho(signed: &[bool]) -> Vec<u8> {
    const FAT_MAGIC: u32 = 0xcafe_babe;
    const CPU_TYPE_ARM64: u32 = 0x0100_000c;
    const SLICE_ALIGN: usize = 0x1000;

    let slices: Vec<Vec<u8>> = signed.iter().map(|&s| macho(s)).collect();
    let mut header = Vec::new();
    header.extend_from_slice(&FAT_MAGIC.to_be_bytes());
    header.extend_from_slice(&(slices.len() as u32).to_be_bytes());

    let mut offset = SLICE_ALIGN;
    for slice in &slices {
        // fat_arch { cputype, cpusubtype, offset, size, align }
        for word in [CPU_TYPE_ARM64, 0, offset as u32, slice.len() as u32, 12] {
            header.extend_from_slice(&word.to_be_bytes());
        }
        offset += SLICE_ALIGN;
    }

    let mut out = header;
    for slice in &slices {
        out.resize(out.len().next_multiple_of(SLICE_ALIGN), 0);
        out.extend_from_slice(slice);
    }
    out
}

/// Info.plist naming `bundle_id`.
pub fn bundle_metadata(bundle_id: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
         \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\"><dict>\
         <key>CFBundleIdentifier</key><string>{bundle_id}</string>\
         </dict></plist>"
    )
}

/// Provisioning profile document with the given team and entitlement body.
pub fn profile(team: &str, entitlements: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <plist version=\"1.0\">\n<dict>\n\
         \t<key>AppIDName</key>\n\t<string>Example</string>\n\
         \t<key>TeamIdentifier</key>\n\t<array>\n\t\t<string>{team}</string>\n\t</array>\n\
         \t<key>Entitlements</key>\n\t<dict>{entitlements}</dict>\n\
         </dict>\n</plist>"
    )
}

/// Wrap a document in bytes resembling a CMS envelope.
pub fn envelope(doc: &str) -> Vec<u8> {
    let mut bytes = vec![0x30, 0x80, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
    bytes.extend_from_slice(doc.as_bytes());
    bytes.extend_from_slice(&[0xa0, 0x82, 0x0b, 0xff, 0x00, 0x00]);
    bytes
}

/// Policy `{com.x.y, TEAM1, required}`.
pub fn config(required: &[&str]) -> EngineConfig {
    EngineConfig::new(
        IdentityPolicy::new(APP_ID, ORG_ID).with_required_capabilities(required.iter().copied()),
    )
}

/// A signed build on a clean device, without a provisioning container.
pub fn clean_signed_env() -> StaticEnvironment {
    StaticEnvironment::new()
        .with_executable(macho(true))
        .with_bundle_metadata(bundle_metadata(APP_ID))
        .with_app_identifier(APP_ID)
        .with_modules(["/usr/lib/libSystem.B.dylib", "/usr/lib/libobjc.A.dylib"])
        .with_symbol(
            "-[NSBundle bundleIdentifier]",
            0x1000,
            "/System/Library/Frameworks/Foundation.framework/Versions/C/Foundation",
        )
        .with_symbol("ptrace", 0x2000, "/usr/lib/system/libsystem_kernel.dylib")
}
