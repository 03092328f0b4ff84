//! Indicator lists consulted by the detectors.
//!
//! The defaults are compiled in. A config file may replace any list;
//! fields it omits keep their default.

use serde::{Deserialize, Serialize};

/// Paths that only exist on a jailbroken device.
pub const DEFAULT_JAILBREAK_PATHS: &[&str] = &[
    "/Applications/Cydia.app",
    "/Applications/Sileo.app",
    "/Applications/Zebra.app",
    "/var/cache/apt",
    "/var/lib/apt",
    "/var/lib/cydia",
    "/var/tmp/cydia.log",
    "/bin/bash",
    "/usr/sbin/sshd",
    "/usr/libexec/ssh-keysign",
    "/etc/apt",
    "/private/var/lib/apt",
    "/private/var/lib/cydia",
    "/private/var/mobile/Library/SBSettings/Themes",
    "/Library/MobileSubstrate/MobileSubstrate.dylib",
    "/Library/MobileSubstrate/DynamicLibraries",
    "/System/Library/LaunchDaemons/com.saurik.Cydia.Startup.plist",
    "/private/var/stash",
    "/var/jb",
];

/// Path outside the sandbox that a confined app cannot write.
pub const DEFAULT_PROTECTED_WRITE_PATH: &str = "/private/jailbreak_test";

/// URL schemes registered by jailbreak package managers.
pub const DEFAULT_URL_SCHEMES: &[&str] = &["cydia", "sileo", "zbra"];

/// Environment variables whose presence marks a compromised host.
pub const DEFAULT_HOST_ENV_MARKERS: &[&str] = &["DYLD_INSERT_LIBRARIES"];

/// Module name fragments of hooking and instrumentation tools.
pub const DEFAULT_TOOL_MODULES: &[&str] = &[
    "frida",
    "fridagadget",
    "cynject",
    "libcycript",
    "substrate",
    "substitute",
    "sslkillswitch",
    "libhooker",
    "ellekit",
    "tweakinject",
];

/// Environment variables used to inject code at load time.
pub const DEFAULT_INJECTION_ENV_VARS: &[&str] = &[
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "_MSSafeMode",
    "LD_PRELOAD",
];

/// How a type-registry entry is compared against a tool name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypePattern {
    /// Name starts with the pattern.
    Prefix(String),
    /// Name equals the pattern.
    Exact(String),
}

impl TypePattern {
    /// Whether `name` matches.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::Exact(exact) => name == exact,
        }
    }
}

fn default_type_patterns() -> Vec<TypePattern> {
    [
        "Frida",
        "FLEX",
        "Cycript",
        "SSLKillSwitch",
        "Substrate",
        "MSHook",
        "Cephei",
    ]
    .into_iter()
    .map(|p| TypePattern::Prefix(p.to_string()))
    .chain(
        ["Liberty", "ShadowRuleset"]
            .into_iter()
            .map(|p| TypePattern::Exact(p.to_string())),
    )
    .collect()
}

/// A security-sensitive implementation and the modules allowed to own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookTarget {
    /// C symbol, or `-[Class selector]` / `+[Class selector]`.
    pub symbol: String,
    /// Module base names (without extension) that legitimately own it.
    pub expected_modules: Vec<String>,
}

impl HookTarget {
    /// Build a target from string slices.
    pub fn new(symbol: &str, expected_modules: &[&str]) -> Self {
        Self {
            symbol: symbol.to_string(),
            expected_modules: expected_modules.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Whether `module` (a path or a name) is one of the expected owners.
    ///
    /// The base name must equal an expected entry, or extend it with a
    /// `.` suffix (`libc.so.6` matches `libc`, `libcycript.dylib` does not).
    pub fn owned_by_expected(&self, module: &str) -> bool {
        let base = module.rsplit(['/', '\\']).next().unwrap_or(module);
        self.expected_modules.iter().any(|expected| {
            base == expected
                || base
                    .strip_prefix(expected.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

const FOUNDATION: &[&str] = &["Foundation"];
const UIKIT: &[&str] = &["UIKitCore", "UIKit"];
const KERNEL: &[&str] = &["libsystem_kernel", "libc"];
const LIBC: &[&str] = &["libsystem_c", "libc"];
const DYLD: &[&str] = &["libdyld", "dyld", "libc"];

fn default_method_targets() -> Vec<HookTarget> {
    vec![
        HookTarget::new("-[NSBundle bundleIdentifier]", FOUNDATION),
        HookTarget::new("-[NSBundle infoDictionary]", FOUNDATION),
        HookTarget::new("-[NSFileManager fileExistsAtPath:]", FOUNDATION),
        HookTarget::new("-[NSProcessInfo environment]", FOUNDATION),
        HookTarget::new("-[UIApplication canOpenURL:]", UIKIT),
    ]
}

fn default_symbol_targets() -> Vec<HookTarget> {
    vec![
        HookTarget::new("ptrace", KERNEL),
        HookTarget::new("sysctl", LIBC),
        HookTarget::new("getppid", KERNEL),
        HookTarget::new("stat", KERNEL),
        HookTarget::new("open", KERNEL),
        HookTarget::new("fopen", LIBC),
        HookTarget::new("getenv", LIBC),
        HookTarget::new("dlsym", DYLD),
        HookTarget::new("dladdr", DYLD),
        HookTarget::new("_dyld_get_image_name", DYLD),
    ]
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Every list the detectors match against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSet {
    /// Jailbreak artifact paths.
    pub jailbreak_paths: Vec<String>,
    /// Protected path probed with a write.
    pub protected_write_path: String,
    /// Jailbreak package-manager URL schemes.
    pub url_schemes: Vec<String>,
    /// Host-compromise environment markers.
    pub host_env_markers: Vec<String>,
    /// Hooking-tool module name fragments, matched case-insensitively.
    pub tool_modules: Vec<String>,
    /// Tool class and protocol names.
    pub type_patterns: Vec<TypePattern>,
    /// Injection environment variables.
    pub injection_env_vars: Vec<String>,
    /// Methods checked by hook detection.
    pub method_targets: Vec<HookTarget>,
    /// C symbols checked for rebinding.
    pub symbol_targets: Vec<HookTarget>,
}

impl Default for IndicatorSet {
    fn default() -> Self {
        Self {
            jailbreak_paths: owned(DEFAULT_JAILBREAK_PATHS),
            protected_write_path: DEFAULT_PROTECTED_WRITE_PATH.to_string(),
            url_schemes: owned(DEFAULT_URL_SCHEMES),
            host_env_markers: owned(DEFAULT_HOST_ENV_MARKERS),
            tool_modules: owned(DEFAULT_TOOL_MODULES),
            type_patterns: default_type_patterns(),
            injection_env_vars: owned(DEFAULT_INJECTION_ENV_VARS),
            method_targets: default_method_targets(),
            symbol_targets: default_symbol_targets(),
        }
    }
}
