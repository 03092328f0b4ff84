//! Integrity detectors.
//!
//! Each [`Detector`] is one self-contained check:
//!
//! - Signing identity: signature presence, application identity,
//!   organization and capabilities from the provisioning document
//! - Runtime tampering: debugger, injected modules, hooked methods,
//!   rebound symbols, injected runtime types, injection variables
//! - Host compromise: jailbreak artifacts and sandbox escape
//!
//! Detectors never fail with an error. Every environment or document
//! problem is folded into the verdict according to the detector's own
//! fallback: identity checks that depend on an absent document pass,
//! signal checks that cannot observe anything fail closed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tamperscope_core::security::{CheckContext, Detector};
//!
//! let verdict = Detector::DebuggerPresence.evaluate(&ctx);
//! if !verdict.passed {
//!     // restrict functionality
//! }
//! ```

mod anti_tamper;
mod identity;
mod platform;

use std::sync::OnceLock;

use crate::config::IdentityPolicy;
use crate::container::load_document;
use crate::document::ContainerDocument;
use crate::env::Environment;
use crate::error::ContainerError;
use crate::indicators::IndicatorSet;
use crate::types::CheckVerdict;

pub use anti_tamper::{check_debugger, is_branch_trampoline};
pub use identity::has_code_signature;

/// Lazily loaded document, shared by every detector of one engine.
pub type DocumentCell = OnceLock<Result<ContainerDocument, ContainerError>>;

/// Everything a detector reads.
#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    /// Expected identity.
    pub policy: &'a IdentityPolicy,
    /// Indicator lists.
    pub indicators: &'a IndicatorSet,
    /// Host capabilities.
    pub env: &'a dyn Environment,
    document: &'a DocumentCell,
}

impl<'a> CheckContext<'a> {
    /// Bundle the inputs of a check run.
    pub fn new(
        policy: &'a IdentityPolicy,
        indicators: &'a IndicatorSet,
        env: &'a dyn Environment,
        document: &'a DocumentCell,
    ) -> Self {
        Self {
            policy,
            indicators,
            env,
            document,
        }
    }

    /// The provisioning document, loaded on first access.
    pub fn document(&self) -> Result<&'a ContainerDocument, &'a ContainerError> {
        self.document.get_or_init(|| load_document(self.env)).as_ref()
    }
}

/// The closed set of integrity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detector {
    /// Executable is code-signed and bundle metadata names the expected app.
    SignaturePresence,
    /// Runtime application identifier equals the expected one.
    IdentityMatch,
    /// Document signing organization equals the expected one.
    OrganizationMatch,
    /// Document grants the required capabilities.
    CapabilityMatch,
    /// No debugger is tracing the process.
    DebuggerPresence,
    /// No jailbreak or sandbox escape signal.
    HostCompromise,
    /// No hooking tool module is loaded.
    ModuleInjection,
    /// Security-sensitive methods resolve into their system modules.
    HookDetection,
    /// Security-sensitive C symbols resolve into their system modules.
    SymbolRebinding,
    /// No tool class or protocol is registered at runtime.
    TypeRegistryInjection,
    /// No injection environment variable is set.
    EnvironmentTamper,
}

impl Detector {
    /// Every detector, basic set first.
    pub const ALL: [Detector; 11] = [
        Detector::SignaturePresence,
        Detector::IdentityMatch,
        Detector::OrganizationMatch,
        Detector::CapabilityMatch,
        Detector::DebuggerPresence,
        Detector::HostCompromise,
        Detector::ModuleInjection,
        Detector::HookDetection,
        Detector::SymbolRebinding,
        Detector::TypeRegistryInjection,
        Detector::EnvironmentTamper,
    ];

    /// Stable name used in verdicts and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignaturePresence => "signature-presence",
            Self::IdentityMatch => "identity-match",
            Self::OrganizationMatch => "organization-match",
            Self::CapabilityMatch => "capability-match",
            Self::DebuggerPresence => "debugger-presence",
            Self::HostCompromise => "host-compromise",
            Self::ModuleInjection => "module-injection",
            Self::HookDetection => "hook-detection",
            Self::SymbolRebinding => "symbol-rebinding",
            Self::TypeRegistryInjection => "type-registry-injection",
            Self::EnvironmentTamper => "environment-tamper",
        }
    }

    /// Look a detector up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Run the check.
    pub fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckVerdict {
        let name = self.name();
        match self {
            Self::SignaturePresence => identity::signature_presence(name, ctx),
            Self::IdentityMatch => identity::identity_match(name, ctx),
            Self::OrganizationMatch => identity::organization_match(name, ctx),
            Self::CapabilityMatch => identity::capability_match(name, ctx),
            Self::DebuggerPresence => check_debugger(ctx.env),
            Self::HostCompromise => platform::host_compromise(name, ctx),
            Self::ModuleInjection => anti_tamper::module_injection(name, ctx),
            Self::HookDetection => {
                anti_tamper::hooked_targets(name, ctx.env, &ctx.indicators.method_targets)
            },
            Self::SymbolRebinding => {
                anti_tamper::hooked_targets(name, ctx.env, &ctx.indicators.symbol_targets)
            },
            Self::TypeRegistryInjection => anti_tamper::type_registry_injection(name, ctx),
            Self::EnvironmentTamper => anti_tamper::environment_tamper(name, ctx),
        }
    }
}

impl std::fmt::Display for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
