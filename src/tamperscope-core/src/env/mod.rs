//! Environment capabilities consumed by the checks.
//!
//! Every OS primitive a detector needs goes through [`Environment`], so the
//! whole detector set can run against [`StaticEnvironment`] in tests and
//! against [`HostEnvironment`] in a real process. Implementations must be
//! stateless from the caller's point of view: the engine and the monitor
//! query the same instance concurrently.

mod fixture;
mod host;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

pub use fixture::StaticEnvironment;
pub use host::{HostConfig, HostEnvironment, UrlSchemeProbe};

/// One entry of the runtime type registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Registered type name.
    pub name: String,
    /// Whether the type has a parent type. Root types are skipped by the
    /// registry scan.
    pub has_parent: bool,
}

impl TypeDescriptor {
    /// A type with a parent.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_parent: true,
        }
    }

    /// A root type (no parent).
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_parent: false,
        }
    }
}

/// Where a symbol or method implementation lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSymbol {
    /// Implementation address.
    pub address: usize,
    /// Path or name of the module that owns the address.
    pub module: String,
}

/// Capabilities provided by the host platform.
pub trait Environment: Send + Sync {
    /// Raw bytes of the provisioning container, `None` when there is none.
    fn read_container_bytes(&self) -> Result<Option<Vec<u8>>, QueryError>;

    /// Raw bytes of the running executable image.
    fn read_own_executable(&self) -> Result<Vec<u8>, QueryError>;

    /// Raw bytes of the bundle metadata document, `None` when there is none.
    fn read_bundle_metadata(&self) -> Result<Option<Vec<u8>>, QueryError>;

    /// Application identifier reported by the runtime.
    fn runtime_app_identifier(&self) -> Option<String>;

    /// Whether the process is being traced.
    fn query_debugger_attached(&self) -> Result<bool, QueryError>;

    /// Paths or names of every loaded dynamic module.
    fn enumerate_loaded_modules(&self) -> Result<Vec<String>, QueryError>;

    /// Live entries of the runtime class registry.
    fn enumerate_live_types(&self) -> Result<Vec<TypeDescriptor>, QueryError>;

    /// Live entries of the runtime protocol registry.
    fn enumerate_live_protocols(&self) -> Result<Vec<String>, QueryError>;

    /// Resolve a C symbol or an Objective-C method (`-[Class sel]`,
    /// `+[Class sel]`) to its implementation.
    fn resolve_symbol(&self, name: &str) -> Option<ResolvedSymbol>;

    /// First `len` bytes of a symbol's implementation, when readable.
    fn read_symbol_prologue(&self, _name: &str, _len: usize) -> Option<Vec<u8>> {
        None
    }

    /// Whether a filesystem path exists.
    fn filesystem_path_exists(&self, path: &str) -> bool;

    /// Try to write outside the sandbox; `true` means the write succeeded.
    fn attempt_protected_write(&self, path: &str) -> bool;

    /// Whether a URL scheme can be opened.
    fn can_open_url_scheme(&self, scheme: &str) -> bool;

    /// Value of an environment variable.
    fn environment_variable(&self, name: &str) -> Option<String>;
}
