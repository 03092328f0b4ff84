//! Fixed-answer environment for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Environment, ResolvedSymbol, TypeDescriptor};
use crate::error::QueryError;

/// An [`Environment`] whose answers are set up front.
///
/// The default instance describes an unsigned build on a clean device:
/// no container, no bundle metadata, no debugger, empty registries.
/// Debugger queries and container reads are counted.
#[derive(Debug)]
pub struct StaticEnvironment {
    container: Result<Option<Vec<u8>>, QueryError>,
    executable: Result<Vec<u8>, QueryError>,
    bundle_metadata: Result<Option<Vec<u8>>, QueryError>,
    app_identifier: Option<String>,
    debugger: Vec<Result<bool, QueryError>>,
    modules: Result<Vec<String>, QueryError>,
    types: Result<Vec<TypeDescriptor>, QueryError>,
    protocols: Result<Vec<String>, QueryError>,
    symbols: HashMap<String, ResolvedSymbol>,
    prologues: HashMap<String, Vec<u8>>,
    existing_paths: HashSet<String>,
    writable_paths: HashSet<String>,
    url_schemes: HashSet<String>,
    env_vars: HashMap<String, String>,
    debugger_queries: AtomicUsize,
    container_reads: AtomicUsize,
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self {
            container: Ok(None),
            executable: Ok(Vec::new()),
            bundle_metadata: Ok(None),
            app_identifier: None,
            debugger: vec![Ok(false)],
            modules: Ok(Vec::new()),
            types: Ok(Vec::new()),
            protocols: Ok(Vec::new()),
            symbols: HashMap::new(),
            prologues: HashMap::new(),
            existing_paths: HashSet::new(),
            writable_paths: HashSet::new(),
            url_schemes: HashSet::new(),
            env_vars: HashMap::new(),
            debugger_queries: AtomicUsize::new(0),
            container_reads: AtomicUsize::new(0),
        }
    }
}

impl StaticEnvironment {
    /// Clean, unsigned environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Container bytes.
    pub fn with_container(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.container = Ok(Some(bytes.into()));
        self
    }

    /// Container read result, including failures.
    pub fn with_container_result(mut self, result: Result<Option<Vec<u8>>, QueryError>) -> Self {
        self.container = result;
        self
    }

    /// Executable image bytes.
    pub fn with_executable(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.executable = Ok(bytes.into());
        self
    }

    /// Executable read result, including failures.
    pub fn with_executable_result(mut self, result: Result<Vec<u8>, QueryError>) -> Self {
        self.executable = result;
        self
    }

    /// Bundle metadata bytes.
    pub fn with_bundle_metadata(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.bundle_metadata = Ok(Some(bytes.into()));
        self
    }

    /// Runtime application identifier.
    pub fn with_app_identifier(mut self, id: impl Into<String>) -> Self {
        self.app_identifier = Some(id.into());
        self
    }

    /// Fixed debugger answer.
    pub fn with_debugger(mut self, result: Result<bool, QueryError>) -> Self {
        self.debugger = vec![result];
        self
    }

    /// Successive debugger answers; the last one repeats.
    pub fn with_debugger_sequence(mut self, results: Vec<Result<bool, QueryError>>) -> Self {
        if !results.is_empty() {
            self.debugger = results;
        }
        self
    }

    /// Loaded module list.
    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = Ok(modules.into_iter().map(Into::into).collect());
        self
    }

    /// Loaded module enumeration result, including failures.
    pub fn with_modules_result(mut self, result: Result<Vec<String>, QueryError>) -> Self {
        self.modules = result;
        self
    }

    /// Live type registry.
    pub fn with_types(mut self, types: Vec<TypeDescriptor>) -> Self {
        self.types = Ok(types);
        self
    }

    /// Live type enumeration result, including failures.
    pub fn with_types_result(mut self, result: Result<Vec<TypeDescriptor>, QueryError>) -> Self {
        self.types = result;
        self
    }

    /// Live protocol registry.
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = Ok(protocols.into_iter().map(Into::into).collect());
        self
    }

    /// Live protocol enumeration result, including failures.
    pub fn with_protocols_result(mut self, result: Result<Vec<String>, QueryError>) -> Self {
        self.protocols = result;
        self
    }

    /// Symbol resolution answer.
    pub fn with_symbol(mut self, name: &str, address: usize, module: &str) -> Self {
        self.symbols.insert(
            name.to_string(),
            ResolvedSymbol {
                address,
                module: module.to_string(),
            },
        );
        self
    }

    /// Prologue bytes for a symbol.
    pub fn with_prologue(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.prologues.insert(name.to_string(), bytes.into());
        self
    }

    /// A path that exists.
    pub fn with_existing_path(mut self, path: &str) -> Self {
        self.existing_paths.insert(path.to_string());
        self
    }

    /// A protected path that accepts writes.
    pub fn with_writable_path(mut self, path: &str) -> Self {
        self.writable_paths.insert(path.to_string());
        self
    }

    /// A URL scheme that can be opened.
    pub fn with_url_scheme(mut self, scheme: &str) -> Self {
        self.url_schemes.insert(scheme.to_string());
        self
    }

    /// An environment variable.
    pub fn with_env_var(mut self, name: &str, value: &str) -> Self {
        self.env_vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Number of debugger queries answered so far.
    pub fn debugger_query_count(&self) -> usize {
        self.debugger_queries.load(Ordering::SeqCst)
    }

    /// Number of container reads answered so far.
    pub fn container_read_count(&self) -> usize {
        self.container_reads.load(Ordering::SeqCst)
    }
}

impl Environment for StaticEnvironment {
    fn read_container_bytes(&self) -> Result<Option<Vec<u8>>, QueryError> {
        self.container_reads.fetch_add(1, Ordering::SeqCst);
        self.container.clone()
    }

    fn read_own_executable(&self) -> Result<Vec<u8>, QueryError> {
        self.executable.clone()
    }

    fn read_bundle_metadata(&self) -> Result<Option<Vec<u8>>, QueryError> {
        self.bundle_metadata.clone()
    }

    fn runtime_app_identifier(&self) -> Option<String> {
        self.app_identifier.clone()
    }

    fn query_debugger_attached(&self) -> Result<bool, QueryError> {
        let index = self.debugger_queries.fetch_add(1, Ordering::SeqCst);
        let last = self.debugger.len().saturating_sub(1);
        self.debugger
            .get(index.min(last))
            .cloned()
            .unwrap_or(Ok(false))
    }

    fn enumerate_loaded_modules(&self) -> Result<Vec<String>, QueryError> {
        self.modules.clone()
    }

    fn enumerate_live_types(&self) -> Result<Vec<TypeDescriptor>, QueryError> {
        self.types.clone()
    }

    fn enumerate_live_protocols(&self) -> Result<Vec<String>, QueryError> {
        self.protocols.clone()
    }

    fn resolve_symbol(&self, name: &str) -> Option<ResolvedSymbol> {
        self.symbols.get(name).cloned()
    }

    fn read_symbol_prologue(&self, name: &str, len: usize) -> Option<Vec<u8>> {
        self.prologues
            .get(name)
            .map(|bytes| bytes.iter().copied().take(len).collect())
    }

    fn filesystem_path_exists(&self, path: &str) -> bool {
        self.existing_paths.contains(path)
    }

    fn attempt_protected_write(&self, path: &str) -> bool {
        self.writable_paths.contains(path)
    }

    fn can_open_url_scheme(&self, scheme: &str) -> bool {
        self.url_schemes.contains(scheme)
    }

    fn environment_variable(&self, name: &str) -> Option<String> {
        self.env_vars.get(name).cloned()
    }
}
