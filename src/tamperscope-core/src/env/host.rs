//! [`Environment`] backed by the running operating system.
//!
//! ## Platform Support
//!
//! - Linux/Android: `/proc/self/status` TracerPid, `/proc/self/maps`,
//!   `dlsym` + `dladdr`
//! - macOS/iOS: `sysctl` `P_TRACED`, dyld image list, Objective-C runtime
//!   registries and method implementations
//! - Windows: `IsDebuggerPresent`
//!
//! Opening URL schemes needs the application object, which only the
//! presentation layer owns. It is injected as a [`UrlSchemeProbe`].

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Environment, ResolvedSymbol, TypeDescriptor};
use crate::document::{ContainerDocument, BUNDLE_IDENTIFIER_KEY};
use crate::error::QueryError;

/// Container file name inside the application bundle.
pub const DEFAULT_CONTAINER_FILE: &str = "embedded.mobileprovision";
/// Bundle metadata file name inside the application bundle.
pub const DEFAULT_BUNDLE_METADATA_FILE: &str = "Info.plist";

/// Callback answering whether a URL scheme can be opened.
pub type UrlSchemeProbe = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Where the host environment finds packaging artifacts.
///
/// Unset paths default to files next to the running executable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Provisioning container path.
    pub container_path: Option<PathBuf>,
    /// Bundle metadata (Info.plist) path.
    pub bundle_metadata_path: Option<PathBuf>,
    /// Application identifier as launched; read from bundle metadata when unset.
    pub app_identifier: Option<String>,
}

/// The real process environment.
#[derive(Clone, Default)]
pub struct HostEnvironment {
    config: HostConfig,
    url_probe: Option<UrlSchemeProbe>,
}

impl fmt::Debug for HostEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("config", &self.config)
            .field("url_probe", &self.url_probe.is_some())
            .finish()
    }
}

impl HostEnvironment {
    /// Create a host environment.
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            url_probe: None,
        }
    }

    /// Install the URL-scheme probe supplied by the application layer.
    pub fn with_url_probe(mut self, probe: UrlSchemeProbe) -> Self {
        self.url_probe = Some(probe);
        self
    }

    fn bundle_file(&self, configured: Option<&PathBuf>, file_name: &str) -> Option<PathBuf> {
        if let Some(path) = configured {
            return Some(path.clone());
        }
        let exe = std::env::current_exe().ok()?;
        Some(exe.parent()?.join(file_name))
    }
}

fn read_optional(path: &Path, capability: &'static str) -> Result<Option<Vec<u8>>, QueryError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(QueryError::failed(capability, e)),
    }
}

impl Environment for HostEnvironment {
    fn read_container_bytes(&self) -> Result<Option<Vec<u8>>, QueryError> {
        match self.bundle_file(self.config.container_path.as_ref(), DEFAULT_CONTAINER_FILE) {
            Some(path) => read_optional(&path, "read_container_bytes"),
            None => Ok(None),
        }
    }

    fn read_own_executable(&self) -> Result<Vec<u8>, QueryError> {
        let path = std::env::current_exe()
            .map_err(|e| QueryError::failed("read_own_executable", e))?;
        std::fs::read(&path).map_err(|e| QueryError::failed("read_own_executable", e))
    }

    fn read_bundle_metadata(&self) -> Result<Option<Vec<u8>>, QueryError> {
        match self.bundle_file(
            self.config.bundle_metadata_path.as_ref(),
            DEFAULT_BUNDLE_METADATA_FILE,
        ) {
            Some(path) => read_optional(&path, "read_bundle_metadata"),
            None => Ok(None),
        }
    }

    fn runtime_app_identifier(&self) -> Option<String> {
        if let Some(id) = &self.config.app_identifier {
            return Some(id.clone());
        }
        let bytes = self.read_bundle_metadata().ok()??;
        let text = String::from_utf8(bytes).ok()?;
        let doc = ContainerDocument::parse(&text).ok()?;
        doc.get(BUNDLE_IDENTIFIER_KEY)
            .and_then(|v| v.as_str().ok())
            .map(str::to_string)
    }

    fn query_debugger_attached(&self) -> Result<bool, QueryError> {
        debugger_attached()
    }

    fn enumerate_loaded_modules(&self) -> Result<Vec<String>, QueryError> {
        loaded_modules()
    }

    fn enumerate_live_types(&self) -> Result<Vec<TypeDescriptor>, QueryError> {
        live_types()
    }

    fn enumerate_live_protocols(&self) -> Result<Vec<String>, QueryError> {
        live_protocols()
    }

    fn resolve_symbol(&self, name: &str) -> Option<ResolvedSymbol> {
        let address = symbol_address(name)?;
        let module = owning_module(address)?;
        Some(ResolvedSymbol { address, module })
    }

    fn read_symbol_prologue(&self, name: &str, len: usize) -> Option<Vec<u8>> {
        let address = symbol_address(name)?;
        // SAFETY: the address is the entry of a resolved, mapped function and
        // callers ask for a handful of bytes.
        let bytes = unsafe { std::slice::from_raw_parts(address as *const u8, len) };
        Some(bytes.to_vec())
    }

    fn filesystem_path_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn attempt_protected_write(&self, path: &str) -> bool {
        if std::fs::write(path, b"tamperscope").is_ok() {
            let _ = std::fs::remove_file(path);
            return true;
        }
        false
    }

    fn can_open_url_scheme(&self, scheme: &str) -> bool {
        match &self.url_probe {
            Some(probe) => probe(scheme),
            None => {
                debug!(scheme, "No URL-scheme probe installed");
                false
            },
        }
    }

    fn environment_variable(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Split `-[Class selector]` / `+[Class selector]` into its parts.
///
/// Returns `(is_class_method, class, selector)`.
pub(crate) fn parse_method_name(name: &str) -> Option<(bool, &str, &str)> {
    let is_class = match name.chars().next()? {
        '+' => true,
        '-' => false,
        _ => return None,
    };
    let inner = name[1..].strip_prefix('[')?.strip_suffix(']')?;
    let (class, selector) = inner.split_once(' ')?;
    if class.is_empty() || selector.is_empty() {
        return None;
    }
    Some((is_class, class, selector))
}

/// Extract the tracer pid from `/proc/<pid>/status` text.
pub(crate) fn parse_tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|rest| rest.trim().parse().ok())
}

/// Module paths from `/proc/<pid>/maps` text, first-seen order.
pub(crate) fn parse_maps_modules(maps: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in maps.lines() {
        let Some(path) = line.split_whitespace().nth(5) else {
            continue;
        };
        if path.starts_with('/') && !out.iter().any(|seen| seen == path) {
            out.push(path.to_string());
        }
    }
    out
}

// =============================================================================
// Linux/Android
// =============================================================================

#[cfg(any(target_os = "linux", target_os = "android"))]
fn debugger_attached() -> Result<bool, QueryError> {
    let status = std::fs::read_to_string("/proc/self/status")
        .map_err(|e| QueryError::failed("query_debugger_attached", e))?;
    parse_tracer_pid(&status)
        .map(|pid| pid != 0)
        .ok_or_else(|| QueryError::failed("query_debugger_attached", "TracerPid field missing"))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn loaded_modules() -> Result<Vec<String>, QueryError> {
    let maps = std::fs::read_to_string("/proc/self/maps")
        .map_err(|e| QueryError::failed("enumerate_loaded_modules", e))?;
    Ok(parse_maps_modules(&maps))
}

// =============================================================================
// macOS/iOS
// =============================================================================

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn debugger_attached() -> Result<bool, QueryError> {
    use std::mem;

    // P_TRACED from <sys/proc.h>.
    const P_TRACED: i32 = 0x0000_0800;
    // p_flag sits at a fixed offset inside kinfo_proc on arm64 and x86-64.
    const KINFO_PROC_SIZE: usize = 648;
    const P_FLAG_OFFSET: usize = 16;

    let mut buf = [0u8; KINFO_PROC_SIZE];
    let mut size: libc::size_t = KINFO_PROC_SIZE;
    // SAFETY: `buf` is large enough for kinfo_proc and `size` tells the
    // kernel how much it may write.
    let result = unsafe {
        let mut mib: [libc::c_int; 4] = [
            libc::CTL_KERN,
            libc::KERN_PROC,
            libc::KERN_PROC_PID,
            libc::getpid(),
        ];
        libc::sysctl(
            mib.as_mut_ptr(),
            4,
            buf.as_mut_ptr().cast::<libc::c_void>(),
            &mut size,
            std::ptr::null_mut(),
            0,
        )
    };

    if result != 0 {
        return Err(QueryError::failed(
            "query_debugger_attached",
            std::io::Error::last_os_error(),
        ));
    }
    if size < P_FLAG_OFFSET + mem::size_of::<i32>() {
        return Err(QueryError::failed(
            "query_debugger_attached",
            format!("short kinfo_proc ({size} bytes)"),
        ));
    }
    let mut flag = [0u8; 4];
    flag.copy_from_slice(&buf[P_FLAG_OFFSET..P_FLAG_OFFSET + 4]);
    Ok(i32::from_ne_bytes(flag) & P_TRACED != 0)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn loaded_modules() -> Result<Vec<String>, QueryError> {
    use std::ffi::CStr;

    let mut out = Vec::new();
    // SAFETY: dyld owns the returned strings for the lifetime of the image;
    // they are copied before the next call.
    unsafe {
        let count = libc::_dyld_image_count();
        for index in 0..count {
            let name = libc::_dyld_get_image_name(index);
            if !name.is_null() {
                out.push(CStr::from_ptr(name).to_string_lossy().into_owned());
            }
        }
    }
    Ok(out)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod objc {
    use std::ffi::{c_char, c_uint, c_void, CStr, CString};

    #[link(name = "objc")]
    extern "C" {
        fn objc_copyClassList(out_count: *mut c_uint) -> *mut *const c_void;
        fn objc_copyProtocolList(out_count: *mut c_uint) -> *mut *const c_void;
        fn class_getName(cls: *const c_void) -> *const c_char;
        fn class_getSuperclass(cls: *const c_void) -> *const c_void;
        fn protocol_getName(proto: *const c_void) -> *const c_char;
        fn objc_getClass(name: *const c_char) -> *const c_void;
        fn sel_registerName(name: *const c_char) -> *const c_void;
        fn class_getInstanceMethod(cls: *const c_void, sel: *const c_void) -> *const c_void;
        fn class_getClassMethod(cls: *const c_void, sel: *const c_void) -> *const c_void;
        fn method_getImplementation(method: *const c_void) -> *const c_void;
    }

    pub(super) fn classes() -> Vec<(String, bool)> {
        let mut out = Vec::new();
        // SAFETY: the runtime returns a malloc'd array of `count` class
        // pointers; only names and superclass pointers are read.
        unsafe {
            let mut count: c_uint = 0;
            let list = objc_copyClassList(&mut count);
            if list.is_null() {
                return out;
            }
            for i in 0..count as usize {
                let cls = *list.add(i);
                let name = class_getName(cls);
                if name.is_null() {
                    continue;
                }
                let has_parent = !class_getSuperclass(cls).is_null();
                out.push((CStr::from_ptr(name).to_string_lossy().into_owned(), has_parent));
            }
            libc::free(list.cast());
        }
        out
    }

    pub(super) fn protocols() -> Vec<String> {
        let mut out = Vec::new();
        // SAFETY: as for `classes`.
        unsafe {
            let mut count: c_uint = 0;
            let list = objc_copyProtocolList(&mut count);
            if list.is_null() {
                return out;
            }
            for i in 0..count as usize {
                let name = protocol_getName(*list.add(i));
                if !name.is_null() {
                    out.push(CStr::from_ptr(name).to_string_lossy().into_owned());
                }
            }
            libc::free(list.cast());
        }
        out
    }

    pub(super) fn method_implementation(is_class: bool, class: &str, selector: &str) -> Option<usize> {
        let class = CString::new(class).ok()?;
        let selector = CString::new(selector).ok()?;
        // SAFETY: all pointers come from the runtime and are checked for null.
        unsafe {
            let cls = objc_getClass(class.as_ptr());
            if cls.is_null() {
                return None;
            }
            let sel = sel_registerName(selector.as_ptr());
            let method = if is_class {
                class_getClassMethod(cls, sel)
            } else {
                class_getInstanceMethod(cls, sel)
            };
            if method.is_null() {
                return None;
            }
            let imp = method_getImplementation(method);
            (!imp.is_null()).then_some(imp as usize)
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn live_types() -> Result<Vec<TypeDescriptor>, QueryError> {
    Ok(objc::classes()
        .into_iter()
        .map(|(name, has_parent)| TypeDescriptor { name, has_parent })
        .collect())
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn live_protocols() -> Result<Vec<String>, QueryError> {
    Ok(objc::protocols())
}

// =============================================================================
// Windows
// =============================================================================

#[cfg(target_os = "windows")]
fn debugger_attached() -> Result<bool, QueryError> {
    // SAFETY: no arguments, no preconditions.
    let present = unsafe { windows_sys::Win32::System::Diagnostics::Debug::IsDebuggerPresent() };
    Ok(present != 0)
}

// =============================================================================
// Symbol resolution (Unix)
// =============================================================================

#[cfg(unix)]
fn symbol_address(name: &str) -> Option<usize> {
    use std::ffi::CString;

    if let Some((is_class, class, selector)) = parse_method_name(name) {
        return method_address(is_class, class, selector);
    }

    let symbol = CString::new(name).ok()?;
    // SAFETY: `symbol` is a valid C string; RTLD_DEFAULT searches every
    // loaded image.
    let ptr = unsafe { libc::dlsym(libc::RTLD_DEFAULT, symbol.as_ptr()) };
    (!ptr.is_null()).then_some(ptr as usize)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn method_address(is_class: bool, class: &str, selector: &str) -> Option<usize> {
    objc::method_implementation(is_class, class, selector)
}

#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
fn method_address(_is_class: bool, _class: &str, _selector: &str) -> Option<usize> {
    None
}

#[cfg(unix)]
fn owning_module(address: usize) -> Option<String> {
    use std::ffi::CStr;

    // SAFETY: dladdr fills `info` and returns non-zero on success;
    // dli_fname is checked for null before use.
    unsafe {
        let mut info: libc::Dl_info = std::mem::zeroed();
        if libc::dladdr(address as *const libc::c_void, &mut info) == 0 || info.dli_fname.is_null()
        {
            return None;
        }
        Some(CStr::from_ptr(info.dli_fname).to_string_lossy().into_owned())
    }
}

#[cfg(not(unix))]
fn symbol_address(_name: &str) -> Option<usize> {
    None
}

#[cfg(not(unix))]
fn owning_module(_address: usize) -> Option<String> {
    None
}

// =============================================================================
// Fallbacks
// =============================================================================

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "windows"
)))]
fn debugger_attached() -> Result<bool, QueryError> {
    Err(QueryError::Unsupported {
        capability: "query_debugger_attached",
    })
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
fn loaded_modules() -> Result<Vec<String>, QueryError> {
    Err(QueryError::Unsupported {
        capability: "enumerate_loaded_modules",
    })
}

// No Objective-C runtime: the registries are empty.
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn live_types() -> Result<Vec<TypeDescriptor>, QueryError> {
    Ok(Vec::new())
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn live_protocols() -> Result<Vec<String>, QueryError> {
    Ok(Vec::new())
}
