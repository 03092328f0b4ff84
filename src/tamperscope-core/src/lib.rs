//! # tamperscope-core
//!
//! Runtime integrity checks for a packaged application: the binary is
//! signed by the expected organization, no debugger is attached, the
//! device is not jailbroken and nothing has been injected or hooked.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TrustEngine                            │
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ EngineConfig │  │ Environment  │  │  container   │       │
//! │  │ (policy,     │  │ (host / test │  │ (plist from  │       │
//! │  │  indicators) │  │  fixture)    │  │  CMS blob)   │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │                           │                                 │
//! │                           ▼                                 │
//! │  ┌──────────────────────────────────────────────────┐       │
//! │  │                   Detector                        │      │
//! │  │   basic: signature, identity, organization,       │      │
//! │  │          capability, debugger, host, modules      │      │
//! │  │   advanced: hooks, rebinding, types, env          │      │
//! │  └──────────────────────────────────────────────────┘       │
//! │                           │                                 │
//! │                           ▼                                 │
//! │  ┌──────────────────────────────────────────────────┐       │
//! │  │                  TrustReport                      │      │
//! │  │        (ordered verdicts, is_secure)              │      │
//! │  └──────────────────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//!                  ContinuousMonitor (debugger, jittered)
//! ```
//!
//! ## Properties
//!
//! - **No short-circuit**: every detector runs and reports
//! - **No error channel**: failures are folded into verdicts
//! - **Absent is not tampered**: a missing provisioning document skips the
//!   identity checks that need it
//! - **Mockable**: every OS query goes through [`Environment`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod config;
pub mod container;
pub mod document;
pub mod engine;
pub mod env;
pub mod error;
pub mod indicators;
pub mod monitor;
pub mod security;
pub mod types;

pub use config::{EngineConfig, IdentityPolicy, MonitorConfig};
pub use container::{extract_document, load_document, locate_document};
pub use document::{ContainerDocument, DocumentValue};
pub use engine::{TrustEngine, ADVANCED_CHECKS, BASIC_CHECKS};
pub use env::{
    Environment, HostConfig, HostEnvironment, ResolvedSymbol, StaticEnvironment, TypeDescriptor,
    UrlSchemeProbe,
};
pub use error::{ConfigError, ContainerError, DocumentError, QueryError, ValueError};
pub use indicators::{HookTarget, IndicatorSet, TypePattern};
pub use monitor::{MonitorExit, MonitorHandle};
pub use security::{CheckContext, Detector};
pub use types::{CheckVerdict, TrustReport};

/// Target triple this crate was compiled for.
pub fn current_target() -> &'static str {
    env!("TARGET")
}
