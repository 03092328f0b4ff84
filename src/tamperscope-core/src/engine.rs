//! Check engine.
//!
//! Runs an ordered list of detectors against one environment and collects
//! their verdicts into a [`TrustReport`]:
//! 1. Every detector runs, in order, whatever the previous ones returned
//! 2. A detector that panics yields a failed verdict instead of unwinding
//! 3. The provisioning document is loaded at most once per engine
//!
//! ## Check sets
//!
//! - [`BASIC_CHECKS`]: identity and host state, cheap
//! - [`ADVANCED_CHECKS`]: runtime tampering, walks process registries

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::document::ContainerDocument;
use crate::env::{Environment, HostEnvironment};
use crate::error::ContainerError;
use crate::monitor::{self, MonitorHandle};
use crate::security::{CheckContext, Detector, DocumentCell};
use crate::types::{CheckVerdict, TrustReport};

/// Identity and host-state checks.
pub const BASIC_CHECKS: &[Detector] = &[
    Detector::SignaturePresence,
    Detector::IdentityMatch,
    Detector::OrganizationMatch,
    Detector::CapabilityMatch,
    Detector::DebuggerPresence,
    Detector::HostCompromise,
    Detector::ModuleInjection,
];

/// Runtime tampering checks.
pub const ADVANCED_CHECKS: &[Detector] = &[
    Detector::HookDetection,
    Detector::SymbolRebinding,
    Detector::TypeRegistryInjection,
    Detector::EnvironmentTamper,
];

/// The trust engine.
///
/// Cheap to query repeatedly: only the document is cached, everything
/// else is observed fresh on each run.
pub struct TrustEngine {
    config: EngineConfig,
    env: Arc<dyn Environment>,
    document: DocumentCell,
}

impl std::fmt::Debug for TrustEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustEngine")
            .field("config", &self.config)
            .field("document_loaded", &self.document.get().is_some())
            .finish_non_exhaustive()
    }
}

impl TrustEngine {
    /// Create an engine over an environment.
    pub fn new(config: EngineConfig, env: Arc<dyn Environment>) -> Self {
        info!(
            app_id = %config.policy.expected_app_id,
            org_id = %config.policy.expected_org_id,
            required = config.policy.required_capabilities.len(),
            "TrustEngine: initialized"
        );
        Self {
            config,
            env,
            document: DocumentCell::new(),
        }
    }

    /// Create an engine over the running process.
    pub fn for_host(config: EngineConfig) -> Self {
        let env = HostEnvironment::new(config.host.clone());
        Self::new(config, Arc::new(env))
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Environment the checks query.
    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.env
    }

    /// The provisioning document, loaded on first access.
    pub fn document(&self) -> Result<&ContainerDocument, &ContainerError> {
        self.context().document()
    }

    fn context(&self) -> CheckContext<'_> {
        CheckContext::new(
            &self.config.policy,
            &self.config.indicators,
            self.env.as_ref(),
            &self.document,
        )
    }

    /// Run detectors in order and collect every verdict.
    #[instrument(skip_all, fields(checks = detectors.len()))]
    pub fn run(&self, detectors: &[Detector]) -> TrustReport {
        let ctx = self.context();
        let verdicts: Vec<CheckVerdict> = detectors
            .iter()
            .map(|detector| evaluate_guarded(*detector, &ctx))
            .inspect(log_verdict)
            .collect();

        let report = TrustReport::new(verdicts);
        let failed = report.failed_checks().count();
        info!(
            checks = report.verdicts.len(),
            failed,
            secure = report.is_secure(),
            "Check run complete"
        );
        report
    }

    /// Run [`BASIC_CHECKS`].
    pub fn run_basic_checks(&self) -> TrustReport {
        self.run(BASIC_CHECKS)
    }

    /// Run [`ADVANCED_CHECKS`].
    pub fn run_advanced_checks(&self) -> TrustReport {
        self.run(ADVANCED_CHECKS)
    }

    /// Basic then advanced, merged into one report.
    pub fn run_all_checks(&self) -> TrustReport {
        self.run_basic_checks().merge(self.run_advanced_checks())
    }

    /// Start re-checking for a debugger in the background.
    ///
    /// `on_debugger_detected` runs at most once, on the monitor task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start_continuous_monitor<F>(&self, on_debugger_detected: F) -> MonitorHandle
    where
        F: FnOnce(CheckVerdict) + Send + 'static,
    {
        monitor::spawn(Arc::clone(&self.env), self.config.monitor, on_debugger_detected)
    }
}

fn evaluate_guarded(detector: Detector, ctx: &CheckContext<'_>) -> CheckVerdict {
    catch_unwind(AssertUnwindSafe(|| detector.evaluate(ctx))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        CheckVerdict::fail(detector.name(), format!("check panicked: {message}"))
    })
}

fn log_verdict(verdict: &CheckVerdict) {
    if verdict.passed {
        debug!(check = %verdict.name, note = ?verdict.reason, "Check passed");
    } else {
        warn!(
            check = %verdict.name,
            reason = verdict.failure_reason().unwrap_or_default(),
            "Check failed"
        );
    }
}
