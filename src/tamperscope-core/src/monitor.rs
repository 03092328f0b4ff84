//! Continuous debugger monitor.
//!
//! A background task that re-runs the debugger check at random intervals,
//! so an attacher cannot time itself between two fixed checks:
//!
//! 1. Stop if cancelled
//! 2. Query the debugger; on detection, report once and stop
//! 3. Sleep a uniformly random interval in `[min, max]`, waking early on
//!    cancellation
//!
//! Dropping the [`MonitorHandle`] cancels the task.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::env::Environment;
use crate::security::check_debugger;
use crate::types::CheckVerdict;

/// Why the monitor task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Cancelled through the handle.
    Cancelled,
    /// A debugger was detected and reported.
    DebuggerDetected,
    /// The detection callback panicked.
    Panicked,
}

/// Handle to a running monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<MonitorExit>,
}

impl MonitorHandle {
    /// Ask the monitor to stop. Safe to call repeatedly and from any thread.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end.
    pub async fn join(self) -> MonitorExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(error = %e, "Monitor task failed");
                MonitorExit::Panicked
            },
        }
    }
}

/// Spawn the monitor on the current tokio runtime.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn<F>(env: Arc<dyn Environment>, config: MonitorConfig, on_detected: F) -> MonitorHandle
where
    F: FnOnce(CheckVerdict) + Send + 'static,
{
    let (cancel, cancelled) = watch::channel(false);
    let task = tokio::spawn(run(env, sanitized(config), cancelled, on_detected));
    MonitorHandle { cancel, task }
}

/// Repair bounds that would spin: `min` becomes at least 1 ms and `max`
/// at least `min`.
pub fn sanitized(config: MonitorConfig) -> MonitorConfig {
    if let Err(e) = config.validate() {
        let min_interval_ms = config.min_interval_ms.max(1);
        let repaired = MonitorConfig {
            min_interval_ms,
            max_interval_ms: config.max_interval_ms.max(min_interval_ms),
        };
        warn!(
            error = %e,
            min_ms = repaired.min_interval_ms,
            max_ms = repaired.max_interval_ms,
            "Invalid monitor bounds, clamped"
        );
        return repaired;
    }
    config
}

async fn run<F>(
    env: Arc<dyn Environment>,
    config: MonitorConfig,
    mut cancelled: watch::Receiver<bool>,
    on_detected: F,
) -> MonitorExit
where
    F: FnOnce(CheckVerdict) + Send + 'static,
{
    info!(
        min_ms = config.min_interval_ms,
        max_ms = config.max_interval_ms,
        "Continuous monitor started"
    );

    loop {
        if *cancelled.borrow() {
            info!("Continuous monitor cancelled");
            return MonitorExit::Cancelled;
        }

        let verdict = check_debugger(env.as_ref());
        if !verdict.passed {
            warn!(reason = ?verdict.reason, "Debugger detected by continuous monitor");
            on_detected(verdict);
            return MonitorExit::DebuggerDetected;
        }

        let pause = next_interval(&config);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {},
            changed = cancelled.changed() => {
                // sender dropped
                if changed.is_err() {
                    info!("Monitor handle dropped, stopping");
                    return MonitorExit::Cancelled;
                }
            },
        }
    }
}

/// Uniform pause in `[min, max]`. Inverted bounds collapse to `min`.
pub fn next_interval(config: &MonitorConfig) -> Duration {
    let min = config.min_interval_ms;
    let max = config.max_interval_ms.max(min);
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}
