//! Check verdicts and the aggregated trust report.

use serde::{Deserialize, Serialize};

/// Outcome of a single detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckVerdict {
    /// Detector name.
    pub name: String,

    /// Whether the check passed.
    pub passed: bool,

    /// Why it failed. Passing verdicts may carry a note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CheckVerdict {
    /// A passing verdict.
    pub fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            reason: None,
        }
    }

    /// A passing verdict with an explanatory note (e.g. a fallback).
    pub fn pass_with_note(name: &str, note: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            reason: Some(note.into()),
        }
    }

    /// A failing verdict.
    pub fn fail(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            reason: Some(reason.into()),
        }
    }

    /// Failure reason, if this verdict failed.
    pub fn failure_reason(&self) -> Option<&str> {
        if self.passed {
            None
        } else {
            Some(self.reason.as_deref().unwrap_or("check failed"))
        }
    }
}

/// Ordered verdicts of one check run.
///
/// `is_secure` and `failure_reasons` are derived, never stored, so they
/// cannot disagree with the verdicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustReport {
    /// Verdicts in execution order.
    pub verdicts: Vec<CheckVerdict>,
}

impl TrustReport {
    /// Wrap a verdict list.
    pub fn new(verdicts: Vec<CheckVerdict>) -> Self {
        Self { verdicts }
    }

    /// True when every verdict passed (vacuously true when empty).
    pub fn is_secure(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }

    /// One reason per failed verdict, in verdict order.
    pub fn failure_reasons(&self) -> Vec<String> {
        self.verdicts
            .iter()
            .filter_map(CheckVerdict::failure_reason)
            .map(str::to_string)
            .collect()
    }

    /// Verdicts that failed.
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckVerdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }

    /// Look up a verdict by detector name.
    pub fn verdict(&self, name: &str) -> Option<&CheckVerdict> {
        self.verdicts.iter().find(|v| v.name == name)
    }

    /// Concatenate two reports, `self` first.
    #[must_use]
    pub fn merge(mut self, other: TrustReport) -> TrustReport {
        self.verdicts.extend(other.verdicts);
        self
    }

    /// `"ok"`, or the failure reasons joined by `"; "`.
    pub fn summary(&self) -> String {
        if self.is_secure() {
            "ok".to_string()
        } else {
            self.failure_reasons().join("; ")
        }
    }
}
