use crate::error::{Error, ErrorKind};
use crate::plan::{Action, Operation};
use serde::Serialize;
use std::path::PathBuf;

/// What happened to one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    Applied {
        changed: bool,
    },
    SkippedByGuard,
    /// Dry run only: the guard allowed the operation but nothing was dispatched.
    WouldApply,
    Failed {
        kind: ErrorKind,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
}

impl Outcome {
    pub fn failed(error: &Error) -> Self {
        Outcome::Failed {
            kind: error.kind(),
            reason: error.to_string(),
            hint: error.suggestion(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub description: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl OperationReport {
    pub fn new(op: &Operation, outcome: Outcome) -> Self {
        Self {
            description: op.description.clone(),
            kind: op.kind.name(),
            target: op.target().map(|p| p.to_path_buf()),
            outcome,
        }
    }
}

/// Outcomes of one action on one instance, in execution order.
///
/// Operations after the first failure are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub instance: String,
    pub action: Action,
    pub dry_run: bool,
    pub converged: bool,
    pub reports: Vec<OperationReport>,
}

impl ActionResult {
    pub fn new(instance: impl Into<String>, action: Action, dry_run: bool) -> Self {
        Self {
            instance: instance.into(),
            action,
            dry_run,
            converged: true,
            reports: Vec::new(),
        }
    }

    pub fn push(&mut self, report: OperationReport) {
        if report.outcome.is_failed() {
            self.converged = false;
        }
        self.reports.push(report);
    }

    pub fn failure(&self) -> Option<&OperationReport> {
        self.reports.iter().find(|r| r.outcome.is_failed())
    }

    pub fn applied(&self) -> impl Iterator<Item = &OperationReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Applied { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &OperationReport> {
        self.reports
            .iter()
            .filter(|r| r.outcome == Outcome::SkippedByGuard)
    }

    pub fn changed_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == Outcome::Applied { changed: true })
            .count()
    }
}
