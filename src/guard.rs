//! Idempotency guards.

use crate::error::{Error, Result};
use crate::plan::GuardCondition;
use std::io;
use std::path::Path;

/// What a guard decided for the operation it protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Run,
    Skip,
}

/// Evaluates guard predicates against the live filesystem.
///
/// Evaluation happens immediately before dispatch, so effects of earlier
/// operations in the same run are visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardEvaluator;

impl GuardEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, guard: &GuardCondition) -> Result<GuardDecision> {
        match guard {
            GuardCondition::PathAbsentRequired(path) => {
                if path_exists(path)? {
                    Ok(GuardDecision::Skip)
                } else {
                    Ok(GuardDecision::Run)
                }
            }
        }
    }
}

/// `NotFound` is absence; any other error is reported rather than treated
/// as absent. Dangling symlinks count as present.
fn path_exists(path: &Path) -> Result<bool> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::GuardEvaluation {
            path: path.to_path_buf(),
            source,
        }),
    }
}
