//! Completion markers for guarded steps.
//!
//! A marker's existence is the only state convergence persists between runs.
//! Its contents are informational: the step that wrote it and when.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

/// What a marker path holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerState {
    Absent,
    /// Present but not written by a guarded step.
    Foreign,
    Written(CompletionMarker),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMarker {
    pub step: String,
    pub completed_at: DateTime<Utc>,
}

impl CompletionMarker {
    pub fn now(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn to_file_contents(&self) -> String {
        format!(
            "step={}\ncompleted_at={}\n",
            self.step,
            self.completed_at.to_rfc3339()
        )
    }

    /// Parse marker contents. Returns `None` for markers written by hand
    /// (e.g. an empty `touch`), which still satisfy the guard.
    pub fn parse(contents: &str) -> Option<Self> {
        let mut step = None;
        let mut completed_at = None;
        for line in contents.lines() {
            match line.split_once('=') {
                Some(("step", value)) => step = Some(value.to_string()),
                Some(("completed_at", value)) => {
                    completed_at = DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                }
                _ => {}
            }
        }
        Some(Self {
            step: step?,
            completed_at: completed_at?,
        })
    }

    pub fn read(path: &Path) -> Result<MarkerState> {
        match fs::read(path) {
            Ok(bytes) => Ok(match Self::parse(&String::from_utf8_lossy(&bytes)) {
                Some(marker) => MarkerState::Written(marker),
                None => MarkerState::Foreign,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MarkerState::Absent),
            Err(e) => Err(Error::Filesystem(format!(
                "Failed to read marker '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}
