//! Observable job state
//!
//! A `JobState` is mutated only by its owning `ExtractionJob`; the
//! registry and presentation layer read snapshots. Status never moves
//! backwards, and exactly one terminal status is ever reached.

use crate::job::spec::JobSpec;
use crate::runner::ProgressEvent;
use crate::utils::error::ClipfetchError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Resolving,
    Downloading,
    PostProcessing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Resolving => 1,
            Self::Downloading => 2,
            Self::PostProcessing => 3,
            Self::Succeeded => 4,
            Self::Failed => 4,
        }
    }

    /// Transitions move strictly forward; Failed is additionally
    /// reachable from every non-terminal state.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        next.rank() > self.rank()
    }
}

/// Latest progress snapshot for a running job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    /// Fractional completion 0..=1 of the current download
    pub fraction: f64,
    pub rate_label: Option<String>,
    pub eta_label: Option<String>,
}

/// Full observable state for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub id: String,
    pub spec: JobSpec,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub result_path: Option<PathBuf>,
    pub error_detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    pub fn new(id: String, spec: JobSpec) -> Self {
        Self {
            id,
            spec,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            result_path: None,
            error_detail: None,
            updated_at: Utc::now(),
        }
    }

    /// Move to a non-terminal status
    pub fn advance(&mut self, next: JobStatus) -> Result<()> {
        if next.is_terminal() {
            return Err(ClipfetchError::OperationFailed(
                "terminal transitions go through succeed/fail".to_string(),
            )
            .into());
        }
        if !self.status.can_transition_to(next) {
            return Err(ClipfetchError::OperationFailed(format!(
                "illegal status transition {:?} -> {:?}",
                self.status, next
            ))
            .into());
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Fold a progress event into the snapshot. An event without a
    /// fraction keeps the last known one rather than resetting it.
    pub fn apply_progress(&mut self, event: &ProgressEvent) {
        if let Some(fraction) = event.fraction {
            self.progress.fraction = fraction.clamp(0.0, 1.0);
        }
        if event.rate_label.is_some() {
            self.progress.rate_label = event.rate_label.clone();
        }
        if event.eta_label.is_some() {
            self.progress.eta_label = event.eta_label.clone();
        }
        self.touch();
    }

    /// Terminal success. `result_path` is set here and only here.
    pub fn succeed(&mut self, result_path: PathBuf) {
        debug_assert!(!self.status.is_terminal());
        self.status = JobStatus::Succeeded;
        self.result_path = Some(result_path);
        self.error_detail = None;
        self.progress.fraction = 1.0;
        self.touch();
    }

    /// Terminal failure. `error_detail` is set here and only here.
    pub fn fail(&mut self, detail: impl Into<String>) {
        debug_assert!(!self.status.is_terminal());
        self.status = JobStatus::Failed;
        self.error_detail = Some(detail.into());
        self.result_path = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
