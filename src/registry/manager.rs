//! Job registry with concurrent execution support
//!
//! Tracks running jobs, fans their state out to subscribers, and owns
//! cancellation. Submission is non-blocking: each job runs on its own
//! spawned task. No exception crosses this boundary; callers only ever
//! observe `JobState` snapshots.

use crate::backend::ExtractionBackend;
use crate::job::{ExtractionJob, JobSpec, JobState};
use crate::resolver::PathResolver;
use crate::transcode::TranscodePolicy;
use crate::utils::error::ClipfetchError;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle for one tracked job
struct JobHandle {
    state_rx: watch::Receiver<JobState>,
    cancel: CancellationToken,
    join_handle: JoinHandle<()>,
}

/// Registry of concurrently running extraction jobs
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, JobHandle>>>,
    backend: Arc<dyn ExtractionBackend>,
    resolver: Arc<PathResolver>,
    transcode: Arc<TranscodePolicy>,
}

impl JobRegistry {
    pub fn new(
        backend: Arc<dyn ExtractionBackend>,
        resolver: Arc<PathResolver>,
        transcode: Arc<TranscodePolicy>,
    ) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            backend,
            resolver,
            transcode,
        }
    }

    /// Validate the spec and start the job. Returns immediately with
    /// the job id; the work runs off the caller's thread of control.
    pub async fn submit(&self, spec: JobSpec) -> Result<String> {
        spec.validate()?;
        tokio::fs::create_dir_all(&spec.output_dir).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let state = JobState::new(id.clone(), spec);
        let (state_tx, state_rx) = watch::channel(state.clone());
        let cancel = CancellationToken::new();

        let job = ExtractionJob::new(
            state,
            Arc::clone(&self.backend),
            Arc::clone(&self.resolver),
            Arc::clone(&self.transcode),
            state_tx,
            cancel.clone(),
        );
        let join_handle = tokio::spawn(job.run());

        let mut jobs = self.jobs.lock().await;
        jobs.insert(
            id.clone(),
            JobHandle {
                state_rx,
                cancel,
                join_handle,
            },
        );
        info!("Submitted job {}", id);
        Ok(id)
    }

    /// Request cancellation. A no-op for jobs already in a terminal
    /// state; otherwise the active subprocess is terminated and the
    /// job fails with a cancellation-specific detail.
    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        let jobs = self.jobs.lock().await;
        let handle = jobs
            .get(job_id)
            .ok_or_else(|| ClipfetchError::JobNotFound(job_id.to_string()))?;

        if handle.state_rx.borrow().status.is_terminal() {
            info!("Cancel of terminal job {} is a no-op", job_id);
            return Ok(());
        }
        info!("Cancelling job {}", job_id);
        handle.cancel.cancel();
        Ok(())
    }

    /// Subscribe to state updates. A receiver created after the job
    /// completed immediately observes the last (terminal) state.
    pub async fn subscribe(&self, job_id: &str) -> Result<watch::Receiver<JobState>> {
        let jobs = self.jobs.lock().await;
        let handle = jobs
            .get(job_id)
            .ok_or_else(|| ClipfetchError::JobNotFound(job_id.to_string()))?;
        Ok(handle.state_rx.clone())
    }

    /// Snapshot of the current state
    pub async fn get(&self, job_id: &str) -> Result<JobState> {
        let jobs = self.jobs.lock().await;
        let handle = jobs
            .get(job_id)
            .ok_or_else(|| ClipfetchError::JobNotFound(job_id.to_string()))?;
        let state = handle.state_rx.borrow().clone();
        Ok(state)
    }

    /// Snapshots of all tracked jobs
    pub async fn all(&self) -> Vec<JobState> {
        let jobs = self.jobs.lock().await;
        jobs.values().map(|h| h.state_rx.borrow().clone()).collect()
    }

    /// Evict a terminal job after the caller has seen its outcome.
    /// Refuses to evict a job that is still running.
    pub async fn acknowledge(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let handle = jobs
            .get(job_id)
            .ok_or_else(|| ClipfetchError::JobNotFound(job_id.to_string()))?;

        if !handle.state_rx.borrow().status.is_terminal() {
            return Err(ClipfetchError::OperationFailed(format!(
                "job {} is still running",
                job_id
            ))
            .into());
        }
        if let Some(handle) = jobs.remove(job_id) {
            if !handle.join_handle.is_finished() {
                warn!("Evicting job {} before its task settled", job_id);
                handle.join_handle.abort();
            }
        }
        info!("Evicted job {}", job_id);
        Ok(())
    }
}
