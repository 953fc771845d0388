//! The per-job orchestrator
//!
//! Composes the extraction backend, the path resolver, and the
//! transcode policy into one cancellable unit of work. Steps within a
//! job run strictly in order; each consumes the previous step's
//! output. The job owns its `JobState` exclusively and publishes
//! snapshots through a watch channel, so exactly one terminal state is
//! ever emitted.

use crate::backend::ExtractionBackend;
use crate::job::state::{JobState, JobStatus};
use crate::resolver::PathResolver;
use crate::runner::RunnerEvent;
use crate::transcode::TranscodePolicy;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const CANCELLED_DETAIL: &str = "cancelled by caller";

pub struct ExtractionJob {
    state: JobState,
    backend: Arc<dyn ExtractionBackend>,
    resolver: Arc<PathResolver>,
    transcode: Arc<TranscodePolicy>,
    updates: watch::Sender<JobState>,
    cancel: CancellationToken,
}

impl ExtractionJob {
    pub fn new(
        state: JobState,
        backend: Arc<dyn ExtractionBackend>,
        resolver: Arc<PathResolver>,
        transcode: Arc<TranscodePolicy>,
        updates: watch::Sender<JobState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            backend,
            resolver,
            transcode,
            updates,
            cancel,
        }
    }

    /// Drive the job to its single terminal state.
    pub async fn run(mut self) {
        self.publish();
        match self.execute().await {
            Ok(path) => {
                info!("Job {} succeeded: {}", self.state.id, path.display());
                self.state.succeed(path);
            }
            Err(detail) => {
                error!("Job {} failed: {}", self.state.id, detail);
                self.state.fail(detail);
            }
        }
        self.publish();
    }

    async fn execute(&mut self) -> Result<PathBuf, String> {
        self.transition(JobStatus::Resolving)?;
        let url = self.state.spec.normalized_url();
        let options = self.state.spec.extraction_options();
        options.validate().map_err(|e| e.to_string())?;
        self.check_cancelled()?;

        self.transition(JobStatus::Downloading)?;
        let (event_tx, mut event_rx) = mpsc::channel::<RunnerEvent>(256);
        let backend = Arc::clone(&self.backend);
        let cancel = self.cancel.clone();
        let extract = async move { backend.extract(&url, &options, event_tx, cancel).await };
        tokio::pin!(extract);

        // Forward progress while the backend call runs. The event arm
        // closes when the backend drops its sender.
        let mut events_open = true;
        let outcome = loop {
            tokio::select! {
                event = event_rx.recv(), if events_open => {
                    match event {
                        Some(event) => self.consume_event(event),
                        None => events_open = false,
                    }
                }
                outcome = &mut extract => break outcome,
            }
        };
        while let Ok(event) = event_rx.try_recv() {
            self.consume_event(event);
        }
        let result = outcome.map_err(|e| self.failure_detail(e))?;

        self.transition(JobStatus::PostProcessing)?;
        let expected = result
            .primary_path()
            .ok_or_else(|| "backend returned no usable result".to_string())?
            .to_path_buf();

        // Post-processing output is log-only noise for subscribers
        let (post_tx, mut post_rx) = mpsc::channel::<RunnerEvent>(64);
        let job_id = self.state.id.clone();
        let drain = tokio::spawn(async move {
            while let Some(event) = post_rx.recv().await {
                if let RunnerEvent::Log(line) = event {
                    debug!("Job {} post-process: {}", job_id, line);
                }
            }
        });

        let located = self
            .resolver
            .resolve(&expected, post_tx.clone(), self.cancel.clone())
            .await
            .map_err(|e| self.failure_detail(e))?;

        let final_path = if self.state.spec.transcode_requested {
            self.transcode
                .ensure_container(&located, post_tx.clone(), self.cancel.clone())
                .await
        } else {
            located
        };
        drop(post_tx);
        let _ = drain.await;

        self.check_cancelled()?;
        Ok(final_path)
    }

    fn consume_event(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Progress(progress) => {
                self.state.apply_progress(&progress);
                self.publish();
            }
            RunnerEvent::Log(line) => debug!("Job {}: {}", self.state.id, line),
        }
    }

    fn transition(&mut self, status: JobStatus) -> Result<(), String> {
        self.state.advance(status).map_err(|e| e.to_string())?;
        self.publish();
        Ok(())
    }

    /// Prefer the step-local cause; a cancelled token overrides it so
    /// callers see a cancellation-specific detail.
    fn failure_detail(&self, error: anyhow::Error) -> String {
        if self.cancel.is_cancelled() {
            CANCELLED_DETAIL.to_string()
        } else {
            error.to_string()
        }
    }

    fn check_cancelled(&self) -> Result<(), String> {
        if self.cancel.is_cancelled() {
            Err(CANCELLED_DETAIL.to_string())
        } else {
            Ok(())
        }
    }

    fn publish(&self) {
        // Send only fails when every receiver is gone; the job still
        // runs to completion for `get` callers.
        let _ = self.updates.send(self.state.clone());
    }
}
