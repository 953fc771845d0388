use crate::backend::models::{ExtractionOptions, ExtractionResult};
use crate::runner::RunnerEvent;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The extraction boundary.
///
/// Everything that actually talks to media sites lives behind this
/// trait; the orchestration core only sees progress events and the
/// final result. Any error from `extract` is treated as job failure
/// with the message captured verbatim.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Unique identifier for this backend (e.g. "yt-dlp")
    fn id(&self) -> &'static str;

    /// Run one extraction to completion.
    ///
    /// Progress and log events are delivered through `events` in
    /// production order. Cancelling the token must terminate any
    /// subprocess the backend spawned.
    async fn extract(
        &self,
        url: &str,
        options: &ExtractionOptions,
        events: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult>;
}
