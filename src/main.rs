//! clipfetch - download-task orchestrator CLI
//!
//! Hands a URL to the extraction backend, renders progress from the
//! subscribe stream, and exits 0 only when the job succeeds.

use anyhow::Result;
use clap::Parser;
use clipfetch::{
    AppSettings, JobRegistry, JobSpec, JobState, JobStatus, PathResolver, ProcessRunner,
    TargetResolution, ToolLocator, TranscodePolicy, YtDlpBackend,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "clipfetch", version, about = "Download and normalize online video")]
struct Args {
    /// Video page URL (a missing scheme defaults to https)
    url: String,

    /// Keep the downloaded container instead of converting to MP4
    #[arg(long)]
    no_mp4: bool,

    /// Quality ceiling: a pixel height like 720 or 1080, or "max"
    #[arg(long, default_value = "1080")]
    res: String,

    /// Netscape-format cookie file handed to the backend
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Download directory (defaults to the system download folder)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Extra directory probed for external tools; repeatable
    #[arg(long = "tool-dir")]
    tool_dirs: Vec<PathBuf>,

    /// Abort the download step after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the final job state as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut settings = AppSettings::default();
    settings.extra_tool_dirs = args.tool_dirs;
    settings.process_timeout = args.timeout.map(Duration::from_secs);
    if let Some(dir) = args.output_dir {
        settings.download_dir = dir;
    }

    let runner = Arc::new(ProcessRunner::new(
        ToolLocator::new(settings.extra_tool_dirs.clone()),
        settings.kill_grace,
    ));
    let transcode = Arc::new(TranscodePolicy::new(
        Arc::clone(&runner),
        settings.transcode.clone(),
    ));
    let resolver = Arc::new(PathResolver::new(Arc::clone(&transcode)));
    let backend = Arc::new(YtDlpBackend::new(
        Arc::clone(&runner),
        settings.process_timeout,
    ));
    let registry = Arc::new(JobRegistry::new(backend, resolver, transcode));

    let mut spec = JobSpec::new(args.url, settings.download_dir.clone());
    spec.target_resolution = TargetResolution::parse_lenient(&args.res);
    spec.transcode_requested = !args.no_mp4;
    spec.credentials_file = args.cookies;

    let job_id = registry.submit(spec).await?;

    // Ctrl-C cancels the job instead of orphaning the subprocess
    {
        let registry = Arc::clone(&registry);
        let job_id = job_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = registry.cancel(&job_id).await;
            }
        });
    }

    let mut updates = registry.subscribe(&job_id).await?;
    loop {
        let state = updates.borrow_and_update().clone();
        render_progress(&state);
        if state.status.is_terminal() {
            break;
        }
        if updates.changed().await.is_err() {
            break;
        }
    }
    println!();

    let final_state = registry.get(&job_id).await?;
    registry.acknowledge(&job_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&final_state)?);
    }

    match final_state.status {
        JobStatus::Succeeded => {
            if let Some(path) = &final_state.result_path {
                println!("Done: {}", path.display());
            }
            Ok(())
        }
        _ => {
            eprintln!(
                "Failed: {}",
                final_state
                    .error_detail
                    .as_deref()
                    .unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
    }
}

fn render_progress(state: &JobState) {
    let label = match state.status {
        JobStatus::Pending => "pending",
        JobStatus::Resolving => "resolving",
        JobStatus::Downloading => "downloading",
        JobStatus::PostProcessing => "post-processing",
        JobStatus::Succeeded => "done",
        JobStatus::Failed => "failed",
    };
    print!(
        "\r{:>15} {:5.1}% | {} | ETA {}      ",
        label,
        state.progress.fraction * 100.0,
        state.progress.rate_label.as_deref().unwrap_or("-"),
        state.progress.eta_label.as_deref().unwrap_or("-"),
    );
    let _ = std::io::stdout().flush();
}
