// Replay runner for the `tof_vision` library.
//
// Streams a raw DCS dump through the pipeline worker and logs every event.
// With `--json` it prints the summary of the latest published report each
// time the result mailbox changes; frames overwritten in between are skipped,
// the final frame is always printed.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tof_vision::{
    ConfigError, FrameReport, PipelineEvent, PipelineWorker, ReplaySource, SessionConfig,
    TofPipeline, WorkerOptions, take_unseen,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "tof_vision",
    about = "Run the ToF height/direction pipeline over a raw DCS dump"
)]
struct Args {
    /// YAML session configuration. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Raw DCS dump to replay.
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// Print a JSON summary line for the latest report whenever one is published.
    #[arg(long)]
    json: bool,

    /// Acquisition poll timeout in milliseconds.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}

fn print_summary(report: &FrameReport) -> Result<()> {
    println!("{}", serde_json::to_string(&report.summary())?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tof_vision=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => {
            info!("no configuration given, using defaults");
            SessionConfig::default()
        }
    };
    let replay = args.replay.as_ref().ok_or(ConfigError::MissingSource)?;

    let pipeline = TofPipeline::from_config(&config)?;
    let source = ReplaySource::open(replay, config.sensor.rows, config.sensor.cols)?;
    let worker = PipelineWorker::new(
        pipeline,
        Box::new(source),
        WorkerOptions {
            poll_timeout: Duration::from_millis(args.poll_ms),
            ..WorkerOptions::default()
        },
    );
    let mut events = worker.subscribe();
    let handle = worker.spawn();
    let mut results = handle.results();
    let control = handle.control();

    loop {
        tokio::select! {
            // Reports first: the worker publishes the last report before `Stopped`.
            biased;
            changed = results.changed() => {
                if changed.is_err() {
                    break;
                }
                if let (true, Some(report)) = (args.json, take_unseen(&mut results)) {
                    print_summary(&report)?;
                }
            }
            event = events.recv() => match event {
                Ok(PipelineEvent::Stopped { frames_processed }) => {
                    info!(frames_processed, "worker finished");
                    break;
                }
                Ok(PipelineEvent::NewPerson { frame_index, count }) => {
                    info!(frame_index, count, "person entered")
                }
                Ok(PipelineEvent::ExposureRejected { value_us, reason, .. }) => {
                    warn!(value_us, %reason, "exposure rejected")
                }
                Ok(other) => info!(event = ?other, "pipeline event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event consumer lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                control.stop();
            }
        }
    }

    // A report published just before the loop exited has not been printed yet.
    if let (true, Some(report)) = (args.json, take_unseen(&mut results)) {
        print_summary(&report)?;
    }

    let summary = handle.join().await?;
    info!(
        frames = summary.frames_processed,
        discarded = summary.frames_discarded,
        people = summary.person_count,
        "replay finished"
    );
    Ok(())
}
