// THEORY:
// The `pipeline_worker` module runs a `TofPipeline` on a dedicated blocking
// thread and connects it to the outside world through three channels:
//
// 1.  **Control Slot**: `ControlHandle` writes into one shared
//     `PendingControls`. Later writes to the same field overwrite earlier
//     ones. The worker drains the slot with `mem::take` right before each
//     frame is processed, so a request never lands mid-frame.
// 2.  **Result Mailbox**: a `watch` channel holding the latest
//     `Arc<FrameReport>`. A slow consumer skips intermediate frames but always
//     sees a complete report.
// 3.  **Event Bus**: a `broadcast` channel for notifications that must not be
//     coalesced (exposure rejected, new person, background captured, ...).
//
// Frames are processed strictly one after another. Stop is a `watch<bool>`
// checked at every loop turn; since the source is always polled with a bounded
// timeout, stopping completes within about one poll interval.

use crate::core_modules::exposure::ExposureRequest;
use crate::error::{Result, TofError};
use crate::pipeline::{PendingControls, TofPipeline};
use crate::report::{FrameReport, PipelineEvent};
use crate::source::{Acquired, AcquisitionSource};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type LatestReport = Option<Arc<FrameReport>>;

/// Returns the mailbox report if this receiver has not seen it yet, without
/// waiting. Still yields the final report after the worker has exited.
pub fn take_unseen(results: &mut watch::Receiver<LatestReport>) -> LatestReport {
    let latest = results.borrow_and_update();
    if latest.has_changed() {
        latest.clone()
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Upper bound for one acquisition call.
    pub poll_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            event_capacity: 64,
        }
    }
}

/// What the worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub frames_processed: u64,
    pub frames_discarded: u64,
    pub gaps: u64,
    pub person_count: u64,
    /// The source ran dry, as opposed to an explicit stop.
    pub end_of_stream: bool,
}

/// Cloneable handle for steering a running worker.
#[derive(Clone)]
pub struct ControlHandle {
    pending: Arc<Mutex<PendingControls>>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl ControlHandle {
    fn with_slot(&self, f: impl FnOnce(&mut PendingControls)) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut pending);
    }

    /// Manual exposure override in microseconds.
    pub fn request_exposure(&self, value_us: f64) {
        self.with_slot(|p| {
            p.exposure.get_or_insert_with(ExposureRequest::default).value_us = Some(value_us)
        });
    }

    pub fn set_auto_exposure(&self, enabled: bool) {
        self.with_slot(|p| {
            p.exposure.get_or_insert_with(ExposureRequest::default).auto_mode = Some(enabled)
        });
    }

    pub fn capture_background(&self) {
        self.with_slot(|p| p.capture_background = true);
    }

    pub fn reset_person_counter(&self) {
        self.with_slot(|p| p.reset_counter = true);
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    fn take_pending(&self) -> PendingControls {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// A pipeline and its source, wired up but not yet running.
pub struct PipelineWorker {
    pipeline: TofPipeline,
    source: Box<dyn AcquisitionSource>,
    options: WorkerOptions,
    control: ControlHandle,
    stop_rx: watch::Receiver<bool>,
    results_tx: watch::Sender<LatestReport>,
    results_rx: watch::Receiver<LatestReport>,
    events_tx: broadcast::Sender<PipelineEvent>,
}

impl PipelineWorker {
    pub fn new(
        pipeline: TofPipeline,
        source: Box<dyn AcquisitionSource>,
        options: WorkerOptions,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (results_tx, results_rx) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            pipeline,
            source,
            options,
            control: ControlHandle {
                pending: Arc::new(Mutex::new(PendingControls::default())),
                stop_tx: Arc::new(stop_tx),
            },
            stop_rx,
            results_tx,
            results_rx,
            events_tx,
        }
    }

    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Subscribes before start so no event is missed.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events_tx.subscribe()
    }

    /// Starts processing on a blocking thread. Needs a tokio runtime.
    pub fn spawn(self) -> PipelineHandle {
        let control = self.control.clone();
        let results = self.results_rx.clone();
        let events_tx = self.events_tx.clone();
        let task = tokio::task::spawn_blocking(move || self.run());
        PipelineHandle {
            control,
            results,
            events_tx,
            task,
        }
    }

    fn run(mut self) -> Result<WorkerSummary> {
        info!(kind = ?self.source.kind(), "pipeline worker started");
        let mut summary = WorkerSummary::default();

        let outcome = loop {
            if *self.stop_rx.borrow() {
                info!("stop requested");
                break Ok(());
            }
            match self.source.next_frame(self.options.poll_timeout) {
                Ok(Acquired::Frame(raw)) => {
                    let controls = self.control.take_pending();
                    if !controls.is_empty() {
                        self.pipeline.apply_controls(controls);
                    }
                    match self.pipeline.process_frame(&raw, self.source.as_mut()) {
                        Ok(frame) => {
                            summary.frames_processed += 1;
                            for event in frame.events {
                                // No subscribers is fine.
                                let _ = self.events_tx.send(event);
                            }
                            self.results_tx.send_replace(Some(Arc::new(frame.report)));
                        }
                        Err(e) => self.discard(&mut summary, e.to_string()),
                    }
                }
                Ok(Acquired::Gap) => {
                    summary.gaps += 1;
                    debug!(gaps = summary.gaps, "acquisition gap");
                }
                Ok(Acquired::EndOfStream) => {
                    info!("source exhausted");
                    summary.end_of_stream = true;
                    break Ok(());
                }
                Err(TofError::Frame(e)) => self.discard(&mut summary, e.to_string()),
                Err(e) => {
                    error!(error = %e, "acquisition failed");
                    break Err(e);
                }
            }
        };

        summary.person_count = self.pipeline.person_count();
        let _ = self.events_tx.send(PipelineEvent::Stopped {
            frames_processed: summary.frames_processed,
        });
        info!(
            frames = summary.frames_processed,
            discarded = summary.frames_discarded,
            gaps = summary.gaps,
            people = summary.person_count,
            "pipeline worker stopped"
        );
        outcome.map(|()| summary)
    }

    fn discard(&self, summary: &mut WorkerSummary, reason: String) {
        summary.frames_discarded += 1;
        warn!(%reason, "frame discarded");
        let _ = self.events_tx.send(PipelineEvent::FrameDiscarded { reason });
    }
}

/// Handle to a running worker.
pub struct PipelineHandle {
    control: ControlHandle,
    results: watch::Receiver<LatestReport>,
    events_tx: broadcast::Sender<PipelineEvent>,
    task: JoinHandle<Result<WorkerSummary>>,
}

impl PipelineHandle {
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// The result mailbox. `changed()` fires on every published report.
    pub fn results(&self) -> watch::Receiver<LatestReport> {
        self.results.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events_tx.subscribe()
    }

    pub fn latest(&self) -> LatestReport {
        self.results.borrow().clone()
    }

    /// Requests a stop and waits for the worker to finish.
    pub async fn stop(self) -> Result<WorkerSummary> {
        self.control.stop();
        self.join().await
    }

    /// Waits for the worker to finish on its own.
    pub async fn join(self) -> Result<WorkerSummary> {
        self.task.await.map_err(|e| TofError::Worker(e.to_string()))?
    }
}
