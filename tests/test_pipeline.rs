// tests/test_pipeline.rs -- End-to-end tests of the frame orchestrator and the
// background worker.
//
// Scenes are authored as sensor-oriented distance images (rows x cols, mm) and
// encoded back into DCS quadruples in acquisition orientation, so every frame
// goes through the real unwrapping path.

use std::collections::VecDeque;
use std::f64::consts::{PI, TAU};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tof_vision::config::{SensorConfig, SessionConfig};
use tof_vision::core_modules::background::BackgroundMode;
use tof_vision::core_modules::exposure::{ExposureChannel, ExposureRequest};
use tof_vision::core_modules::grid::{DistanceFrame, Grid, RawFrame};
use tof_vision::pipeline::{Direction, PendingControls};
use tof_vision::{
    Acquired, AcquisitionSource, CameraLink, ExposureSink, FrameError, HardwareError, LiveSource,
    PipelineEvent, PipelineWorker, ReplaySource, TofPipeline, WorkerOptions, take_unseen,
};

const ROWS: usize = 10;
const COLS: usize = 24;
const RANGE_MM: f64 = 7500.0;
const FLOOR_MM: f32 = 3000.0;

fn session() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.sensor = SensorConfig { rows: ROWS, cols: COLS };
    config.quality.under_floor = 0;
    config.background.mode = BackgroundMode::Manual;
    config.height.kernel_width = 3;
    config.height.kernel_height = 3;
    config.height.sigma = 1.0;
    config.height.band_min_col = 4;
    config.height.band_max_col = 20;
    config.direction.depth = 2;
    config
}

fn floor() -> DistanceFrame {
    Grid::filled(ROWS, COLS, FLOOR_MM)
}

/// A person seen from above: a 4x4 block 1800 mm above the floor.
fn person_at(col: usize) -> DistanceFrame {
    let mut frame = floor();
    for row in 3..7 {
        for c in col..col + 4 {
            frame.set(row, c, 1200.0);
        }
    }
    frame
}

/// Encodes a sensor-oriented distance image at 20 MHz into a raw frame.
fn encode(distance: &DistanceFrame) -> RawFrame {
    const BIAS: f64 = 20_000.0;
    const A: f64 = 2_000.0; // amplitude 1000, inside the "good" band
    let mut planes: [Grid<u16>; 4] = std::array::from_fn(|_| Grid::new(COLS, ROWS));
    for row in 0..ROWS {
        for col in 0..COLS {
            let theta = distance.get(row, col) as f64 / RANGE_MM * TAU - PI;
            planes[0].set(col, row, BIAS as u16);
            planes[1].set(col, row, BIAS as u16);
            planes[2].set(col, row, (BIAS + A * theta.cos()).round() as u16);
            planes[3].set(col, row, (BIAS + A * theta.sin()).round() as u16);
        }
    }
    RawFrame::new(planes).unwrap()
}

/// Camera stand-in: serves a fixed list of frames, refuses exposures above a limit.
struct ScriptedLink {
    frames: VecDeque<RawFrame>,
    repeat_last: Option<RawFrame>,
    max_exposure_us: u32,
    applied: Arc<Mutex<Vec<u32>>>,
    delay: Duration,
}

impl ScriptedLink {
    fn new(frames: Vec<RawFrame>) -> Self {
        Self {
            frames: frames.into(),
            repeat_last: None,
            max_exposure_us: u32::MAX,
            applied: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }
}

impl CameraLink for ScriptedLink {
    fn grab_dcs(&mut self, timeout: Duration) -> Result<Option<RawFrame>, HardwareError> {
        std::thread::sleep(self.delay.min(timeout));
        Ok(self.frames.pop_front().or_else(|| self.repeat_last.clone()))
    }

    fn set_integration_time(
        &mut self,
        channel: ExposureChannel,
        value_us: u32,
    ) -> Result<(), HardwareError> {
        if value_us > self.max_exposure_us {
            return Err(HardwareError::ExposureRejected {
                value_us,
                channel,
                reason: "above sensor limit".into(),
            });
        }
        self.applied.lock().unwrap().push(value_us);
        Ok(())
    }
}

#[test]
fn stages_produce_height_position_and_people() {
    let mut pipeline = TofPipeline::from_config(&session()).unwrap();
    let mut sink = ReplaySource::from_frames(Vec::new());

    let scenes = [floor(), floor(), person_at(10), person_at(10), floor(), person_at(11)];
    let mut reports = Vec::new();
    for scene in &scenes {
        reports.push(pipeline.process_frame(&encode(scene), &mut sink).unwrap().report);
    }

    assert!(reports[0].height.abs() < 1.0);
    assert_eq!(reports[0].distance.dims(), (ROWS, COLS));
    assert!((reports[0].distance.get(0, 0) - FLOOR_MM).abs() < 1.0);

    let first = &reports[2];
    assert!((first.height - 1800.0).abs() < 1.0, "height {}", first.height);
    assert!((4..6).contains(&first.position.0));
    assert!((11..13).contains(&first.position.1));
    assert!(first.position_correct);
    assert!(first.new_person);
    assert!(!reports[3].new_person);

    assert_eq!(reports[5].person_count, 2);
    assert_eq!(pipeline.person_count(), 2);
    assert_eq!(reports.iter().map(|r| r.frame_index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn walking_person_has_a_direction() {
    let mut pipeline = TofPipeline::from_config(&session()).unwrap();
    let mut sink = ReplaySource::from_frames(Vec::new());
    pipeline.process_frame(&encode(&floor()), &mut sink).unwrap();

    let mut directions = Vec::new();
    for col in [4, 7, 10, 13, 16] {
        let outcome = pipeline.process_frame(&encode(&person_at(col)), &mut sink).unwrap();
        directions.push(outcome.report.direction);
    }
    // first reference is the empty floor, a degenerate centroid at (0, 0)
    assert!(directions[1..].iter().all(|&d| d == Direction::Right));
}

#[test]
fn rejected_exposure_rolls_back_and_notifies() {
    let mut config = session();
    config.quality.under_floor = 1500; // every frame biased to "reduce exposure"
    config.exposure.initial_us = 300.0;
    let mut pipeline = TofPipeline::from_config(&config).unwrap();

    struct RefusingSink;
    impl ExposureSink for RefusingSink {
        fn apply_exposure(
            &mut self,
            value_us: u32,
            channel: ExposureChannel,
        ) -> Result<(), HardwareError> {
            Err(HardwareError::ExposureRejected {
                value_us,
                channel,
                reason: "link busy".into(),
            })
        }
    }

    let outcome = pipeline.process_frame(&encode(&floor()), &mut RefusingSink).unwrap();
    assert!(outcome.events.iter().any(|e| matches!(
        e,
        PipelineEvent::ExposureRejected { value_us: 270, restored_us, .. } if *restored_us == 300.0
    )));
    assert_eq!(outcome.report.exposure.value_us, 300.0);

    // processing continues with the previous exposure
    let again = pipeline.process_frame(&encode(&floor()), &mut RefusingSink).unwrap();
    assert_eq!(again.report.exposure.value_us, 300.0);
}

#[test]
fn manual_override_applies_at_next_frame() {
    let mut pipeline = TofPipeline::from_config(&session()).unwrap();
    let mut sink = ReplaySource::from_frames(Vec::new());
    pipeline.process_frame(&encode(&floor()), &mut sink).unwrap();

    pipeline.apply_controls(PendingControls {
        exposure: Some(ExposureRequest {
            value_us: Some(512.0),
            auto_mode: Some(false),
        }),
        ..PendingControls::default()
    });
    let outcome = pipeline.process_frame(&encode(&floor()), &mut sink).unwrap();
    assert_eq!(outcome.report.exposure.value_us, 512.0);
    assert!(!outcome.report.exposure.auto_mode);
    assert_eq!(sink.applied_exposures().last(), Some(&(512, ExposureChannel::ThreeD)));
    assert!(outcome.events.contains(&PipelineEvent::ExposureApplied {
        value_us: 512,
        channel: ExposureChannel::ThreeD,
    }));
}

#[test]
fn capture_request_replaces_manual_background() {
    let mut pipeline = TofPipeline::from_config(&session()).unwrap();
    let mut sink = ReplaySource::from_frames(Vec::new());

    let first = pipeline.process_frame(&encode(&floor()), &mut sink).unwrap();
    assert!(first.events.contains(&PipelineEvent::BackgroundCaptured { frame_index: 0 }));

    // a parked object becomes part of the scene after recapture
    pipeline.apply_controls(PendingControls {
        capture_background: true,
        ..PendingControls::default()
    });
    let captured = pipeline.process_frame(&encode(&person_at(10)), &mut sink).unwrap();
    assert!(captured.events.contains(&PipelineEvent::BackgroundCaptured { frame_index: 1 }));
    assert!(captured.report.height.abs() < 1.0);
}

#[test]
fn frame_with_wrong_dimensions_is_discarded() {
    let mut pipeline = TofPipeline::from_config(&session()).unwrap();
    let mut sink = ReplaySource::from_frames(Vec::new());
    let wrong = RawFrame::new(std::array::from_fn(|_| Grid::new(ROWS, COLS))).unwrap();

    let err = pipeline.process_frame(&wrong, &mut sink).unwrap_err();
    assert!(matches!(err, FrameError::SessionMismatch { .. }));
    assert_eq!(pipeline.frames_processed(), 0);
    assert!(pipeline.background().is_none());
}

#[test]
fn non_finite_override_keeps_last_exposure() {
    let mut pipeline = TofPipeline::from_config(&session()).unwrap();
    let mut sink = ReplaySource::from_frames(Vec::new());
    let before = pipeline.process_frame(&encode(&floor()), &mut sink).unwrap();
    let applied_before = sink.applied_exposures().len();

    pipeline.apply_controls(PendingControls {
        exposure: Some(ExposureRequest {
            value_us: Some(f64::NAN),
            auto_mode: Some(false),
        }),
        ..PendingControls::default()
    });
    for _ in 0..3 {
        let outcome = pipeline.process_frame(&encode(&floor()), &mut sink).unwrap();
        assert_eq!(outcome.report.exposure.value_us, before.report.exposure.value_us);
        assert!(!outcome.report.exposure.auto_mode);
    }
    assert_eq!(sink.applied_exposures().len(), applied_before);
}

#[test]
fn auto_background_absorbs_a_person_who_stays() {
    let depth = 4;
    let mut config = session();
    config.background.mode = BackgroundMode::Auto;
    config.background.depth = depth;
    let mut pipeline = TofPipeline::from_config(&config).unwrap();
    let mut sink = ReplaySource::from_frames(Vec::new());

    for _ in 0..depth {
        pipeline.process_frame(&encode(&floor()), &mut sink).unwrap();
    }
    let heights: Vec<f64> = (0..depth + 2)
        .map(|_| {
            let outcome = pipeline.process_frame(&encode(&person_at(10)), &mut sink).unwrap();
            outcome.report.height
        })
        .collect();

    // the person contributes to the ring mean from their first frame on
    assert!(heights[0] > 1000.0, "height {}", heights[0]);
    assert!(heights.windows(2).all(|w| w[1] <= w[0] + 1.0), "{heights:?}");
    // once the ring holds only frames with the person, they are background
    assert!(heights[depth - 1].abs() < 1.0, "{heights:?}");
    assert!(heights[depth + 1].abs() < 1.0);
}

#[tokio::test]
async fn final_report_is_still_unseen_after_stopped() {
    let pipeline = TofPipeline::from_config(&session()).unwrap();
    let schedule: Vec<_> = (0..5).map(|col| Some(encode(&person_at(col + 4)))).collect();
    let worker = PipelineWorker::new(
        pipeline,
        Box::new(ReplaySource::from_schedule(schedule)),
        WorkerOptions::default(),
    );
    let mut events = worker.subscribe();
    let handle = worker.spawn();
    let mut results = handle.results();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !matches!(events.recv().await, Ok(PipelineEvent::Stopped { .. }) | Err(_)) {}
    })
    .await
    .expect("worker never stopped");

    let last = take_unseen(&mut results).expect("final report was never published");
    assert_eq!(last.frame_index, 4);
    assert!(take_unseen(&mut results).is_none());
    handle.join().await.unwrap();
}

#[tokio::test]
async fn worker_replays_to_end_of_stream() {
    let pipeline = TofPipeline::from_config(&session()).unwrap();
    let schedule = vec![
        Some(encode(&floor())),
        None,
        Some(encode(&person_at(10))),
        Some(encode(&floor())),
        Some(encode(&person_at(12))),
    ];
    let source = ReplaySource::from_schedule(schedule);
    let worker = PipelineWorker::new(pipeline, Box::new(source), WorkerOptions::default());
    let mut events = worker.subscribe();
    let handle = worker.spawn();
    let results = handle.results();

    let summary = handle.join().await.unwrap();
    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.gaps, 1);
    assert_eq!(summary.person_count, 2);
    assert!(summary.end_of_stream);

    let latest = results.borrow().clone().unwrap();
    assert_eq!(latest.frame_index, 3);
    assert_eq!(latest.person_count, 2);

    let mut people = 0;
    let mut stopped = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::NewPerson { .. } => people += 1,
            PipelineEvent::Stopped { frames_processed } => {
                assert_eq!(frames_processed, 4);
                stopped = true;
            }
            _ => {}
        }
    }
    assert_eq!(people, 2);
    assert!(stopped);
}

#[tokio::test]
async fn stop_completes_while_camera_is_silent() {
    let pipeline = TofPipeline::from_config(&session()).unwrap();
    let mut link = ScriptedLink::new(Vec::new());
    link.delay = Duration::from_secs(60);
    let options = WorkerOptions {
        poll_timeout: Duration::from_millis(20),
        ..WorkerOptions::default()
    };
    let handle = PipelineWorker::new(pipeline, Box::new(LiveSource::new(link)), options).spawn();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let summary = tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("worker did not stop in time")
        .unwrap();
    assert_eq!(summary.frames_processed, 0);
    assert!(summary.gaps > 0);
    assert!(!summary.end_of_stream);
}

#[tokio::test]
async fn control_requests_reach_the_running_pipeline() {
    let pipeline = TofPipeline::from_config(&session()).unwrap();
    let mut link = ScriptedLink::new(vec![encode(&floor())]);
    link.repeat_last = Some(encode(&floor()));
    link.delay = Duration::from_millis(2);
    let applied = link.applied.clone();

    let source = Box::new(LiveSource::new(link));
    let handle = PipelineWorker::new(pipeline, source, WorkerOptions::default()).spawn();
    let control = handle.control();
    control.set_auto_exposure(false);
    control.request_exposure(777.0);

    let mut results = handle.results();
    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if results.changed().await.is_err() {
                return None;
            }
            let latest = results.borrow_and_update().clone();
            if let Some(report) = latest {
                if report.exposure.value_us == 777.0 {
                    return Some(report);
                }
            }
        }
    })
    .await
    .expect("override never applied")
    .expect("worker exited early");

    assert!(!seen.exposure.auto_mode);
    assert!(applied.lock().unwrap().contains(&777));
    handle.stop().await.unwrap();
}

#[test]
fn live_source_delivers_scripted_frames() {
    let mut source = LiveSource::new(ScriptedLink::new(vec![encode(&floor())]));
    let timeout = Duration::from_millis(1);
    assert!(matches!(source.next_frame(timeout).unwrap(), Acquired::Frame(_)));
    assert_eq!(source.next_frame(timeout).unwrap(), Acquired::Gap);
}
