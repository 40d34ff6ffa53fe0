// THEORY:
// The `source` module models where raw frames come from. There are exactly two
// kinds, chosen once at startup:
//
// - **LiveSource**: a camera reached through a `CameraLink`. Exposure changes
//   are written to the sensor and may be refused.
// - **ReplaySource**: previously recorded frames, either in memory or streamed
//   from a raw DCS dump. Exposure changes are recorded and always accepted.
//
// Both implement `AcquisitionSource`, which hands out one whole frame per call
// or reports a gap. A call blocks for at most the given timeout, so a worker
// polling a silent camera can still notice a stop request.
//
// `ExposureSink` is the hardware exposure-apply boundary on its own. The
// orchestrator only needs that half of a source to push exposure changes.

use crate::core_modules::exposure::ExposureChannel;
use crate::core_modules::grid::RawFrame;
use crate::error::{ConfigError, HardwareError, TofError};
use crate::replay::ReplayReader;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one acquisition call.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquired {
    Frame(RawFrame),
    /// Nothing arrived this tick. Buffered pipeline state is left untouched.
    Gap,
    /// The source is exhausted and will not produce further frames.
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Live,
    Replay,
}

/// Accepts integer-microsecond exposure values for one camera channel.
pub trait ExposureSink {
    fn apply_exposure(
        &mut self,
        value_us: u32,
        channel: ExposureChannel,
    ) -> Result<(), HardwareError>;
}

pub trait AcquisitionSource: ExposureSink + Send {
    /// Blocks for at most `timeout`. Never returns a partially filled frame.
    fn next_frame(&mut self, timeout: Duration) -> Result<Acquired, TofError>;

    fn kind(&self) -> SourceKind;
}

/// The transport to a physical camera.
pub trait CameraLink: Send {
    /// `Ok(None)` when no frame arrived within `timeout`.
    fn grab_dcs(&mut self, timeout: Duration) -> Result<Option<RawFrame>, HardwareError>;

    fn set_integration_time(
        &mut self,
        channel: ExposureChannel,
        value_us: u32,
    ) -> Result<(), HardwareError>;
}

pub struct LiveSource<L: CameraLink> {
    link: L,
    grab_failures: u64,
}

impl<L: CameraLink> LiveSource<L> {
    pub fn new(link: L) -> Self {
        Self { link, grab_failures: 0 }
    }

    pub fn grab_failures(&self) -> u64 {
        self.grab_failures
    }
}

impl<L: CameraLink> ExposureSink for LiveSource<L> {
    fn apply_exposure(
        &mut self,
        value_us: u32,
        channel: ExposureChannel,
    ) -> Result<(), HardwareError> {
        self.link.set_integration_time(channel, value_us)
    }
}

impl<L: CameraLink> AcquisitionSource for LiveSource<L> {
    fn next_frame(&mut self, timeout: Duration) -> Result<Acquired, TofError> {
        match self.link.grab_dcs(timeout) {
            Ok(Some(frame)) => Ok(Acquired::Frame(frame)),
            Ok(None) => Ok(Acquired::Gap),
            // Link hiccups are treated as a missed tick; reconnecting is the link's job.
            Err(e) => {
                self.grab_failures += 1;
                warn!(error = %e, failures = self.grab_failures, "frame grab failed");
                Ok(Acquired::Gap)
            }
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }
}

enum Feed {
    /// `None` entries replay as acquisition gaps.
    Memory(VecDeque<Option<RawFrame>>),
    Dump(ReplayReader<BufReader<File>>),
}

pub struct ReplaySource {
    feed: Feed,
    applied: Vec<(u32, ExposureChannel)>,
}

impl ReplaySource {
    pub fn from_frames(frames: impl IntoIterator<Item = RawFrame>) -> Self {
        Self::from_schedule(frames.into_iter().map(Some))
    }

    /// Replays `schedule` in order, with `None` standing for a missed tick.
    pub fn from_schedule(schedule: impl IntoIterator<Item = Option<RawFrame>>) -> Self {
        Self {
            feed: Feed::Memory(schedule.into_iter().collect()),
            applied: Vec::new(),
        }
    }

    /// Streams a raw DCS dump recorded from a `rows x cols` sensor.
    pub fn open(path: impl AsRef<Path>, rows: usize, cols: usize) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!(path = %path.display(), rows, cols, "replaying raw DCS dump");
        Ok(Self {
            feed: Feed::Dump(ReplayReader::new(BufReader::new(file), rows, cols)),
            applied: Vec::new(),
        })
    }

    /// Every exposure pushed to this source, oldest first.
    pub fn applied_exposures(&self) -> &[(u32, ExposureChannel)] {
        &self.applied
    }
}

impl ExposureSink for ReplaySource {
    fn apply_exposure(
        &mut self,
        value_us: u32,
        channel: ExposureChannel,
    ) -> Result<(), HardwareError> {
        debug!(value_us, %channel, "replay exposure recorded");
        self.applied.push((value_us, channel));
        Ok(())
    }
}

impl AcquisitionSource for ReplaySource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<Acquired, TofError> {
        match &mut self.feed {
            Feed::Memory(queue) => Ok(match queue.pop_front() {
                Some(Some(frame)) => Acquired::Frame(frame),
                Some(None) => Acquired::Gap,
                None => Acquired::EndOfStream,
            }),
            Feed::Dump(reader) => Ok(match reader.read_frame()? {
                Some(frame) => Acquired::Frame(frame),
                None => Acquired::EndOfStream,
            }),
        }
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Replay
    }
}
