// THEORY:
// The `BackgroundModel` holds the scene as it looks with nobody in it. Height
// and direction are both measured against it.
//
// - **Manual**: a single frame captured on demand and held until the next
//   capture request. If no capture has happened yet, the first frame seen is
//   taken.
// - **Auto**: the arithmetic mean of the last N distance frames, kept in a
//   bounded ring. The mean is re-derived from the ring contents on every
//   update, so it always equals a direct mean of the frames currently held.
//
// A capture request in auto mode restarts the ring from the current frame.

use crate::core_modules::grid::{DistanceFrame, Grid};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub mode: BackgroundMode,
    /// Capacity N of the auto-mode ring buffer.
    pub depth: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            mode: BackgroundMode::Auto,
            depth: 500,
        }
    }
}

pub struct BackgroundModel {
    mode: BackgroundMode,
    depth: usize,
    /// Auto mode: the last `depth` frames, oldest first.
    frames: VecDeque<DistanceFrame>,
    /// Manual mode: the captured frame. Auto mode: the mean of `frames`.
    background: Option<DistanceFrame>,
    capture_requested: bool,
}

impl BackgroundModel {
    pub fn new(config: &BackgroundConfig) -> Self {
        let depth = config.depth.max(1);
        Self {
            mode: config.mode,
            depth,
            frames: VecDeque::with_capacity(if config.mode == BackgroundMode::Auto {
                depth
            } else {
                0
            }),
            background: None,
            capture_requested: false,
        }
    }

    pub fn mode(&self) -> BackgroundMode {
        self.mode
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of frames in the auto-mode ring.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn background(&self) -> Option<&DistanceFrame> {
        self.background.as_ref()
    }

    /// The next `update` replaces the background with that frame.
    pub fn request_capture(&mut self) {
        self.capture_requested = true;
    }

    /// Feeds one distance frame. Returns true when the frame was captured as
    /// a new manual background or restarted the auto ring.
    pub fn update(&mut self, frame: &DistanceFrame) -> bool {
        let capture = std::mem::take(&mut self.capture_requested);
        match self.mode {
            BackgroundMode::Manual => {
                if capture || self.background.is_none() {
                    self.background = Some(frame.clone());
                    return true;
                }
                false
            }
            BackgroundMode::Auto => {
                if capture {
                    self.frames.clear();
                }
                if self.frames.len() == self.depth {
                    self.frames.pop_front();
                }
                self.frames.push_back(frame.clone());
                self.background = Some(self.mean_of_ring());
                capture
            }
        }
    }

    fn mean_of_ring(&self) -> DistanceFrame {
        let Some(first) = self.frames.front() else {
            return Grid::new(0, 0);
        };
        let (rows, cols) = first.dims();
        let mut sum = vec![0.0f64; rows * cols];
        for frame in &self.frames {
            for (acc, &v) in sum.iter_mut().zip(frame.iter()) {
                *acc += v as f64;
            }
        }
        let n = self.frames.len() as f64;
        Grid::from_fn(rows, cols, |row, col| (sum[row * cols + col] / n) as f32)
    }
}
