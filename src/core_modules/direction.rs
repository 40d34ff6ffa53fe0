// THEORY:
// The `DirectionEstimator` tells whether the object under the sensor moves left
// or right. It compares the center of gravity of the current foreground with
// the one K frames ago.
//
// Key principles:
// 1.  **Delay Line**: a fixed-capacity FIFO holds the last K distance frames.
//     Once warmed up it always holds exactly K; each call evicts the oldest
//     frame (exactly K calls old) and appends the current one.
// 2.  **Warm-up**: while fewer than K frames are buffered, the oldest frame
//     available is used as reference without evicting it.
// 3.  **Foreground**: both frames are measured against the same background,
//     `max(background - distance, 0)`, then binarized at a fraction of their
//     own maximum.
// 4.  **Decision**: LEFT when the old centroid lies further right than the
//     new one, RIGHT when further left, UNDEFINED when equal or no reference.

use crate::core_modules::centroid::{CenterOfGravity, center_of_gravity_relative};
use crate::core_modules::grid::{DistanceFrame, Grid};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    /// Delay K in frames.
    pub depth: usize,
    /// Binarization threshold as a fraction of each foreground's maximum.
    pub threshold_fraction: f32,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            depth: 10,
            threshold_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionEstimate {
    pub direction: Direction,
    pub current: CenterOfGravity,
    pub reference: Option<CenterOfGravity>,
    /// How many calls ago the reference frame was appended; 0 without one.
    pub reference_age: usize,
}

pub struct DirectionEstimator {
    depth: usize,
    threshold_fraction: f32,
    buffer: VecDeque<DistanceFrame>,
}

impl DirectionEstimator {
    pub fn new(config: &DirectionConfig) -> Self {
        let depth = config.depth.max(1);
        Self {
            depth,
            threshold_fraction: config.threshold_fraction,
            buffer: VecDeque::with_capacity(depth),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_warmed_up(&self) -> bool {
        self.buffer.len() == self.depth
    }

    pub fn estimate(
        &mut self,
        current: &DistanceFrame,
        background: &DistanceFrame,
    ) -> DirectionEstimate {
        let reference_age = self.buffer.len();
        let reference_frame = if self.is_warmed_up() {
            self.buffer.pop_front()
        } else {
            self.buffer.front().cloned()
        };

        let current_cog = self.cog(current, background);
        let reference = reference_frame.map(|frame| self.cog(&frame, background));

        let direction = match reference {
            Some(old) if old.x > current_cog.x => Direction::Left,
            Some(old) if old.x < current_cog.x => Direction::Right,
            _ => Direction::Undefined,
        };

        self.buffer.push_back(current.clone());

        DirectionEstimate {
            direction,
            current: current_cog,
            reference,
            reference_age,
        }
    }

    fn cog(&self, frame: &DistanceFrame, background: &DistanceFrame) -> CenterOfGravity {
        center_of_gravity_relative(&foreground(frame, background), self.threshold_fraction)
    }
}

/// Per-pixel height above the background, clipped at zero.
pub fn foreground(frame: &DistanceFrame, background: &DistanceFrame) -> Grid<f32> {
    debug_assert!(frame.same_dims(background));
    let mut out = background.clone();
    for (bg, &d) in out.as_mut_slice().iter_mut().zip(frame.iter()) {
        *bg = (*bg - d).max(0.0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_object_at(col: usize) -> DistanceFrame {
        let mut f = Grid::filled(8, 20, 3000.0f32);
        for row in 2..6 {
            for c in col..col + 3 {
                f.set(row, c, 1500.0);
            }
        }
        f
    }

    #[test]
    fn first_call_is_undefined() {
        let bg = Grid::filled(8, 20, 3000.0f32);
        let mut est = DirectionEstimator::new(&DirectionConfig::default());
        let e = est.estimate(&frame_with_object_at(5), &bg);
        assert_eq!(e.direction, Direction::Undefined);
        assert!(e.reference.is_none());
        assert_eq!(est.len(), 1);
    }

    #[test]
    fn moving_right_and_left() {
        let bg = Grid::filled(8, 20, 3000.0f32);
        let mut est = DirectionEstimator::new(&DirectionConfig {
            depth: 2,
            threshold_fraction: 0.1,
        });
        est.estimate(&frame_with_object_at(2), &bg);
        let e = est.estimate(&frame_with_object_at(6), &bg);
        assert_eq!(e.direction, Direction::Right);

        let mut est = DirectionEstimator::new(&DirectionConfig {
            depth: 2,
            threshold_fraction: 0.1,
        });
        est.estimate(&frame_with_object_at(12), &bg);
        let e = est.estimate(&frame_with_object_at(4), &bg);
        assert_eq!(e.direction, Direction::Left);
    }

    #[test]
    fn stationary_object_is_undefined() {
        let bg = Grid::filled(8, 20, 3000.0f32);
        let mut est = DirectionEstimator::new(&DirectionConfig::default());
        est.estimate(&frame_with_object_at(7), &bg);
        let e = est.estimate(&frame_with_object_at(7), &bg);
        assert_eq!(e.direction, Direction::Undefined);
    }

    #[test]
    fn foreground_clips_negative_heights() {
        let bg = Grid::from_vec(1, 2, vec![1000.0f32, 1000.0]).unwrap();
        let frame = Grid::from_vec(1, 2, vec![400.0f32, 1200.0]).unwrap();
        let fg = foreground(&frame, &bg);
        assert_eq!(fg.as_slice(), &[600.0, 0.0]);
    }
}
