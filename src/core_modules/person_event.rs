// THEORY:
// The `PersonEventDetector` turns the per-frame height estimate into discrete
// "a new person entered" events and keeps the running count.
//
// Key principles:
// 1.  **Height Class**: a frame is "present" when its calibrated height is
//     strictly above `present_threshold` (mm, the unit used across the whole
//     pipeline).
// 2.  **Presence Transition**: `TrackState::last_position` is `None` while
//     nobody is present. The first present frame after an absent one emits
//     `NewPerson` and stores its position; an absent frame clears it. A
//     present -> absent -> present cycle therefore counts two people.
// 3.  **Optional Displacement Rule**: with `min_displacement_px` set, two
//     consecutive present frames whose peak columns differ by more than that
//     many pixels are also treated as a new person (someone replaced the
//     previous one without a gap).
// 4.  **Counter**: `PersonCounter` only moves forward, one step per event,
//     and is reset only on explicit request.

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonConfig {
    /// Minimum calibrated height that counts as a person, mm.
    pub present_threshold: f64,
    /// Column jump between consecutive present frames that also starts a new person.
    pub min_displacement_px: Option<usize>,
}

impl Default for PersonConfig {
    fn default() -> Self {
        Self {
            present_threshold: 1000.0,
            min_displacement_px: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TrackState {
    /// `(row, col)` of the last present detection, `None` while nobody is present.
    pub last_position: Option<(usize, usize)>,
    pub last_height_class: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PersonCounter(u64);

impl PersonCounter {
    pub fn get(&self) -> u64 {
        self.0
    }

    fn increment(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    fn reset(&mut self) {
        self.0 = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PersonEvent {
    NewPerson { count: u64 },
}

pub struct PersonEventDetector {
    config: PersonConfig,
    state: TrackState,
    counter: PersonCounter,
}

impl PersonEventDetector {
    pub fn new(config: PersonConfig) -> Self {
        Self {
            config,
            state: TrackState::default(),
            counter: PersonCounter::default(),
        }
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn count(&self) -> u64 {
        self.counter.get()
    }

    pub fn is_present(&self, height: f64) -> bool {
        height > self.config.present_threshold
    }

    /// Evaluates one frame. At most one event per call.
    pub fn observe(&mut self, height: f64, position: (usize, usize)) -> Option<PersonEvent> {
        let present = self.is_present(height);
        let event = if present {
            let is_new = match self.state.last_position {
                None => true,
                Some(last) => self
                    .config
                    .min_displacement_px
                    .is_some_and(|limit| last.1.abs_diff(position.1) > limit),
            };
            self.state.last_position = Some(position);
            is_new.then(|| {
                let count = self.counter.increment();
                info!(count, height, row = position.0, col = position.1, "new person");
                PersonEvent::NewPerson { count }
            })
        } else {
            self.state.last_position = None;
            None
        };
        self.state.last_height_class = present;
        event
    }

    /// Clears the counter. The track state is kept so a person standing in
    /// view is not counted again.
    pub fn reset_counter(&mut self) {
        self.counter.reset();
    }
}
