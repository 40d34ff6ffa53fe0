// THEORY:
// The `ExposureController` closes the loop between signal quality and the
// camera integration time. It is a two-state machine:
//
// - **Manual**: the exposure only changes on an explicit override.
// - **Auto**: every `QualityVerdict` may nudge the exposure. Underexposed
//   frames increase it (fixed step or multiplicative, clamped to the hardware
//   ceiling), overexposed frames scale it down (floored at 1 us), good frames
//   leave it alone.
//
// A change never takes effect by itself. It marks the controller dirty; the
// orchestrator consumes the change exactly once with `take_change`, pushes it
// to the hardware, and then either `commit`s it or `reject`s it. A rejected
// change leaves `ExposureState` at the last value the hardware accepted.
//
// `ExposureState` is only ever mutated here.

use crate::core_modules::quality::{ExposureQuality, QualityVerdict};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub const MIN_EXPOSURE_US: f64 = 1.0;

/// How an underexposed verdict raises the exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum IncreasePolicy {
    /// Add a fixed number of microseconds.
    Step { step_us: f64 },
    /// Multiply by a factor.
    Scale { factor: f64 },
}

/// The camera channel an exposure value is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureChannel {
    TwoD,
    ThreeD,
}

impl fmt::Display for ExposureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExposureChannel::TwoD => f.write_str("2D"),
            ExposureChannel::ThreeD => f.write_str("3D"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    pub initial_us: f64,
    /// Hardware ceiling for the integration time.
    pub hardware_max_us: f64,
    pub auto_mode: bool,
    pub increase: IncreasePolicy,
    pub decrease_factor: f64,
    pub channel: ExposureChannel,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            initial_us: 300.0,
            hardware_max_us: 4000.0,
            auto_mode: true,
            increase: IncreasePolicy::Scale { factor: 1.25 },
            decrease_factor: 0.9,
            channel: ExposureChannel::ThreeD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureMode {
    Manual,
    Auto,
}

/// The exposure the camera is currently running with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExposureState {
    pub value_us: f64,
    pub auto_mode: bool,
}

/// An external override of exposure value and/or mode.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExposureRequest {
    pub value_us: Option<f64>,
    pub auto_mode: Option<bool>,
}

/// A pending exposure change handed to the hardware boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureChange {
    pub previous_us: f64,
    pub requested_us: f64,
    pub channel: ExposureChannel,
}

impl ExposureChange {
    /// Integer microseconds as the hardware expects them.
    pub fn hardware_value(&self) -> u32 {
        self.requested_us.round().max(MIN_EXPOSURE_US) as u32
    }
}

pub struct ExposureController {
    config: ExposureConfig,
    state: ExposureState,
    pending: Option<f64>,
}

impl ExposureController {
    pub fn new(config: ExposureConfig) -> Self {
        let value_us = config.initial_us.clamp(MIN_EXPOSURE_US, config.hardware_max_us);
        Self {
            state: ExposureState {
                value_us,
                auto_mode: config.auto_mode,
            },
            config,
            pending: None,
        }
    }

    pub fn state(&self) -> ExposureState {
        self.state
    }

    pub fn value_us(&self) -> f64 {
        self.state.value_us
    }

    pub fn mode(&self) -> ExposureMode {
        if self.state.auto_mode {
            ExposureMode::Auto
        } else {
            ExposureMode::Manual
        }
    }

    pub fn channel(&self) -> ExposureChannel {
        self.config.channel
    }

    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    /// Applies an override. Called only at a frame boundary. A non-finite
    /// value is dropped; the mode switch in the same request still applies.
    pub fn apply_request(&mut self, request: ExposureRequest) {
        if let Some(auto) = request.auto_mode {
            self.state.auto_mode = auto;
        }
        match request.value_us {
            Some(value) if value.is_finite() => self.propose(value),
            Some(value) => warn!(value, "ignoring non-finite exposure request"),
            None => {}
        }
    }

    /// Feeds one quality verdict. Ignored in manual mode.
    pub fn observe(&mut self, verdict: &QualityVerdict) {
        if !self.state.auto_mode {
            return;
        }
        let current = self.pending.unwrap_or(self.state.value_us);
        let next = match verdict.quality {
            ExposureQuality::Good => return,
            ExposureQuality::Underexposed => match self.config.increase {
                IncreasePolicy::Step { step_us } => current + step_us,
                IncreasePolicy::Scale { factor } => current * factor,
            },
            ExposureQuality::Overexposed => current * self.config.decrease_factor,
        };
        self.propose(next);
    }

    /// Consumes the dirty flag. Returns each change at most once.
    pub fn take_change(&mut self) -> Option<ExposureChange> {
        self.pending.take().map(|requested_us| ExposureChange {
            previous_us: self.state.value_us,
            requested_us,
            channel: self.config.channel,
        })
    }

    /// The hardware accepted `change`.
    pub fn commit(&mut self, change: &ExposureChange) {
        self.state.value_us = change.requested_us;
    }

    /// The hardware refused `change`; the last applied value stays in effect.
    pub fn reject(&mut self, change: &ExposureChange) {
        self.state.value_us = change.previous_us;
    }

    fn propose(&mut self, value_us: f64) {
        let clamped = value_us.clamp(MIN_EXPOSURE_US, self.config.hardware_max_us);
        let current = self.pending.unwrap_or(self.state.value_us);
        if clamped != current {
            self.pending = Some(clamped);
        }
    }
}
