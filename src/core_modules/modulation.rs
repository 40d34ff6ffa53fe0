// THEORY:
// A phase-based ToF sensor can only measure distance modulo the unambiguous
// range `c / (2 f)`. The engine supports a fixed set of LED modulation
// frequencies, each with a tabulated range in millimetres. Any frequency
// outside the table is a fatal configuration error, detected at startup and
// never per frame.

use crate::error::ConfigError;
use std::fmt;

/// The supported LED modulation frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModulationFrequency {
    Mhz20,
    Mhz10,
    Mhz5,
    Mhz2_5,
    Mhz1_25,
}

impl ModulationFrequency {
    pub const ALL: [ModulationFrequency; 5] = [
        ModulationFrequency::Mhz20,
        ModulationFrequency::Mhz10,
        ModulationFrequency::Mhz5,
        ModulationFrequency::Mhz2_5,
        ModulationFrequency::Mhz1_25,
    ];

    pub fn megahertz(self) -> f64 {
        match self {
            ModulationFrequency::Mhz20 => 20.0,
            ModulationFrequency::Mhz10 => 10.0,
            ModulationFrequency::Mhz5 => 5.0,
            ModulationFrequency::Mhz2_5 => 2.5,
            ModulationFrequency::Mhz1_25 => 1.25,
        }
    }

    /// Maximum distance representable before the phase wraps, in mm.
    pub fn unambiguous_range_mm(self) -> f64 {
        match self {
            ModulationFrequency::Mhz20 => 7_500.0,
            ModulationFrequency::Mhz10 => 15_000.0,
            ModulationFrequency::Mhz5 => 30_000.0,
            ModulationFrequency::Mhz2_5 => 60_000.0,
            ModulationFrequency::Mhz1_25 => 120_000.0,
        }
    }

    pub fn from_megahertz(mhz: f64) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|f| (f.megahertz() - mhz).abs() < 1e-9)
            .ok_or(ConfigError::UnknownFrequency(mhz))
    }
}

impl TryFrom<f64> for ModulationFrequency {
    type Error = ConfigError;

    fn try_from(mhz: f64) -> Result<Self, Self::Error> {
        Self::from_megahertz(mhz)
    }
}

impl fmt::Display for ModulationFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MHz", self.megahertz())
    }
}

/// The modulation setup of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulationConfig {
    frequency: ModulationFrequency,
    unambiguous_range_mm: f64,
}

impl ModulationConfig {
    pub fn new(frequency: ModulationFrequency) -> Self {
        Self {
            frequency,
            unambiguous_range_mm: frequency.unambiguous_range_mm(),
        }
    }

    pub fn from_megahertz(mhz: f64) -> Result<Self, ConfigError> {
        ModulationFrequency::from_megahertz(mhz).map(Self::new)
    }

    pub fn frequency(&self) -> ModulationFrequency {
        self.frequency
    }

    pub fn unambiguous_range_mm(&self) -> f64 {
        self.unambiguous_range_mm
    }
}
