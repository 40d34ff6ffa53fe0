// The camera marks invalid measurements with reserved sample codes at the top
// of the 16-bit range. They are tallied per frame and published alongside the
// results; the math treats them as ordinary samples.

use serde::Serialize;

pub const LOW_AMPLITUDE_CODE: u16 = 65_300;
pub const SATURATION_CODE: u16 = 65_400;
pub const ADC_OVERFLOW_CODE: u16 = 65_500;

/// A reserved sensor code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFlag {
    LowAmplitude,
    Saturation,
    AdcOverflow,
}

impl PixelFlag {
    pub fn from_sample(sample: u16) -> Option<Self> {
        match sample {
            LOW_AMPLITUDE_CODE => Some(PixelFlag::LowAmplitude),
            SATURATION_CODE => Some(PixelFlag::Saturation),
            ADC_OVERFLOW_CODE => Some(PixelFlag::AdcOverflow),
            _ => None,
        }
    }
}

/// Number of flagged samples of each kind in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagCounts {
    pub low_amplitude: usize,
    pub saturation: usize,
    pub adc_overflow: usize,
}

impl FlagCounts {
    pub fn tally(samples: impl IntoIterator<Item = u16>) -> Self {
        let mut counts = Self::default();
        for sample in samples {
            match PixelFlag::from_sample(sample) {
                Some(PixelFlag::LowAmplitude) => counts.low_amplitude += 1,
                Some(PixelFlag::Saturation) => counts.saturation += 1,
                Some(PixelFlag::AdcOverflow) => counts.adc_overflow += 1,
                None => {}
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.low_amplitude + self.saturation + self.adc_overflow
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}
