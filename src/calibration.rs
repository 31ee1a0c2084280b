//! Online min/max calibration and percentage normalization.
//!
//! Each channel tracks the smallest and largest valid sample seen during the
//! session and rescales new samples into that span. The span only ever
//! widens: there is no decay or windowing, so a long session becomes steadily
//! more tolerant of one-off outliers. Nothing is persisted; every session
//! starts uncalibrated.

use std::fmt;

use crate::stream::RawSample;

/// Calibration state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No valid sample yet.
    #[default]
    Unset,
    /// Every valid sample so far had the same value.
    Calibrating { value: u32 },
    /// A non-empty range has been observed (`min < max`).
    Ranged { min: u32, max: u32 },
}

/// Outcome of feeding one sample through a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// The sample was flagged or zero and was ignored.
    Invalid,
    /// Valid sample, but the channel has no range yet. Expected right after
    /// start-up; not an error.
    NeedsCalibration {
        min: u32,
        sample: u32,
        max: u32,
        offset: u32,
    },
    /// Percentage of the observed range, one decimal place.
    Normalized(f64),
}

impl Reading {
    pub fn percent(&self) -> Option<f64> {
        match *self {
            Reading::Normalized(pct) => Some(pct),
            _ => None,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Reading::Invalid => f.write_str("invalid"),
            Reading::NeedsCalibration {
                min,
                sample,
                max,
                offset,
            } => write!(
                f,
                "calibration needed: min {min} sample {sample} range {} offset {offset}",
                max - min
            ),
            Reading::Normalized(pct) => write!(f, "{pct:5.1}\t{}", bar(pct)),
        }
    }
}

impl ChannelState {
    /// Fold a sample into the calibration and report the resulting reading.
    pub fn observe(&mut self, sample: RawSample) -> Reading {
        if !sample.is_valid() {
            return Reading::Invalid;
        }
        let v = sample.value();

        *self = match *self {
            ChannelState::Unset => ChannelState::Calibrating { value: v },
            ChannelState::Calibrating { value } if value == v => *self,
            ChannelState::Calibrating { value } => ChannelState::Ranged {
                min: value.min(v),
                max: value.max(v),
            },
            ChannelState::Ranged { min, max } => ChannelState::Ranged {
                min: min.min(v),
                max: max.max(v),
            },
        };

        match *self {
            ChannelState::Ranged { .. } => self
                .normalize(v)
                .map_or(Reading::Invalid, Reading::Normalized),
            ChannelState::Calibrating { value } => Reading::NeedsCalibration {
                min: value,
                sample: v,
                max: value,
                offset: v - value,
            },
            ChannelState::Unset => Reading::Invalid,
        }
    }

    /// Rescale `value` into 0-100 % of the observed range.
    ///
    /// `None` until the channel is ranged. Values outside the range are
    /// clamped to its ends.
    pub fn normalize(&self, value: u32) -> Option<f64> {
        let ChannelState::Ranged { min, max } = *self else {
            return None;
        };
        let clamped = value.clamp(min, max);
        let pct = 100.0 * f64::from(clamped - min) / f64::from(max - min);
        Some(round_tenth(pct))
    }

    /// Observed `(min, max)`, once any valid sample has been seen.
    pub fn bounds(&self) -> Option<(u32, u32)> {
        match *self {
            ChannelState::Unset => None,
            ChannelState::Calibrating { value } => Some((value, value)),
            ChannelState::Ranged { min, max } => Some((min, max)),
        }
    }

    pub fn is_ranged(&self) -> bool {
        matches!(self, ChannelState::Ranged { .. })
    }
}

/// Calibration for every live channel of a session.
#[derive(Debug, Clone)]
pub struct Calibrator {
    channels: Vec<ChannelState>,
}

impl Calibrator {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: vec![ChannelState::Unset; channels],
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelState> {
        self.channels.get(index)
    }

    /// Feed one sample per channel. Extra samples beyond the channel count
    /// are ignored.
    pub fn observe_all(&mut self, samples: &[RawSample]) -> Vec<Reading> {
        self.channels
            .iter_mut()
            .zip(samples)
            .map(|(state, &sample)| state.observe(sample))
            .collect()
    }
}

/// Percentages for every channel, if all of them normalized this cycle.
pub fn normalized_vector(readings: &[Reading]) -> Option<Vec<f64>> {
    if readings.is_empty() {
        return None;
    }
    readings.iter().map(Reading::percent).collect()
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Console gauge: one `x` per two percent.
pub fn bar(percent: f64) -> String {
    "x".repeat((percent.clamp(0.0, 100.0) / 2.0) as usize)
}
