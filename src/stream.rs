//! Decoding of the sample frames the board pushes while streaming.

use log::warn;
use serde::Deserialize;

use crate::codec::{decode_response, ResponseLayout};
use crate::errors::{DriverError, Result, Transaction};

/// Status/error bits reported by the converter in the top nibble of a sample.
pub const STATUS_MASK: u32 = 0xF000_0000;

/// One unprocessed 32-bit channel reading.
///
/// Bits 28-31 carry the converter's under-range, over-range, watchdog and
/// amplitude flags; the remaining 28 bits are the conversion result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RawSample(pub u32);

impl RawSample {
    pub fn value(self) -> u32 {
        self.0
    }

    /// Top-nibble status flags (zero when the conversion was clean).
    pub fn status_flags(self) -> u8 {
        (self.0 >> 28) as u8
    }

    /// The 28-bit conversion result.
    pub fn magnitude(self) -> u32 {
        self.0 & !STATUS_MASK
    }

    /// A sample is usable when no status flag is set and it is non-zero.
    /// All-zero is what an inactive or dummy channel reports.
    pub fn is_valid(self) -> bool {
        self.0 != 0 && self.0 & STATUS_MASK == 0
    }
}

/// A decoded streaming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub error_code: u8,
    pub samples: Vec<RawSample>,
}

impl StreamFrame {
    /// Whether the board flagged the whole frame.
    pub fn is_flagged(&self) -> bool {
        self.error_code != 0
    }
}

/// Extract `channel_count` samples from a 32-byte streaming frame.
///
/// The frame always carries four channel fields; with two channels the last
/// two are ignored.
///
/// # Panics
/// If `channel_count` is not 2 or 4, or `buffer` is not a whole frame.
pub fn decode_stream_frame(buffer: &[u8], channel_count: usize) -> StreamFrame {
    assert!(
        matches!(channel_count, 2 | 4),
        "streaming supports 2 or 4 channels, got {channel_count}"
    );
    let response = decode_response(buffer, &ResponseLayout::STREAM);
    StreamFrame {
        error_code: response.error_code,
        samples: response.fields[..channel_count]
            .iter()
            .map(|&v| RawSample(v))
            .collect(),
    }
}

/// What to do when the board sets a frame-level error code while streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameErrorPolicy {
    /// Log and keep the frame; per-sample flags still decide validity.
    #[default]
    Continue,
    /// End the session with a protocol error.
    Abort,
}

impl FrameErrorPolicy {
    pub fn check(self, frame: &StreamFrame) -> Result<()> {
        if !frame.is_flagged() {
            return Ok(());
        }
        match self {
            FrameErrorPolicy::Continue => {
                warn!(
                    "Stream frame flagged with error code {:#04x}; keeping samples",
                    frame.error_code
                );
                Ok(())
            }
            FrameErrorPolicy::Abort => Err(DriverError::Protocol {
                transaction: Transaction::StreamFrame,
                code: frame.error_code,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::stream_frame;

    #[test]
    fn validity_rule() {
        assert!(!RawSample(0xF000_0001).is_valid());
        assert!(!RawSample(0x1000_0000).is_valid());
        assert!(!RawSample(0).is_valid());
        assert!(RawSample(0x0123_4567).is_valid());
        assert!(RawSample(0x0FFF_FFFF).is_valid());
    }

    #[test]
    fn status_and_magnitude_split() {
        let sample = RawSample(0x9ABC_DEF0);
        assert_eq!(sample.status_flags(), 0x9);
        assert_eq!(sample.magnitude(), 0x0ABC_DEF0);
    }

    #[test]
    fn two_channel_decode_ignores_upper_fields() {
        let buf = stream_frame(0, [100, 200, 300, 400]);
        let frame = decode_stream_frame(&buf, 2);
        assert_eq!(frame.samples, vec![RawSample(100), RawSample(200)]);
        assert!(!frame.is_flagged());
    }

    #[test]
    fn four_channel_decode_uses_all_fields() {
        let buf = stream_frame(0, [1, 0xF000_0002, 3, 4]);
        let frame = decode_stream_frame(&buf, 4);
        assert_eq!(frame.samples.len(), 4);
        assert_eq!(frame.samples[1].status_flags(), 0xF);
        assert_eq!(frame.samples[3], RawSample(4));
    }

    #[test]
    fn flagged_frame_keeps_samples() {
        let buf = stream_frame(0x04, [10, 20, 30, 40]);
        let frame = decode_stream_frame(&buf, 4);
        assert!(frame.is_flagged());
        assert_eq!(frame.samples[0], RawSample(10));
    }

    #[test]
    fn frame_error_policy() {
        let flagged = decode_stream_frame(&stream_frame(0x04, [1, 2, 3, 4]), 2);
        let clean = decode_stream_frame(&stream_frame(0, [1, 2, 3, 4]), 2);

        assert!(FrameErrorPolicy::Continue.check(&flagged).is_ok());
        assert!(FrameErrorPolicy::Abort.check(&clean).is_ok());
        assert!(matches!(
            FrameErrorPolicy::Abort.check(&flagged),
            Err(DriverError::Protocol {
                transaction: Transaction::StreamFrame,
                code: 0x04
            })
        ));
    }

    #[test]
    #[should_panic(expected = "2 or 4 channels")]
    fn three_channels_is_a_contract_violation() {
        decode_stream_frame(&stream_frame(0, [1, 2, 3, 4]), 3);
    }
}
