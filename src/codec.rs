//! Command framing and response decoding for the EVM serial protocol.
//!
//! Every command sent to the board is a fixed header, an optional payload and
//! one trailing CRC-8 byte computed over everything before it. Every reply is a
//! fixed 32-byte buffer whose fourth byte is the device error code.
//!
//! ```text
//! write register   4C 15 01 00 04 2A <addr> <value hi> <value lo> <crc>
//! select register  4C 15 01 00 02 2A <addr> <crc>
//! execute read     4C 14 01 00 02 2A 02 <crc>
//! start stream     4C 05 01 00 06 01 29 04 04 30 2A <crc>
//! stop stream      4C 06 01 00 01 01 <crc>
//! ```

use std::fmt;

/// Size of every response and streaming frame sent by the board.
pub const RESPONSE_LEN: usize = 32;

/// Offset of the error-code byte in every response.
pub const ERROR_CODE_OFFSET: usize = 3;

const WRITE_REGISTER_HEADER: [u8; 6] = [0x4C, 0x15, 0x01, 0x00, 0x04, 0x2A];
const SELECT_REGISTER_HEADER: [u8; 6] = [0x4C, 0x15, 0x01, 0x00, 0x02, 0x2A];
const EXECUTE_READ: [u8; 7] = [0x4C, 0x14, 0x01, 0x00, 0x02, 0x2A, 0x02];
const START_STREAM: [u8; 11] = [
    0x4C, 0x05, 0x01, 0x00, 0x06, 0x01, 0x29, 0x04, 0x04, 0x30, 0x2A,
];
const STOP_STREAM: [u8; 6] = [0x4C, 0x06, 0x01, 0x00, 0x01, 0x01];

// CRC-8, poly 0x07, init 0x00, not reflected, no final xor.
const CRC8_POLY: u8 = 0x07;
const CRC8_TABLE: [u8; 256] = build_crc8_table();

const fn build_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the vendor checksum over the exact bytes to be transmitted.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// An outbound command understood by the EVM firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Write a 16-bit value to a register.
    WriteRegister { address: u8, value: u16 },
    /// Name the register the next [`Command::ExecuteRead`] returns.
    SelectRegister { address: u8 },
    /// Read the previously selected register.
    ExecuteRead,
    /// Begin unsolicited streaming of sample frames.
    StartStream,
    /// End streaming.
    StopStream,
}

impl Command {
    /// Build the complete frame, checksum included.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(12);
        match *self {
            Command::WriteRegister { address, value } => {
                frame.extend_from_slice(&WRITE_REGISTER_HEADER);
                frame.push(address);
                frame.extend_from_slice(&value.to_be_bytes());
            }
            Command::SelectRegister { address } => {
                frame.extend_from_slice(&SELECT_REGISTER_HEADER);
                frame.push(address);
            }
            Command::ExecuteRead => frame.extend_from_slice(&EXECUTE_READ),
            Command::StartStream => frame.extend_from_slice(&START_STREAM),
            Command::StopStream => frame.extend_from_slice(&STOP_STREAM),
        }
        frame.push(checksum(&frame));
        frame
    }

    /// Parse a complete frame back into a command, verifying its checksum.
    ///
    /// Used by device models in tests and by tooling that sniffs the link.
    pub fn decode(frame: &[u8]) -> Option<Self> {
        let (&crc, body) = frame.split_last()?;
        if checksum(body) != crc {
            return None;
        }
        match body {
            [h @ .., address, hi, lo] if h == WRITE_REGISTER_HEADER => {
                Some(Command::WriteRegister {
                    address: *address,
                    value: u16::from_be_bytes([*hi, *lo]),
                })
            }
            [h @ .., address] if h == SELECT_REGISTER_HEADER => {
                Some(Command::SelectRegister { address: *address })
            }
            b if b == EXECUTE_READ => Some(Command::ExecuteRead),
            b if b == START_STREAM => Some(Command::StartStream),
            b if b == STOP_STREAM => Some(Command::StopStream),
            _ => None,
        }
    }
}

/// Shape of a 32-byte response: skip, error byte, skip, then fixed-width
/// big-endian fields. Anything after the last field is padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseLayout {
    pub lead_skip: usize,
    pub gap_skip: usize,
    pub field_width: usize,
    pub field_count: usize,
}

impl ResponseLayout {
    /// Acknowledgement only: error code, no fields.
    pub const ACK: ResponseLayout = ResponseLayout {
        lead_skip: ERROR_CODE_OFFSET,
        gap_skip: 2,
        field_width: 0,
        field_count: 0,
    };

    /// Register read: one `u16` at offset 6.
    pub const REGISTER: ResponseLayout = ResponseLayout {
        lead_skip: ERROR_CODE_OFFSET,
        gap_skip: 2,
        field_width: 2,
        field_count: 1,
    };

    /// Streaming frame: four `u32` channel values starting at offset 6.
    pub const STREAM: ResponseLayout = ResponseLayout {
        lead_skip: ERROR_CODE_OFFSET,
        gap_skip: 2,
        field_width: 4,
        field_count: 4,
    };

    fn fields_offset(&self) -> usize {
        self.lead_skip + 1 + self.gap_skip
    }
}

/// Error code plus the big-endian fields named by a [`ResponseLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    pub error_code: u8,
    pub fields: Vec<u32>,
}

impl DecodedResponse {
    pub fn is_ok(&self) -> bool {
        self.error_code == 0
    }
}

/// Interpret a response buffer according to `layout`.
///
/// # Panics
/// If `buffer` is not exactly [`RESPONSE_LEN`] bytes or the layout does not
/// fit in it. Callers always read whole frames, so either is a bug.
pub fn decode_response(buffer: &[u8], layout: &ResponseLayout) -> DecodedResponse {
    assert_eq!(
        buffer.len(),
        RESPONSE_LEN,
        "response frames are always {RESPONSE_LEN} bytes"
    );
    let start = layout.fields_offset();
    let end = start + layout.field_width * layout.field_count;
    assert!(end <= RESPONSE_LEN, "layout overruns response frame");

    let fields = if layout.field_width == 0 {
        Vec::new()
    } else {
        buffer[start..end]
            .chunks_exact(layout.field_width)
            .map(|chunk| chunk.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
            .collect()
    };

    DecodedResponse {
        error_code: buffer[layout.lead_skip],
        fields,
    }
}

/// Colon-separated hex rendering of a frame for trace logs.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_crc8_check_value() {
        assert_eq!(checksum(b"123456789"), 0xF4);
        assert_eq!(checksum(&[]), 0x00);
    }

    #[test]
    fn checksum_is_stable() {
        let frame = [0x4C, 0x15, 0x01, 0x00, 0x04, 0x2A, 0x1A, 0x28, 0x01];
        assert_eq!(checksum(&frame), checksum(&frame));
        let cmd = Command::WriteRegister {
            address: 0x1A,
            value: 0x2801,
        };
        assert_eq!(cmd.encode(), cmd.encode());
    }

    #[test]
    fn fixed_frames_match_vendor_bytes() {
        assert_eq!(
            Command::StartStream.encode(),
            [0x4C, 0x05, 0x01, 0x00, 0x06, 0x01, 0x29, 0x04, 0x04, 0x30, 0x2A, 0xC1]
        );
        assert_eq!(
            Command::StopStream.encode(),
            [0x4C, 0x06, 0x01, 0x00, 0x01, 0x01, 0xD2]
        );
        assert_eq!(
            Command::ExecuteRead.encode(),
            [0x4C, 0x14, 0x01, 0x00, 0x02, 0x2A, 0x02, 0x76]
        );
    }

    #[test]
    fn register_frames_carry_address_and_big_endian_value() {
        let write = Command::WriteRegister {
            address: 0x1E,
            value: 0x4A40,
        }
        .encode();
        assert_eq!(
            write,
            [0x4C, 0x15, 0x01, 0x00, 0x04, 0x2A, 0x1E, 0x4A, 0x40, 0xC2]
        );

        let select = Command::SelectRegister { address: 0x7F }.encode();
        assert_eq!(select, [0x4C, 0x15, 0x01, 0x00, 0x02, 0x2A, 0x7F, 0x2B]);
    }

    #[test]
    fn checksum_byte_is_last_and_not_self_covered() {
        let frame = Command::SelectRegister { address: 0x08 }.encode();
        let (crc, body) = frame.split_last().unwrap();
        assert_eq!(*crc, checksum(body));
    }

    #[test]
    fn decode_rejects_corrupted_frames() {
        let mut frame = Command::WriteRegister {
            address: 0x08,
            value: 0xFFFF,
        }
        .encode();
        assert_eq!(
            Command::decode(&frame),
            Some(Command::WriteRegister {
                address: 0x08,
                value: 0xFFFF
            })
        );
        frame[7] ^= 0x01;
        assert_eq!(Command::decode(&frame), None);
        assert_eq!(Command::decode(&[]), None);
    }

    #[test]
    fn decodes_register_response() {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[6] = 0x30;
        buf[7] = 0x55;
        buf[31] = 0xEE; // padding is ignored
        let resp = decode_response(&buf, &ResponseLayout::REGISTER);
        assert!(resp.is_ok());
        assert_eq!(resp.fields, vec![0x3055]);
    }

    #[test]
    fn decodes_stream_fields_and_error_code() {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[3] = 0x02;
        buf[6..10].copy_from_slice(&0x0123_4567u32.to_be_bytes());
        buf[10..14].copy_from_slice(&0xF000_0001u32.to_be_bytes());
        buf[18..22].copy_from_slice(&400u32.to_be_bytes());
        let resp = decode_response(&buf, &ResponseLayout::STREAM);
        assert_eq!(resp.error_code, 0x02);
        assert_eq!(resp.fields, vec![0x0123_4567, 0xF000_0001, 0, 400]);
    }

    #[test]
    fn ack_layout_has_no_fields() {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[3] = 0x01;
        let resp = decode_response(&buf, &ResponseLayout::ACK);
        assert!(!resp.is_ok());
        assert!(resp.fields.is_empty());
    }

    #[test]
    #[should_panic(expected = "32 bytes")]
    fn short_buffer_is_a_contract_violation() {
        decode_response(&[0u8; 16], &ResponseLayout::ACK);
    }

    #[test]
    fn hex_formats_frames() {
        assert_eq!(Hex(&[0x4C, 0x06, 0xD2]).to_string(), "4c:06:d2");
    }
}
