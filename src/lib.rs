//! Driver and logger for TI inductive-sensor EVM boards (LDC1614, FDC2214).
//!
//! The board is reached over its USB CDC serial port and speaks a small
//! checksum-framed command protocol. This crate configures the converter,
//! streams raw channel samples, and turns them into 0-100 % readings using a
//! running per-channel min/max calibration.
//!
//! # Calibration
//!
//! Calibration is online and session-scoped:
//!
//! 1. A channel is uncalibrated until it has seen two different valid samples.
//! 2. From then on each sample is expressed as a percentage of the widest
//!    range observed so far.
//! 3. The range never shrinks, and it is rebuilt from scratch every session.
//!
//! # Example
//! ```ignore
//! use ldc_evm::{discover_port, CsvSink, Evm, Mode, Session, BAUD_RATE, DEFAULT_TIMEOUT};
//!
//! let port = discover_port()?;
//! let evm = Evm::connect_serial(&port, BAUD_RATE, DEFAULT_TIMEOUT)?;
//! let sink = CsvSink::open("data.csv", Mode::Single.stream_channels())?;
//! let (result, _sink) = Session::new(evm, sink, Mode::Single).frame_limit(1000).run();
//! println!("{:?}", result?);
//! ```

pub mod calibration;
pub mod codec;
pub mod config;
mod errors;
pub mod evm;
pub mod logging;
#[cfg(test)]
mod mock;
pub mod profile;
pub mod publish;
pub mod registers;
pub mod session;
pub mod sink;
pub mod stream;

pub use calibration::{Calibrator, ChannelState, Reading};
pub use codec::{checksum, Command};
pub use config::{Mode, PublishConfig, SessionConfig};
pub use errors::*;
pub use evm::{discover_port, DeviceIdentity, Evm, Transport, BAUD_RATE, DEFAULT_TIMEOUT};
pub use profile::Profile;
pub use publish::Publisher;
pub use registers::Register;
pub use session::{CycleReport, Session, SessionSummary};
pub use sink::{CsvSink, MemorySink, SampleRow, SampleSink};
pub use stream::{decode_stream_frame, FrameErrorPolicy, RawSample, StreamFrame};
