//! Driver error taxonomy.

use std::fmt;
use std::io;
use thiserror::Error;

/// The kind of device transaction that produced a non-zero error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transaction {
    WriteRegister(u8),
    SelectRegister(u8),
    ReadRegister(u8),
    StartStream,
    StopStream,
    StreamFrame,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transaction::WriteRegister(addr) => write!(f, "write register {addr:#04x}"),
            Transaction::SelectRegister(addr) => write!(f, "select register {addr:#04x}"),
            Transaction::ReadRegister(addr) => write!(f, "read register {addr:#04x}"),
            Transaction::StartStream => f.write_str("start stream"),
            Transaction::StopStream => f.write_str("stop stream"),
            Transaction::StreamFrame => f.write_str("stream frame"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("no EVM found (USB {vid:04X}:{pid:04X})")]
    DeviceNotFound { vid: u16, pid: u16 },
    #[error("{transaction} failed: device returned error code {code:#04x}")]
    Protocol { transaction: Transaction, code: u8 },
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("config error: {0}")]
    Config(String),
}

impl DriverError {
    /// Map an io error from the transport, keeping timeouts distinguishable.
    pub(crate) fn from_transport(err: io::Error, what: &str) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                DriverError::Timeout(format!("{what}: {err}"))
            }
            _ => DriverError::Io(err),
        }
    }

    /// Whether this error is a device-reported protocol failure.
    pub fn is_protocol(&self) -> bool {
        matches!(self, DriverError::Protocol { .. })
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
