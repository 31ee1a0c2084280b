//! EVM device driver: register transactions and stream control.
//!
//! The board speaks a strict request/response protocol over its USB CDC
//! serial port. Every command gets exactly one 32-byte reply, except that once
//! streaming has been started the board also pushes 32-byte sample frames
//! unprompted until it is told to stop.
//!
//! # Timing
//! - Replies arrive within a few milliseconds; the port timeout (1 s by
//!   default) only matters when the board is absent or wedged.
//! - Nothing is retried here. A timeout or a non-zero error code is returned
//!   to the caller as-is.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use serialport::SerialPortType;

use crate::codec::{decode_response, Command, DecodedResponse, Hex, ResponseLayout, RESPONSE_LEN};
use crate::errors::{DriverError, Result, Transaction};
use crate::registers::{Register, EVM_USB_PID, EVM_USB_VID, TI_MANUFACTURER_ID};

// ============================================================================
// Constants
// ============================================================================

/// Serial baud rate of the EVM's CDC interface.
pub const BAUD_RATE: u32 = 115_200;

/// Read timeout applied to the serial port.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on time spent draining stale input.
const MAX_FLUSH: Duration = Duration::from_millis(200);

// ============================================================================
// Transport Abstraction
// ============================================================================

/// Byte-oriented duplex channel to the board.
///
/// Reads are expected to honour a timeout and report it as
/// [`ErrorKind::TimedOut`].
pub trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send> Transport for T {}

/// Identification registers read at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer_id: u16,
    pub device_id: u16,
}

/// Locate the EVM among the system's serial ports by its USB VID/PID.
pub fn discover_port() -> Result<String> {
    let ports = serialport::available_ports()?;
    debug!("Scanning {} serial ports for the EVM", ports.len());
    ports
        .into_iter()
        .find_map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) if usb.vid == EVM_USB_VID && usb.pid == EVM_USB_PID => {
                Some(port.port_name)
            }
            _ => None,
        })
        .ok_or(DriverError::DeviceNotFound {
            vid: EVM_USB_VID,
            pid: EVM_USB_PID,
        })
}

// ============================================================================
// Evm Driver
// ============================================================================

/// Driver for one EVM board.
///
/// # Example
/// ```ignore
/// let port = discover_port()?;
/// let mut evm = Evm::connect_serial(&port, BAUD_RATE, DEFAULT_TIMEOUT)?;
/// let id = evm.read_register(Register::DeviceId.address())?;
/// evm.start_stream()?;
/// let frame = evm.read_stream_frame()?;
/// evm.stop_stream()?;
/// ```
pub struct Evm {
    transport: Box<dyn Transport>,
    streaming: bool,
}

impl Evm {
    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// Open the board's serial port (e.g. `/dev/ttyACM0`).
    pub fn connect_serial(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
        info!("Opened EVM on {path} ({baud_rate} baud, timeout {timeout:?})");
        Ok(Self::from_transport(port))
    }

    /// Wrap an already-open transport.
    pub fn from_transport<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Box::new(transport),
            streaming: false,
        }
    }

    /// Whether `start_stream` has succeeded without a later `stop_stream`.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    // ------------------------------------------------------------------------
    // Register Transactions
    // ------------------------------------------------------------------------

    /// Write a 16-bit value to a register.
    pub fn write_register(&mut self, address: u8, value: u16) -> Result<()> {
        self.transact(
            Command::WriteRegister { address, value },
            &ResponseLayout::ACK,
            Transaction::WriteRegister(address),
        )?;
        debug!("Wrote register {address:#04x} = {value:#06x}");
        Ok(())
    }

    /// Read a 16-bit register: select it, then execute the read.
    pub fn read_register(&mut self, address: u8) -> Result<u16> {
        self.transact(
            Command::SelectRegister { address },
            &ResponseLayout::ACK,
            Transaction::SelectRegister(address),
        )?;
        let response = self.transact(
            Command::ExecuteRead,
            &ResponseLayout::REGISTER,
            Transaction::ReadRegister(address),
        )?;
        let value = response.fields[0] as u16;
        debug!("Read register {address:#04x} = {value:#06x}");
        Ok(value)
    }

    /// Read the manufacturer and device id registers.
    pub fn identify(&mut self) -> Result<DeviceIdentity> {
        let manufacturer_id = self.read_register(Register::ManufacturerId.address())?;
        let device_id = self.read_register(Register::DeviceId.address())?;
        if manufacturer_id != TI_MANUFACTURER_ID {
            warn!("Unexpected manufacturer id {manufacturer_id:#06x}; continuing anyway");
        }
        Ok(DeviceIdentity {
            manufacturer_id,
            device_id,
        })
    }

    // ------------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------------

    /// Ask the board to start pushing sample frames.
    pub fn start_stream(&mut self) -> Result<()> {
        self.transact(
            Command::StartStream,
            &ResponseLayout::ACK,
            Transaction::StartStream,
        )?;
        self.streaming = true;
        debug!("Streaming started");
        Ok(())
    }

    /// Ask the board to stop streaming.
    ///
    /// The driver considers the stream stopped once the command has been
    /// sent, even if the acknowledgement reports an error.
    pub fn stop_stream(&mut self) -> Result<()> {
        let result = self.transact(
            Command::StopStream,
            &ResponseLayout::ACK,
            Transaction::StopStream,
        );
        self.streaming = false;
        result?;
        debug!("Streaming stopped");
        Ok(())
    }

    /// Block until the next 32-byte streaming frame arrives.
    pub fn read_stream_frame(&mut self) -> Result<[u8; RESPONSE_LEN]> {
        self.read_response("stream frame")
    }

    /// Bring the link back to request/response mode.
    ///
    /// A session killed mid-stream leaves the board pushing frames. Sends a
    /// stop without waiting for its reply, then drains the ack together with
    /// any frames still in flight.
    pub fn reset_link(&mut self) -> Result<()> {
        let frame = Command::StopStream.encode();
        trace!("> {}", Hex(&frame));
        self.transport
            .write_all(&frame)
            .and_then(|_| self.transport.flush())
            .map_err(|e| DriverError::from_transport(e, "stop stream"))?;
        self.streaming = false;
        self.flush_input()
    }

    /// Drain pending input without sending anything.
    pub fn flush_input(&mut self) -> Result<()> {
        let mut buf = [0u8; 256];
        let start = Instant::now();
        let mut drained = 0usize;
        loop {
            match self.transport.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => drained += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }

            if start.elapsed() > MAX_FLUSH {
                break;
            }
        }
        if drained > 0 {
            warn!("Discarded {drained} stale bytes from the EVM");
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Internal Methods
    // ------------------------------------------------------------------------

    /// Send one command and check the error code of its reply.
    fn transact(
        &mut self,
        command: Command,
        layout: &ResponseLayout,
        transaction: Transaction,
    ) -> Result<DecodedResponse> {
        let frame = command.encode();
        trace!("> {}", Hex(&frame));
        self.transport
            .write_all(&frame)
            .and_then(|_| self.transport.flush())
            .map_err(|e| DriverError::from_transport(e, &transaction.to_string()))?;

        let buffer = self.read_response(&transaction.to_string())?;
        let response = decode_response(&buffer, layout);
        if !response.is_ok() {
            return Err(DriverError::Protocol {
                transaction,
                code: response.error_code,
            });
        }
        Ok(response)
    }

    fn read_response(&mut self, what: &str) -> Result<[u8; RESPONSE_LEN]> {
        let mut buffer = [0u8; RESPONSE_LEN];
        self.transport
            .read_exact(&mut buffer)
            .map_err(|e| DriverError::from_transport(e, what))?;
        trace!("< {}", Hex(&buffer));
        Ok(buffer)
    }
}
