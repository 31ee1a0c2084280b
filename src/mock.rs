//! In-memory model of an EVM board for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use crate::codec::{Command, RESPONSE_LEN};
use crate::registers::{Register, TI_MANUFACTURER_ID};

pub const LDC1614_DEVICE_ID: u16 = 0x3055;

/// Error code the model returns for frames it cannot parse.
const BAD_FRAME: u8 = 0xFE;

type FaultFn = Box<dyn Fn(&Command) -> Option<u8> + Send>;

#[derive(Default)]
struct Model {
    registers: HashMap<u8, u16>,
    selected: Option<u8>,
    streaming: bool,
    commands: Vec<Command>,
    pending: VecDeque<u8>,
    stream_frames: VecDeque<[u8; RESPONSE_LEN]>,
    fault: Option<FaultFn>,
}

impl Model {
    fn handle(&mut self, frame: &[u8]) {
        let Some(command) = Command::decode(frame) else {
            self.respond(BAD_FRAME, &[]);
            return;
        };
        self.commands.push(command);

        let code = self.fault.as_ref().and_then(|f| f(&command)).unwrap_or(0);
        if code != 0 {
            self.respond(code, &[]);
            return;
        }

        match command {
            Command::WriteRegister { address, value } => {
                self.registers.insert(address, value);
                self.respond(0, &[]);
            }
            Command::SelectRegister { address } => {
                self.selected = Some(address);
                self.respond(0, &[]);
            }
            Command::ExecuteRead => {
                let value = self
                    .selected
                    .and_then(|a| self.registers.get(&a).copied())
                    .unwrap_or(0);
                self.respond(0, &value.to_be_bytes());
            }
            Command::StartStream => {
                self.streaming = true;
                self.respond(0, &[]);
            }
            Command::StopStream => {
                self.streaming = false;
                self.respond(0, &[]);
            }
        }
    }

    fn respond(&mut self, code: u8, payload: &[u8]) {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[3] = code;
        buf[6..6 + payload.len()].copy_from_slice(payload);
        self.pending.extend(buf);
    }
}

/// Fake board honouring register writes and replaying queued stream frames.
///
/// Clones share state, so a test can keep a handle after moving one clone
/// into the driver.
#[derive(Clone)]
pub struct FakeEvm {
    model: Arc<Mutex<Model>>,
}

impl FakeEvm {
    pub fn new() -> Self {
        let mut model = Model::default();
        model
            .registers
            .insert(Register::ManufacturerId.address(), TI_MANUFACTURER_ID);
        model
            .registers
            .insert(Register::DeviceId.address(), LDC1614_DEVICE_ID);
        Self {
            model: Arc::new(Mutex::new(model)),
        }
    }

    /// Return `Some(code)` from `fault` to make the board reject a command.
    pub fn fail_when(&self, fault: impl Fn(&Command) -> Option<u8> + Send + 'static) {
        self.model.lock().unwrap().fault = Some(Box::new(fault));
    }

    /// Queue a streaming frame delivered once streaming is active.
    pub fn push_stream_frame(&self, error_code: u8, values: [u32; 4]) {
        self.model
            .lock()
            .unwrap()
            .stream_frames
            .push_back(stream_frame(error_code, values));
    }

    /// Bytes already sitting in the receive buffer.
    pub fn push_stale_bytes(&self, bytes: &[u8]) {
        self.model.lock().unwrap().pending.extend(bytes);
    }

    pub fn register(&self, address: u8) -> Option<u16> {
        self.model.lock().unwrap().registers.get(&address).copied()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.model.lock().unwrap().commands.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.model.lock().unwrap().streaming
    }
}

impl Default for FakeEvm {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for FakeEvm {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.model.lock().unwrap().handle(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for FakeEvm {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut model = self.model.lock().unwrap();
        if model.pending.is_empty() && model.streaming {
            if let Some(frame) = model.stream_frames.pop_front() {
                model.pending.extend(frame);
            }
        }
        if model.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data from EVM"));
        }
        let n = buf.len().min(model.pending.len());
        for (slot, byte) in buf.iter_mut().zip(model.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Build a streaming frame carrying four channel values.
pub fn stream_frame(error_code: u8, values: [u32; 4]) -> [u8; RESPONSE_LEN] {
    let mut buf = [0u8; RESPONSE_LEN];
    buf[3] = error_code;
    for (i, value) in values.iter().enumerate() {
        let start = 6 + i * 4;
        buf[start..start + 4].copy_from_slice(&value.to_be_bytes());
    }
    buf
}
