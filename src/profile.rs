//! Register profiles written to the converter before streaming.

use log::{debug, info};

use crate::errors::{DriverError, Result};
use crate::evm::Evm;
use crate::registers::{Register, RUN_MODE, SLEEP_MODE};

/// Continuous autoscan of channels 0-1, 10 MHz input deglitch.
const MUX_SCAN_CH0_CH1: u16 = 0x820D;
/// Continuous autoscan of channels 0-3, 10 MHz input deglitch.
const MUX_SCAN_CH0_CH3: u16 = 0xC20D;

const CLOCK_DIVIDER_1_1: u16 = 0x1001;
/// IDRIVE = 9
const DRIVE_CURRENT_NORMAL: u16 = 0x4A40;
/// IDRIVE = 13, needed for the shorter multi-channel conversions.
const DRIVE_CURRENT_BOOSTED: u16 = 0x6B40;

const MULTI_RCOUNT: u16 = 0x1000;
const MULTI_SETTLECOUNT: u16 = 0x0100;

/// An ordered set of register writes applied while the converter sleeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: &'static str,
    writes: Vec<(Register, u16)>,
}

impl Profile {
    /// Channel 0 with a long conversion window; channel 1 parked as a dummy
    /// with the shortest window the converter accepts.
    pub fn single_channel() -> Self {
        Self {
            name: "single-channel",
            writes: vec![
                (Register::RcountCh0, 0xFFFF),
                (Register::RcountCh1, 0x0004),
                (Register::SettleCountCh0, 0x8692),
                (Register::SettleCountCh1, 0x0001),
                (Register::ClockDividersCh0, CLOCK_DIVIDER_1_1),
                (Register::ClockDividersCh1, CLOCK_DIVIDER_1_1),
                (Register::DriveCurrentCh0, DRIVE_CURRENT_NORMAL),
                (Register::DriveCurrentCh1, DRIVE_CURRENT_NORMAL),
                (Register::MuxConfig, MUX_SCAN_CH0_CH1),
            ],
        }
    }

    /// `channels` (2 or 4) identical short conversion windows with boosted
    /// drive current.
    pub fn multi_channel(channels: usize) -> Result<Self> {
        let mux = match channels {
            2 => MUX_SCAN_CH0_CH1,
            4 => MUX_SCAN_CH0_CH3,
            n => {
                return Err(DriverError::Config(format!(
                    "multi-channel profile needs 2 or 4 channels, got {n}"
                )))
            }
        };

        let mut writes = Vec::with_capacity(channels * 4 + 1);
        // Channels 0..4 are all in the register map, so the lookups cannot miss.
        let per_channel: [fn(usize) -> Option<Register>; 4] = [
            Register::rcount,
            Register::settle_count,
            Register::clock_dividers,
            Register::drive_current,
        ];
        let values = [
            MULTI_RCOUNT,
            MULTI_SETTLECOUNT,
            CLOCK_DIVIDER_1_1,
            DRIVE_CURRENT_BOOSTED,
        ];
        for (lookup, value) in per_channel.iter().zip(values) {
            writes.extend((0..channels).filter_map(lookup).map(|reg| (reg, value)));
        }
        writes.push((Register::MuxConfig, mux));

        Ok(Self {
            name: if channels == 2 {
                "dual-channel"
            } else {
                "quad-channel"
            },
            writes,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register writes in the order they are applied.
    pub fn writes(&self) -> &[(Register, u16)] {
        &self.writes
    }

    /// Put the converter to sleep, write every register, then resume.
    pub fn apply(&self, evm: &mut Evm) -> Result<()> {
        info!("Applying {} profile ({} registers)", self.name, self.writes.len());
        evm.write_register(Register::Config.address(), SLEEP_MODE)?;
        for (register, value) in &self.writes {
            debug!("{register:?} <- {value:#06x}");
            evm.write_register(register.address(), *value)?;
        }
        evm.write_register(Register::Config.address(), RUN_MODE)
    }
}
