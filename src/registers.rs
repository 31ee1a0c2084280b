//! LDC1614 / FDC2214 register map.

/// Register addresses understood by the EVM firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    RcountCh0 = 0x08,
    RcountCh1 = 0x09,
    RcountCh2 = 0x0A,
    RcountCh3 = 0x0B,
    SettleCountCh0 = 0x10,
    SettleCountCh1 = 0x11,
    SettleCountCh2 = 0x12,
    SettleCountCh3 = 0x13,
    ClockDividersCh0 = 0x14,
    ClockDividersCh1 = 0x15,
    ClockDividersCh2 = 0x16,
    ClockDividersCh3 = 0x17,
    Status = 0x18,
    ErrorConfig = 0x19,
    Config = 0x1A,
    MuxConfig = 0x1B,
    ResetDev = 0x1C,
    DriveCurrentCh0 = 0x1E,
    DriveCurrentCh1 = 0x1F,
    DriveCurrentCh2 = 0x20,
    DriveCurrentCh3 = 0x21,
    ManufacturerId = 0x7E,
    DeviceId = 0x7F,
}

impl Register {
    pub const fn address(self) -> u8 {
        self as u8
    }

    /// Per-channel conversion count register.
    pub fn rcount(channel: usize) -> Option<Self> {
        [Self::RcountCh0, Self::RcountCh1, Self::RcountCh2, Self::RcountCh3]
            .get(channel)
            .copied()
    }

    /// Per-channel settle count register.
    pub fn settle_count(channel: usize) -> Option<Self> {
        [
            Self::SettleCountCh0,
            Self::SettleCountCh1,
            Self::SettleCountCh2,
            Self::SettleCountCh3,
        ]
        .get(channel)
        .copied()
    }

    /// Per-channel clock divider register.
    pub fn clock_dividers(channel: usize) -> Option<Self> {
        [
            Self::ClockDividersCh0,
            Self::ClockDividersCh1,
            Self::ClockDividersCh2,
            Self::ClockDividersCh3,
        ]
        .get(channel)
        .copied()
    }

    /// Per-channel sensor drive current register.
    pub fn drive_current(channel: usize) -> Option<Self> {
        [
            Self::DriveCurrentCh0,
            Self::DriveCurrentCh1,
            Self::DriveCurrentCh2,
            Self::DriveCurrentCh3,
        ]
        .get(channel)
        .copied()
    }
}

/// CONFIG value that puts the converter to sleep while it is reprogrammed.
pub const SLEEP_MODE: u16 = 0x2801;

/// CONFIG value for normal conversion: external clock, override Rp,
/// automatic amplitude correction disabled.
pub const RUN_MODE: u16 = 0x1E01;

/// USB identifiers of the EVM's CDC serial interface.
pub const EVM_USB_VID: u16 = 0x2047;
pub const EVM_USB_PID: u16 = 0x08F8;

/// Texas Instruments manufacturer id ("TI").
pub const TI_MANUFACTURER_ID: u16 = 0x5449;
