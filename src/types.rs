//! Type definitions for FTDI chip communication.
//!
//! These types model the chip variants, pin modes and multi-port interface
//! selection used by the bitbang toolkit.

/// Supported FTDI chip types.
///
/// The chip type is auto-detected when a device is opened, based on the
/// USB `bcdDevice` descriptor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipType {
    /// Original FTDI chip (FT8U232AM).
    Am,
    /// B-type chip (FT232BM, FT245BM).
    Bm,
    /// Dual-port chip (FT2232C/D/L).
    Ft2232C,
    /// FT232R / FT245R.
    Ft232R,
    /// Dual hi-speed chip (FT2232H).
    Ft2232H,
    /// Quad-port chip (FT4232H).
    Ft4232H,
    /// Single hi-speed chip (FT232H).
    Ft232H,
    /// FT230X / FT231X / FT234XD.
    Ft230X,
}

impl ChipType {
    /// Whether this is an H-type (hi-speed) chip.
    #[inline]
    pub fn is_h_type(self) -> bool {
        matches!(self, Self::Ft2232H | Self::Ft4232H | Self::Ft232H)
    }

    /// Short lowercase name, stable across releases (used in state file names).
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Am => "am",
            Self::Bm => "bm",
            Self::Ft2232C => "2232c",
            Self::Ft232R => "232r",
            Self::Ft2232H => "2232h",
            Self::Ft4232H => "4232h",
            Self::Ft232H => "232h",
            Self::Ft230X => "230x",
        }
    }
}

/// Bitbang / MPSSE mode selection.
///
/// Used with [`FtdiDevice::set_bitmode`](crate::FtdiDevice::set_bitmode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitMode {
    /// Normal serial/FIFO mode (bitbang disabled).
    #[default]
    Reset,
    /// Asynchronous bitbang mode (B-type and later).
    BitBang,
    /// MPSSE mode (FT2232x and later).
    Mpsse,
    /// Synchronous bitbang mode (FT2232x, FT232R and later).
    SyncBB,
    /// MCU host bus emulation mode (FT2232x).
    Mcu,
    /// Fast opto-isolated serial mode (FT2232x).
    Opto,
    /// CBUS bitbang mode (FT232R, configure in EEPROM first).
    Cbus,
    /// Synchronous FIFO mode (FT2232H).
    SyncFf,
    /// FT1284 mode (FT232H).
    Ft1284,
}

impl BitMode {
    /// Wire value for the SIO_SET_BITMODE request.
    pub(crate) fn wire_value(self) -> u8 {
        match self {
            Self::Reset => 0x00,
            Self::BitBang => 0x01,
            Self::Mpsse => 0x02,
            Self::SyncBB => 0x04,
            Self::Mcu => 0x08,
            Self::Opto => 0x10,
            Self::Cbus => 0x20,
            Self::SyncFf => 0x40,
            Self::Ft1284 => 0x80,
        }
    }
}

/// Port interface selection for multi-interface chips.
///
/// Chips like the FT2232H (dual) and FT4232H (quad) expose multiple
/// independent interfaces. Select which one to use before opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interface {
    /// Use the first available interface (same as `A`).
    #[default]
    Any,
    /// Interface A (port 0).
    A,
    /// Interface B (port 1).
    B,
    /// Interface C (port 2, FT4232H only).
    C,
    /// Interface D (port 3, FT4232H only).
    D,
}

/// Interface configuration resolved to concrete USB endpoint values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InterfaceConfig {
    /// The USB interface number (0-based).
    pub interface_num: u8,
    /// The USB index value used in control transfers (1-based).
    pub usb_index: u16,
    /// The bulk OUT endpoint address (host-to-device, for writing data).
    pub write_ep: u8,
    /// The bulk IN endpoint address (device-to-host, for reading data).
    pub read_ep: u8,
}

impl Interface {
    /// Resolve to concrete USB endpoint configuration.
    pub(crate) fn config(self) -> InterfaceConfig {
        match self {
            Self::Any | Self::A => InterfaceConfig {
                interface_num: 0,
                usb_index: 1,
                write_ep: 0x02,
                read_ep: 0x81,
            },
            Self::B => InterfaceConfig {
                interface_num: 1,
                usb_index: 2,
                write_ep: 0x04,
                read_ep: 0x83,
            },
            Self::C => InterfaceConfig {
                interface_num: 2,
                usb_index: 3,
                write_ep: 0x06,
                read_ep: 0x85,
            },
            Self::D => InterfaceConfig {
                interface_num: 3,
                usb_index: 4,
                write_ep: 0x08,
                read_ep: 0x87,
            },
        }
    }
}
