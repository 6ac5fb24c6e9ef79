//! Protocol constants for FTDI chip communication.
//!
//! These constants define the USB vendor request codes and wire-level opcodes
//! used by the bitbang and MPSSE pin paths. Most users should not need to use
//! these directly.

// ---- FTDI Vendor ID and known Product IDs ----

/// Default FTDI vendor ID.
pub const FTDI_VID: u16 = 0x0403;

/// Known FTDI product IDs.
pub mod pid {
    /// FT232AM, FT232BM, FT232R.
    pub const FT232: u16 = 0x6001;
    /// FT2232C/D/H.
    pub const FT2232: u16 = 0x6010;
    /// FT4232H.
    pub const FT4232: u16 = 0x6011;
    /// FT232H.
    pub const FT232H: u16 = 0x6014;
    /// FT230X.
    pub const FT230X: u16 = 0x6015;
}

// ---- SIO vendor request codes ----

/// Reset the port.
pub(crate) const SIO_RESET_REQUEST: u8 = 0x00;
/// Set baud rate.
pub(crate) const SIO_SET_BAUDRATE_REQUEST: u8 = 0x03;
/// Set latency timer.
pub(crate) const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;
/// Get latency timer.
pub(crate) const SIO_GET_LATENCY_TIMER_REQUEST: u8 = 0x0A;
/// Set bitbang mode.
pub(crate) const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;
/// Read pin states directly.
pub(crate) const SIO_READ_PINS_REQUEST: u8 = 0x0C;

// ---- Reset sub-commands ----

/// SIO reset (device reset).
pub(crate) const SIO_RESET_SIO: u16 = 0;
/// Flush RX FIFO (chip -> host direction).
pub(crate) const SIO_TCIFLUSH: u16 = 2;
/// Flush TX FIFO (host -> chip direction).
pub(crate) const SIO_TCOFLUSH: u16 = 1;

// ---- Clock constants for baud rate calculation ----

/// H-type clock: 120 MHz.
pub(crate) const H_CLK: u32 = 120_000_000;
/// Standard clock: 48 MHz.
pub(crate) const C_CLK: u32 = 48_000_000;

// ---- MPSSE pin commands ----

/// MPSSE pin-level commands, exposed for users building raw command sequences.
pub mod mpsse {
    /// Set data bits low byte (value, direction follow).
    pub const SET_BITS_LOW: u8 = 0x80;
    /// Get data bits low byte.
    pub const GET_BITS_LOW: u8 = 0x81;
    /// Set data bits high byte (value, direction follow).
    pub const SET_BITS_HIGH: u8 = 0x82;
    /// Get data bits high byte.
    pub const GET_BITS_HIGH: u8 = 0x83;
    /// Send immediate (flush read data back to host).
    pub const SEND_IMMEDIATE: u8 = 0x87;
}
