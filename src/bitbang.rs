//! Pin state tracking and minimal-diff flushing.
//!
//! [`BitbangContext`] models up to 16 GPIO pins (value + direction) and
//! remembers what the chip last received, so [`flush`](BitbangContext::flush)
//! only transmits the byte halves that actually changed. All protocol
//! drivers in this crate ([`Hd44780`](crate::hd44780::Hd44780),
//! [`Spi`](crate::spi::Spi), [`Icsp`](crate::icsp::Icsp)) mutate pins through
//! a `BitbangContext` and let it coalesce the wire traffic.
//!
//! Two pin modes are supported:
//!
//! - [`PinMode::Bitbang`]: asynchronous bitbang, 8 pins. Directions are
//!   programmed with the set-bitmode vendor request, values with a one-byte
//!   data write.
//! - [`PinMode::Mpsse`]: MPSSE pin commands, 16 pins in two banks of 8,
//!   updated with the set-bits opcodes.
//!
//! # Example
//!
//! ```no_run
//! use ftdi_bitbang::constants::{pid, FTDI_VID};
//! use ftdi_bitbang::{BitbangContext, FtdiDevice, PinMode};
//!
//! let mut dev = FtdiDevice::open(FTDI_VID, pid::FT2232)?;
//! let mut bb = BitbangContext::init(&mut dev, PinMode::Mpsse)?;
//!
//! bb.set_direction(4, true)?;
//! bb.set_pin(4, true)?;
//! bb.flush(&mut dev)?; // one USB write carries value + direction
//!
//! let levels = bb.read(&mut dev)?;
//! println!("pins: {levels:#06x}");
//! # Ok::<(), ftdi_bitbang::Error>(())
//! ```

use crate::constants::mpsse;
use crate::error::{Error, Result};
use crate::types::BitMode;

/// Length of the serialized pin state record (see [`crate::state_file`]).
pub(crate) const STATE_RECORD_LEN: usize = 7;

/// The device operations the pin layer needs.
///
/// Implemented by [`FtdiDevice`](crate::FtdiDevice); test code substitutes a
/// recording mock. Everything above the USB layer (the pin store, the
/// protocol drivers, capture mode) is generic over this trait.
pub trait Channel {
    /// Write the whole buffer to the data channel.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
    /// Read available data, returning the number of bytes placed in `buf`.
    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// Program the chip bit mode with the given direction bitmask.
    fn set_bitmode(&mut self, bitmask: u8, mode: BitMode) -> Result<()>;
    /// Read the low-byte pin levels with the read-pins vendor request.
    fn read_pins(&mut self) -> Result<u8>;
    /// Set the baud rate (pin clock in bitbang modes).
    fn set_baudrate(&mut self, baudrate: u32) -> Result<()>;
    /// Set the latency timer in milliseconds.
    fn set_latency_timer(&mut self, ms: u8) -> Result<()>;
}

/// Pin bank width and wire encoding selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinMode {
    /// Asynchronous bitbang, pins 0-7.
    Bitbang,
    /// MPSSE pin commands, pins 0-15.
    Mpsse,
}

impl PinMode {
    /// Number of usable pins in this mode.
    pub fn pin_count(self) -> u8 {
        match self {
            Self::Bitbang => 8,
            Self::Mpsse => 16,
        }
    }

    /// Mask covering the usable pins.
    pub(crate) fn width_mask(self) -> u16 {
        match self {
            Self::Bitbang => 0x00FF,
            Self::Mpsse => 0xFFFF,
        }
    }

    /// Discriminant byte for the state file record.
    pub(crate) fn state_value(self) -> u8 {
        match self {
            Self::Bitbang => 0,
            Self::Mpsse => 1,
        }
    }

    /// Inverse of [`state_value`](Self::state_value).
    pub(crate) fn from_state_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Bitbang),
            1 => Some(Self::Mpsse),
            _ => None,
        }
    }

    fn bit_mode(self) -> BitMode {
        match self {
            Self::Bitbang => BitMode::BitBang,
            Self::Mpsse => BitMode::Mpsse,
        }
    }
}

/// In-memory pin state with change tracking against the chip.
///
/// Holds the intended `value` and `direction` for every pin plus a shadow of
/// what the chip last acknowledged. The dirty set is derived from the two,
/// so reverting a pin before a flush removes it from the diff again, and a
/// failed flush leaves every undelivered change pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitbangContext {
    mode: PinMode,
    /// Intended pin levels (bit set = high).
    value: u16,
    /// Intended pin directions (bit set = output).
    direction: u16,
    /// Levels as of the last successful flush.
    sent_value: u16,
    /// Directions as of the last successful flush.
    sent_direction: u16,
}

// ---- Construction ----

impl BitbangContext {
    /// Fresh state: every pin input, low, and clean.
    pub fn new(mode: PinMode) -> Self {
        Self {
            mode,
            value: 0,
            direction: 0,
            sent_value: 0,
            sent_direction: 0,
        }
    }

    /// Create a fresh state and program the chip into the matching bit mode.
    pub fn init<C: Channel>(dev: &mut C, mode: PinMode) -> Result<Self> {
        let ctx = Self::new(mode);
        ctx.enable(dev)?;
        Ok(ctx)
    }

    /// Program the chip into this context's bit mode.
    ///
    /// Used by [`init`](Self::init) and after loading a persisted state with
    /// [`state_file::load`](crate::state_file::load). In bitbang mode the
    /// current direction mask rides along with the mode change.
    pub fn enable<C: Channel>(&self, dev: &mut C) -> Result<()> {
        dev.set_bitmode(0, BitMode::Reset)?;
        match self.mode {
            PinMode::Bitbang => dev.set_bitmode(self.direction as u8, BitMode::BitBang),
            PinMode::Mpsse => dev.set_bitmode(0, BitMode::Mpsse),
        }
    }
}

// ---- State access ----

impl BitbangContext {
    /// The pin mode chosen at construction.
    pub fn mode(&self) -> PinMode {
        self.mode
    }

    /// Number of usable pins.
    pub fn pin_count(&self) -> u8 {
        self.mode.pin_count()
    }

    /// Intended pin levels.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Intended pin directions (bit set = output).
    pub fn direction(&self) -> u16 {
        self.direction
    }

    /// Pins whose value or direction differs from the last flushed state.
    pub fn dirty(&self) -> u16 {
        (self.value ^ self.sent_value) | (self.direction ^ self.sent_direction)
    }

    fn pin_mask(&self, pin: u8) -> Result<u16> {
        if pin >= self.mode.pin_count() {
            return Err(Error::InvalidPin(pin));
        }
        Ok(1 << pin)
    }
}

// ---- Mutation ----

impl BitbangContext {
    /// Set one pin's level.
    pub fn set_pin(&mut self, pin: u8, high: bool) -> Result<()> {
        let mask = self.pin_mask(pin)?;
        if high {
            self.value |= mask;
        } else {
            self.value &= !mask;
        }
        Ok(())
    }

    /// Set one pin's direction (true = output).
    pub fn set_direction(&mut self, pin: u8, output: bool) -> Result<()> {
        let mask = self.pin_mask(pin)?;
        if output {
            self.direction |= mask;
        } else {
            self.direction &= !mask;
        }
        Ok(())
    }

    /// Set every pin level at once. Bits beyond the mode's width are ignored.
    pub fn set_pins(&mut self, values: u16) {
        self.value = values & self.mode.width_mask();
    }

    /// Set every pin direction at once. Bits beyond the mode's width are
    /// ignored.
    pub fn set_directions(&mut self, outputs: u16) {
        self.direction = outputs & self.mode.width_mask();
    }
}

// ---- Wire transfer ----

impl BitbangContext {
    /// Transmit pending changes, one command per dirty byte half.
    ///
    /// A clean state writes nothing. On success the shadow catches up and
    /// the dirty set empties; on error it is left untouched so the next
    /// flush retransmits.
    pub fn flush<C: Channel>(&mut self, dev: &mut C) -> Result<()> {
        let dirty = self.dirty();
        if dirty == 0 {
            return Ok(());
        }

        match self.mode {
            PinMode::Mpsse => {
                // Both halves share one bulk write when both are dirty
                let mut cmd = [0u8; 6];
                let mut len = 0;
                if dirty & 0x00FF != 0 {
                    cmd[len] = mpsse::SET_BITS_LOW;
                    cmd[len + 1] = self.value as u8;
                    cmd[len + 2] = self.direction as u8;
                    len += 3;
                }
                if dirty & 0xFF00 != 0 {
                    cmd[len] = mpsse::SET_BITS_HIGH;
                    cmd[len + 1] = (self.value >> 8) as u8;
                    cmd[len + 2] = (self.direction >> 8) as u8;
                    len += 3;
                }
                dev.write_all(&cmd[..len])?;
            }
            PinMode::Bitbang => {
                dev.set_bitmode(self.direction as u8, self.mode.bit_mode())?;
                dev.write_all(&[self.value as u8])?;
            }
        }

        self.sent_value = self.value;
        self.sent_direction = self.direction;
        Ok(())
    }

    /// Read the live pin levels, high byte then low byte.
    ///
    /// In 8-pin bitbang mode the high byte is always zero.
    pub fn read<C: Channel>(&mut self, dev: &mut C) -> Result<u16> {
        match self.mode {
            PinMode::Bitbang => Ok(u16::from(dev.read_pins()?)),
            PinMode::Mpsse => {
                let low = read_bank(dev, mpsse::GET_BITS_LOW)?;
                let high = read_bank(dev, mpsse::GET_BITS_HIGH)?;
                Ok(u16::from(high) << 8 | u16::from(low))
            }
        }
    }

    /// Read the live level of one pin, touching only its byte half.
    pub fn read_pin<C: Channel>(&mut self, dev: &mut C, pin: u8) -> Result<bool> {
        self.pin_mask(pin)?;
        let bank = match self.mode {
            PinMode::Bitbang => dev.read_pins()?,
            PinMode::Mpsse => {
                let opcode = if pin < 8 {
                    mpsse::GET_BITS_LOW
                } else {
                    mpsse::GET_BITS_HIGH
                };
                read_bank(dev, opcode)?
            }
        };
        Ok(bank & (1 << (pin & 7)) != 0)
    }
}

/// One MPSSE bank read: get-bits opcode plus send-immediate, then one byte
/// back.
fn read_bank<C: Channel>(dev: &mut C, opcode: u8) -> Result<u8> {
    dev.write_all(&[opcode, mpsse::SEND_IMMEDIATE])?;
    let mut buf = [0u8; 1];
    let n = dev.read_data(&mut buf)?;
    if n == 0 {
        return Err(Error::DeviceUnavailable);
    }
    Ok(buf[0])
}

// ---- State record ----

impl BitbangContext {
    /// Serialize for the state file: value, dirty, direction for the low
    /// half, the same for the high half, then the mode discriminant.
    pub(crate) fn to_record(&self) -> [u8; STATE_RECORD_LEN] {
        let dirty = self.dirty();
        [
            self.value as u8,
            dirty as u8,
            self.direction as u8,
            (self.value >> 8) as u8,
            (dirty >> 8) as u8,
            (self.direction >> 8) as u8,
            self.mode.state_value(),
        ]
    }

    /// Rebuild from a state file record. Wrong length or an unknown mode
    /// discriminant yields `None`.
    pub(crate) fn from_record(record: &[u8]) -> Option<Self> {
        if record.len() != STATE_RECORD_LEN {
            return None;
        }
        let mode = PinMode::from_state_value(record[6])?;
        let mask = mode.width_mask();
        let value = (u16::from(record[0]) | u16::from(record[3]) << 8) & mask;
        let dirty = (u16::from(record[1]) | u16::from(record[4]) << 8) & mask;
        let direction = (u16::from(record[2]) | u16::from(record[5]) << 8) & mask;
        Some(Self {
            mode,
            value,
            direction,
            // A recorded dirty bit must survive the reload: offset the
            // shadow so the next flush retransmits that half
            sent_value: value ^ dirty,
            sent_direction: direction,
        })
    }
}
