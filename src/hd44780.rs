//! HD44780 character LCD driver, 4-bit interface.
//!
//! Drives an HD44780-compatible display through seven GPIO lines of a
//! [`BitbangContext`]: four data lines plus enable, read/write and
//! register-select. Each byte travels as two nibbles, high first, and the
//! display latches a nibble on the falling edge of enable.
//!
//! # Pin Mapping
//!
//! | Signal | Default pin |
//! |--------|-------------|
//! | D4     | 0           |
//! | D5     | 1           |
//! | D6     | 2           |
//! | D7     | 3           |
//! | EN     | 4           |
//! | RW     | 5           |
//! | RS     | 6           |
//!
//! # Example
//!
//! ```no_run
//! use ftdi_bitbang::constants::{pid, FTDI_VID};
//! use ftdi_bitbang::{BitbangContext, FtdiDevice, Hd44780, Hd44780Pins, PinMode};
//!
//! let mut dev = FtdiDevice::open(FTDI_VID, pid::FT232)?;
//! let mut bb = BitbangContext::init(&mut dev, PinMode::Bitbang)?;
//!
//! let lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), true)?;
//! lcd.goto_xy(&mut bb, &mut dev, 0, 1)?;
//! lcd.write_str(&mut bb, &mut dev, "hello")?;
//! # Ok::<(), ftdi_bitbang::Error>(())
//! ```

use std::thread;
use std::time::Duration;

use crate::bitbang::{BitbangContext, Channel};
use crate::error::{Error, Result};

/// Settle time after each nibble of the power-on reset sequence.
const RESET_SETTLE: Duration = Duration::from_millis(5);

/// Worst-case execution time of a command byte.
const CMD_SETTLE: Duration = Duration::from_millis(2);

/// Worst-case execution time of a data byte.
const DATA_SETTLE: Duration = Duration::from_micros(37);

/// Pin assignment for the 4-bit interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hd44780Pins {
    /// Data line D4 (bit 0 of each nibble).
    pub d4: u8,
    /// Data line D5.
    pub d5: u8,
    /// Data line D6.
    pub d6: u8,
    /// Data line D7 (bit 3 of each nibble).
    pub d7: u8,
    /// Enable strobe.
    pub en: u8,
    /// Read/write select, held low (write).
    pub rw: u8,
    /// Register select: low = command, high = data.
    pub rs: u8,
}

impl Default for Hd44780Pins {
    /// D4-D7 on pins 0-3, EN on 4, RW on 5, RS on 6.
    fn default() -> Self {
        Self {
            d4: 0,
            d5: 1,
            d6: 2,
            d7: 3,
            en: 4,
            rw: 5,
            rs: 6,
        }
    }
}

/// An HD44780 display wired to seven bitbang pins.
///
/// The driver holds only the pin mapping and line-width setting; pin state
/// and the device handle are borrowed per call so they stay usable for
/// other peripherals between calls.
#[derive(Debug, Clone)]
pub struct Hd44780 {
    pins: Hd44780Pins,
    line_width: u8,
}

// ---- Construction ----

impl Hd44780 {
    /// Set up the display pins and optionally run the power-on reset.
    ///
    /// All seven pins become outputs. With `reset` true, the documented
    /// 4-bit init sequence runs: nibble `0x3` three times and `0x2` once,
    /// each followed by a 5 ms settle, then clear display (`0x01`), entry
    /// mode (`0x06`), display on (`0x0C`) and cursor shift (`0x10`). A
    /// display that is already in 4-bit mode can skip the reset and keep
    /// its contents.
    pub fn init<C: Channel>(
        bb: &mut BitbangContext,
        dev: &mut C,
        pins: Hd44780Pins,
        reset: bool,
    ) -> Result<Self> {
        let lcd = Self {
            pins,
            line_width: 0,
        };

        bb.set_direction(pins.d4, true)?;
        bb.set_direction(pins.d5, true)?;
        bb.set_direction(pins.d6, true)?;
        bb.set_direction(pins.d7, true)?;
        bb.set_direction(pins.en, true)?;
        bb.set_direction(pins.rw, true)?;
        bb.set_direction(pins.rs, true)?;

        if reset {
            // Force the controller into 4-bit mode whatever state it was in
            for nibble in [0x3, 0x3, 0x3, 0x2] {
                lcd.write_nibble(bb, dev, false, nibble)?;
                thread::sleep(RESET_SETTLE);
            }
            lcd.cmd(bb, dev, 0x01)?;
            lcd.cmd(bb, dev, 0x06)?;
            lcd.cmd(bb, dev, 0x0C)?;
            lcd.cmd(bb, dev, 0x10)?;
        }

        Ok(lcd)
    }

    /// The pin mapping this driver was built with.
    pub fn pins(&self) -> Hd44780Pins {
        self.pins
    }
}

// ---- Transfers ----

impl Hd44780 {
    /// Clock one nibble into the display.
    ///
    /// Drives the data lines and register select, raises enable and
    /// flushes, then drops enable and flushes again. The falling edge is
    /// what the controller latches on.
    fn write_nibble<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        rs: bool,
        nibble: u8,
    ) -> Result<()> {
        bb.set_pin(self.pins.d4, nibble & 0x1 != 0)?;
        bb.set_pin(self.pins.d5, nibble & 0x2 != 0)?;
        bb.set_pin(self.pins.d6, nibble & 0x4 != 0)?;
        bb.set_pin(self.pins.d7, nibble & 0x8 != 0)?;
        bb.set_pin(self.pins.en, true)?;
        bb.set_pin(self.pins.rw, false)?;
        bb.set_pin(self.pins.rs, rs)?;
        bb.flush(dev)?;

        bb.set_pin(self.pins.en, false)?;
        bb.flush(dev)?;
        Ok(())
    }

    /// Send a command byte, high nibble first, then wait out the
    /// worst-case execution time.
    pub fn cmd<C: Channel>(&self, bb: &mut BitbangContext, dev: &mut C, command: u8) -> Result<()> {
        self.write_nibble(bb, dev, false, command >> 4)?;
        self.write_nibble(bb, dev, false, command & 0x0F)?;
        thread::sleep(CMD_SETTLE);
        Ok(())
    }

    /// Write one byte to display RAM at the current cursor position.
    pub fn write_data<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        data: u8,
    ) -> Result<()> {
        self.write_nibble(bb, dev, true, data >> 4)?;
        self.write_nibble(bb, dev, true, data & 0x0F)?;
        thread::sleep(DATA_SETTLE);
        Ok(())
    }

    /// Write one character.
    pub fn write_char<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        ch: u8,
    ) -> Result<()> {
        self.write_data(bb, dev, ch)
    }

    /// Write a string, one character at a time.
    pub fn write_str<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        text: &str,
    ) -> Result<()> {
        for ch in text.bytes() {
            self.write_char(bb, dev, ch)?;
        }
        Ok(())
    }

    /// Move the cursor to column `x` (0-39) and row `y` (0-3).
    ///
    /// Rows are addressed as consecutive 40-character windows of display
    /// RAM, so the DDRAM address is `y * 40 + x`.
    pub fn goto_xy<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        x: u8,
        y: u8,
    ) -> Result<()> {
        if x > 39 {
            return Err(Error::OutOfRange("column must be 0-39"));
        }
        if y > 3 {
            return Err(Error::OutOfRange("row must be 0-3"));
        }
        self.cmd(bb, dev, 0x80 | (y * 40 + x))
    }
}

// ---- Layout ----

impl Hd44780 {
    /// Record the display's line width in characters.
    ///
    /// The driver itself never wraps or clips; the value is kept for
    /// callers that lay out text themselves. Zero means unknown.
    pub fn set_line_width(&mut self, width: u8) {
        self.line_width = width;
    }

    /// The configured line width, zero if unset.
    pub fn line_width(&self) -> u8 {
        self.line_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitbang::PinMode;
    use crate::testutil::{low_bank_states, MockChannel};

    /// Nibbles latched by the display: (data, rs) at each enable rising
    /// edge.
    fn latched_nibbles(dev: &MockChannel, pins: &Hd44780Pins) -> Vec<(u8, bool)> {
        let states = low_bank_states(&dev.writes);
        let mut nibbles = Vec::new();
        let mut last_en = false;
        for (value, _) in states {
            let en = value & (1 << pins.en) != 0;
            if en && !last_en {
                let data = (value >> pins.d4) & 0x0F;
                let rs = value & (1 << pins.rs) != 0;
                nibbles.push((data, rs));
            }
            last_en = en;
        }
        nibbles
    }

    fn setup() -> (BitbangContext, MockChannel) {
        (BitbangContext::new(PinMode::Mpsse), MockChannel::new())
    }

    #[test]
    fn reset_sequence_nibbles_in_order() {
        let (mut bb, mut dev) = setup();
        Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), true).unwrap();

        let nibbles = latched_nibbles(&dev, &Hd44780Pins::default());
        let data: Vec<u8> = nibbles.iter().map(|&(n, _)| n).collect();
        // Mode-set nibbles, then clear, entry mode, display on, cursor
        // shift as nibble pairs
        assert_eq!(
            data,
            vec![0x3, 0x3, 0x3, 0x2, 0x0, 0x1, 0x0, 0x6, 0x0, 0xC, 0x1, 0x0]
        );
        // Register select stays in command mode throughout
        assert!(nibbles.iter().all(|&(_, rs)| !rs));
    }

    #[test]
    fn init_without_reset_writes_nothing() {
        let (mut bb, mut dev) = setup();
        Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), false).unwrap();
        assert!(dev.writes.is_empty());
        // Directions are staged but unflushed
        assert_eq!(bb.direction(), 0x007F);
        assert_eq!(bb.dirty(), 0x007F);
    }

    #[test]
    fn cmd_sends_high_nibble_first() {
        let (mut bb, mut dev) = setup();
        let lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), false).unwrap();
        lcd.cmd(&mut bb, &mut dev, 0xAD).unwrap();

        let nibbles = latched_nibbles(&dev, &lcd.pins());
        assert_eq!(nibbles, vec![(0xA, false), (0xD, false)]);
    }

    #[test]
    fn write_data_raises_register_select() {
        let (mut bb, mut dev) = setup();
        let lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), false).unwrap();
        lcd.write_data(&mut bb, &mut dev, 0x41).unwrap();

        let nibbles = latched_nibbles(&dev, &lcd.pins());
        assert_eq!(nibbles, vec![(0x4, true), (0x1, true)]);
    }

    #[test]
    fn write_str_in_order() {
        let (mut bb, mut dev) = setup();
        let lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), false).unwrap();
        lcd.write_str(&mut bb, &mut dev, "Hi").unwrap();

        let nibbles = latched_nibbles(&dev, &lcd.pins());
        // 'H' = 0x48, 'i' = 0x69
        assert_eq!(
            nibbles,
            vec![(0x4, true), (0x8, true), (0x6, true), (0x9, true)]
        );
    }

    #[test]
    fn goto_xy_addresses_40_column_rows() {
        let (mut bb, mut dev) = setup();
        let lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), false).unwrap();
        lcd.goto_xy(&mut bb, &mut dev, 5, 1).unwrap();

        // 0x80 | (1 * 40 + 5) = 0xAD
        let nibbles = latched_nibbles(&dev, &lcd.pins());
        assert_eq!(nibbles, vec![(0xA, false), (0xD, false)]);
    }

    #[test]
    fn goto_xy_rejects_out_of_range() {
        let (mut bb, mut dev) = setup();
        let lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), false).unwrap();

        assert!(lcd.goto_xy(&mut bb, &mut dev, 39, 3).is_ok());
        assert!(matches!(
            lcd.goto_xy(&mut bb, &mut dev, 40, 0),
            Err(Error::OutOfRange(_))
        ));
        assert!(matches!(
            lcd.goto_xy(&mut bb, &mut dev, 0, 4),
            Err(Error::OutOfRange(_))
        ));
    }

    #[test]
    fn nibble_pulses_enable_once() {
        let (mut bb, mut dev) = setup();
        let lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), false).unwrap();
        lcd.write_data(&mut bb, &mut dev, 0x00).unwrap();

        let states = low_bank_states(&dev.writes);
        let en_levels: Vec<bool> = states
            .iter()
            .map(|(value, _)| value & (1 << 4) != 0)
            .collect();
        // Two nibbles, each one enable pulse
        assert_eq!(crate::testutil::count_rising_edges(&en_levels, false), 2);
    }

    #[test]
    fn line_width_is_stored_only() {
        let (mut bb, mut dev) = setup();
        let mut lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), false).unwrap();
        lcd.set_line_width(20);
        assert_eq!(lcd.line_width(), 20);

        // Writing past the line width still goes straight to the display
        let before = dev.writes.len();
        lcd.write_str(&mut bb, &mut dev, &"x".repeat(25)).unwrap();
        assert_eq!(dev.writes.len(), before + 100);
    }
}
