//! PIC low-voltage ICSP programmer.
//!
//! Bit-serial programming protocol for PIC microcontrollers programmed
//! over two wires plus reset. Commands are six bits
//! shifted LSB first with data changing on the rising clock edge; reads
//! switch the data line around and sample after each falling edge. This is
//! deliberately separate from [`Spi`](crate::spi::Spi): bit order, framing
//! and the settle delays have nothing in common.
//!
//! # Pin Mapping
//!
//! | Signal | Default pin |
//! |--------|-------------|
//! | PGC    | 0           |
//! | PGD    | 1           |
//! | MCLR   | 3           |
//!
//! # Example
//!
//! ```no_run
//! use ftdi_bitbang::constants::{pid, FTDI_VID};
//! use ftdi_bitbang::{BitbangContext, FtdiDevice, Icsp, IcspPins, PinMode};
//!
//! let mut dev = FtdiDevice::open(FTDI_VID, pid::FT232)?;
//! let mut bb = BitbangContext::init(&mut dev, PinMode::Bitbang)?;
//!
//! let icsp = Icsp::init(&mut bb, &mut dev, IcspPins::default())?;
//! icsp.enter_lvp(&mut bb, &mut dev)?;
//!
//! let mut words = [0u8; 4];
//! icsp.read(&mut bb, &mut dev, 0x0000, &mut words)?;
//! icsp.release(&mut bb, &mut dev)?;
//! # Ok::<(), ftdi_bitbang::Error>(())
//! ```

use std::thread;
use std::time::Duration;

use crate::bitbang::{BitbangContext, Channel};
use crate::error::{Error, Result};

/// Key clocked in to unlock low-voltage programming ("MCHP").
const LVP_KEY: u32 = 0x4D43_4850;

/// Load PC address command.
const LOAD_PC: u8 = 0x1D;

/// Read data word command, incrementing the PC afterwards.
const READ_NVM: u8 = 0x24;

/// Delay after each command before the device is ready for payload.
const CMD_SETTLE: Duration = Duration::from_millis(1);

/// Delay around programming mode entry, address loads and pin release.
const MODE_SETTLE: Duration = Duration::from_millis(10);

/// Pin assignment for the programming signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcspPins {
    /// Programming clock.
    pub pgc: u8,
    /// Programming data.
    pub pgd: u8,
    /// Device reset, held low while programming.
    pub mclr: u8,
}

impl Default for IcspPins {
    /// PGC on pin 0, PGD on 1, MCLR on 3.
    fn default() -> Self {
        Self {
            pgc: 0,
            pgd: 1,
            mclr: 3,
        }
    }
}

/// A PIC programmer on three bitbang pins.
///
/// Holds only the pin mapping; pin state and the device handle are
/// borrowed per call. [`release`](Self::release) must run before the
/// target is expected to execute code again.
#[derive(Debug, Clone)]
pub struct Icsp {
    pins: IcspPins,
}

// ---- Construction ----

impl Icsp {
    /// Claim the programming pins: all three become outputs driven low, in
    /// one flush. MCLR low holds the target in reset, ready for
    /// [`enter_lvp`](Self::enter_lvp).
    pub fn init<C: Channel>(bb: &mut BitbangContext, dev: &mut C, pins: IcspPins) -> Result<Self> {
        bb.set_direction(pins.pgc, true)?;
        bb.set_pin(pins.pgc, false)?;
        bb.set_direction(pins.pgd, true)?;
        bb.set_pin(pins.pgd, false)?;
        bb.set_direction(pins.mclr, true)?;
        bb.set_pin(pins.mclr, false)?;
        bb.flush(dev)?;

        Ok(Self { pins })
    }

    /// The pin mapping this driver was built with.
    pub fn pins(&self) -> IcspPins {
        self.pins
    }
}

// ---- Bit-level helpers ----

impl Icsp {
    /// One clock pulse with the current data level, data changing on the
    /// rising edge.
    fn pulse<C: Channel>(&self, bb: &mut BitbangContext, dev: &mut C, data: bool) -> Result<()> {
        bb.set_pin(self.pins.pgc, true)?;
        bb.set_pin(self.pins.pgd, data)?;
        bb.flush(dev)?;
        bb.set_pin(self.pins.pgc, false)?;
        bb.flush(dev)
    }

    /// Clock pulses with the data line held low, used as inter-field
    /// padding.
    pub fn idle_clocks<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        count: u32,
    ) -> Result<()> {
        for _ in 0..count {
            self.pulse(bb, dev, false)?;
        }
        Ok(())
    }
}

// ---- Protocol operations ----

impl Icsp {
    /// Clock in the 32-bit low-voltage programming key while MCLR is held
    /// low, with a settle delay on both sides.
    pub fn enter_lvp<C: Channel>(&self, bb: &mut BitbangContext, dev: &mut C) -> Result<()> {
        bb.set_pin(self.pins.mclr, false)?;
        bb.flush(dev)?;
        thread::sleep(MODE_SETTLE);
        self.write(bb, dev, &LVP_KEY.to_le_bytes())?;
        thread::sleep(MODE_SETTLE);
        Ok(())
    }

    /// Send a 6-bit command, LSB first, then wait out the command delay
    /// and clock one padding pulse.
    pub fn cmd<C: Channel>(&self, bb: &mut BitbangContext, dev: &mut C, opcode: u8) -> Result<()> {
        for bit in 0..6 {
            self.pulse(bb, dev, opcode & (1 << bit) != 0)?;
        }
        thread::sleep(CMD_SETTLE);
        self.idle_clocks(bb, dev, 1)
    }

    /// Shift raw payload bytes out, each byte LSB first. Framing clocks
    /// and delays are the caller's business.
    pub fn write<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        data: &[u8],
    ) -> Result<()> {
        for byte in data {
            for bit in 0..8 {
                self.pulse(bb, dev, byte & (1 << bit) != 0)?;
            }
        }
        Ok(())
    }

    /// Point the device program counter at `addr`.
    pub fn load_pc<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        addr: u16,
    ) -> Result<()> {
        self.cmd(bb, dev, LOAD_PC)?;
        self.write(bb, dev, &addr.to_le_bytes())?;
        self.idle_clocks(bb, dev, 7)
    }

    /// Read `buf.len() / 2` consecutive 14-bit words starting at `addr`,
    /// packed big-endian two bytes per word.
    ///
    /// For each word the data pin turns around to an input, 14 bits are
    /// clocked and sampled after each falling edge LSB first, then the pin
    /// is driven again and a stop pulse sent. The buffer length must be
    /// even.
    pub fn read<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        addr: u16,
        buf: &mut [u8],
    ) -> Result<()> {
        if buf.len() % 2 != 0 {
            return Err(Error::InvalidArgument("read length must be even"));
        }

        self.load_pc(bb, dev, addr)?;
        thread::sleep(MODE_SETTLE);

        for chunk in buf.chunks_exact_mut(2) {
            self.cmd(bb, dev, READ_NVM)?;

            bb.set_direction(self.pins.pgd, false)?;
            bb.flush(dev)?;

            let mut word = 0u16;
            for bit in 0..14 {
                bb.set_pin(self.pins.pgc, true)?;
                bb.flush(dev)?;
                bb.set_pin(self.pins.pgc, false)?;
                bb.flush(dev)?;
                if bb.read_pin(dev, self.pins.pgd)? {
                    word |= 1 << bit;
                }
            }

            bb.set_direction(self.pins.pgd, true)?;
            bb.flush(dev)?;

            self.idle_clocks(bb, dev, 1)?;

            chunk[0] = (word >> 8) as u8;
            chunk[1] = word as u8;
        }

        Ok(())
    }

    /// Hand the pins back: clock, data and reset all become inputs with
    /// the reset level released high.
    pub fn release<C: Channel>(&self, bb: &mut BitbangContext, dev: &mut C) -> Result<()> {
        thread::sleep(MODE_SETTLE);
        bb.set_direction(self.pins.pgc, false)?;
        bb.set_direction(self.pins.pgd, false)?;
        bb.set_direction(self.pins.mclr, false)?;
        bb.set_pin(self.pins.mclr, true)?;
        bb.flush(dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitbang::PinMode;
    use crate::testutil::{count_rising_edges, low_bank_states, pin_history, MockChannel};

    fn setup() -> (BitbangContext, MockChannel, Icsp) {
        let mut bb = BitbangContext::new(PinMode::Mpsse);
        let mut dev = MockChannel::new();
        let icsp = Icsp::init(&mut bb, &mut dev, IcspPins::default()).unwrap();
        (bb, dev, icsp)
    }

    /// PGD levels at each PGC rising edge.
    fn data_at_clock_rise(dev: &MockChannel) -> Vec<bool> {
        let states = low_bank_states(&dev.writes);
        let pgc = pin_history(&states, 0);
        let pgd = pin_history(&states, 1);
        let mut bits = Vec::new();
        let mut last = false;
        for (i, &clk) in pgc.iter().enumerate() {
            if clk && !last {
                bits.push(pgd[i]);
            }
            last = clk;
        }
        bits
    }

    fn lsb_bits(bytes: &[u8]) -> Vec<bool> {
        let mut bits = Vec::new();
        for byte in bytes {
            for bit in 0..8 {
                bits.push(byte & (1 << bit) != 0);
            }
        }
        bits
    }

    #[test]
    fn init_claims_pins_low_in_one_flush() {
        let (_, dev, _) = setup();
        assert_eq!(low_bank_states(&dev.writes), vec![(0x00, 0x0B)]);
    }

    #[test]
    fn cmd_shifts_six_bits_lsb_first_plus_padding() {
        let (mut bb, mut dev, icsp) = setup();
        icsp.cmd(&mut bb, &mut dev, 0x1D).unwrap();

        // 0x1D = 0b011101 LSB first, then the padding clock with data low
        assert_eq!(
            data_at_clock_rise(&dev),
            vec![true, false, true, true, true, false, false]
        );
    }

    #[test]
    fn write_shifts_bytes_lsb_first() {
        let (mut bb, mut dev, icsp) = setup();
        icsp.write(&mut bb, &mut dev, &[0xA5]).unwrap();

        assert_eq!(data_at_clock_rise(&dev), lsb_bits(&[0xA5]));
    }

    #[test]
    fn enter_lvp_clocks_the_key() {
        let (mut bb, mut dev, icsp) = setup();
        icsp.enter_lvp(&mut bb, &mut dev).unwrap();

        let bits = data_at_clock_rise(&dev);
        assert_eq!(bits, lsb_bits(&[0x50, 0x48, 0x43, 0x4D]));

        // Reset stays asserted the whole time
        let states = low_bank_states(&dev.writes);
        assert!(pin_history(&states, 3).iter().all(|&mclr| !mclr));
    }

    #[test]
    fn load_pc_frames_the_address() {
        let (mut bb, mut dev, icsp) = setup();
        icsp.load_pc(&mut bb, &mut dev, 0x1234).unwrap();

        let bits = data_at_clock_rise(&dev);
        assert_eq!(bits.len(), 7 + 16 + 7);

        // Command, then address bytes low first, then padding
        let mut expected = vec![true, false, true, true, true, false, false];
        expected.extend(lsb_bits(&[0x34, 0x12]));
        expected.extend(std::iter::repeat(false).take(7));
        assert_eq!(bits, expected);
    }

    #[test]
    fn read_samples_after_falling_edges_and_packs_big_endian() {
        let (mut bb, mut dev, icsp) = setup();

        // 14-bit word 0x2A55, sampled LSB first on PGD (pin 1, mask 0x02)
        for bit in 0..14 {
            let level = 0x2A55u16 & (1 << bit) != 0;
            dev.read_queue.push_back(if level { 0x02 } else { 0x00 });
        }

        let mut buf = [0u8; 2];
        icsp.read(&mut bb, &mut dev, 0x0000, &mut buf).unwrap();
        assert_eq!(buf, [0x2A, 0x55]);
    }

    #[test]
    fn read_turns_data_pin_around() {
        let (mut bb, mut dev, icsp) = setup();
        dev.read_queue.extend(std::iter::repeat(0x00).take(14));

        let mut buf = [0u8; 2];
        icsp.read(&mut bb, &mut dev, 0x0000, &mut buf).unwrap();

        let states = low_bank_states(&dev.writes);
        // All 14 sample pulses happen while PGD is an input
        let input_clocks: Vec<bool> = states
            .iter()
            .filter(|(_, dir)| dir & 0x02 == 0)
            .map(|(value, _)| value & 0x01 != 0)
            .collect();
        assert_eq!(count_rising_edges(&input_clocks, false), 14);
        // And the pin is driven again afterwards
        assert_eq!(states.last().unwrap().1 & 0x02, 0x02);
    }

    #[test]
    fn read_rejects_odd_length() {
        let (mut bb, mut dev, icsp) = setup();
        let mut buf = [0u8; 3];
        assert!(matches!(
            icsp.read(&mut bb, &mut dev, 0, &mut buf),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn release_floats_pins_with_reset_high() {
        let (mut bb, mut dev, icsp) = setup();
        icsp.release(&mut bb, &mut dev).unwrap();

        let states = low_bank_states(&dev.writes);
        assert_eq!(states.last().unwrap(), &(0x08, 0x00));
    }
}
