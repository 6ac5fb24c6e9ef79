//! Bit-banged SPI master.
//!
//! Shifts up to 32 bits full duplex over four GPIO lines of a
//! [`BitbangContext`], with all four standard clock modes. Every clock edge
//! is an explicit flush, so the line settles before the next edge; that
//! makes the timing robust and also the throughput ceiling of this driver.
//!
//! # Pin Mapping
//!
//! | Signal | Default pin |
//! |--------|-------------|
//! | SCLK   | 0           |
//! | MOSI   | 1           |
//! | MISO   | 2           |
//! | SS     | 3           |
//!
//! # Example
//!
//! ```no_run
//! use ftdi_bitbang::constants::{pid, FTDI_VID};
//! use ftdi_bitbang::{BitbangContext, FtdiDevice, PinMode, Spi, SpiMode, SpiPins};
//!
//! let mut dev = FtdiDevice::open(FTDI_VID, pid::FT232)?;
//! let mut bb = BitbangContext::init(&mut dev, PinMode::Bitbang)?;
//!
//! let spi = Spi::init(&mut bb, &mut dev, SpiPins::default(), SpiMode::Mode0)?;
//! let response = spi.transfer(&mut bb, &mut dev, 0x9F00, 16)?;
//! println!("id: {response:#06x}");
//! # Ok::<(), ftdi_bitbang::Error>(())
//! ```

use crate::bitbang::{BitbangContext, Channel};
use crate::error::{Error, Result};

/// SPI clock polarity and phase mode.
///
/// Standard Motorola SPI modes:
///
/// | Mode | CPOL | CPHA | Description |
/// |------|------|------|-------------|
/// | 0    | 0    | 0    | Clock idle low, sample on rising edge |
/// | 1    | 0    | 1    | Clock idle low, sample on falling edge |
/// | 2    | 1    | 0    | Clock idle high, sample on falling edge |
/// | 3    | 1    | 1    | Clock idle high, sample on rising edge |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0.
    Mode0,
    /// CPOL=0, CPHA=1.
    Mode1,
    /// CPOL=1, CPHA=0.
    Mode2,
    /// CPOL=1, CPHA=1.
    Mode3,
}

impl SpiMode {
    /// Clock polarity: true = idle high.
    pub fn cpol(self) -> bool {
        matches!(self, Self::Mode2 | Self::Mode3)
    }

    /// Clock phase: true = sample on the edge returning to idle.
    pub fn cpha(self) -> bool {
        matches!(self, Self::Mode1 | Self::Mode3)
    }
}

/// Pin assignment for the SPI signals.
///
/// `ss` may be `None` for buses where the select line is tied or driven
/// elsewhere; [`enable`](Spi::enable) and [`disable`](Spi::disable) become
/// no-ops then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiPins {
    /// Serial clock.
    pub sclk: u8,
    /// Master out, slave in.
    pub mosi: u8,
    /// Master in, slave out.
    pub miso: u8,
    /// Slave select, if wired.
    pub ss: Option<u8>,
}

impl Default for SpiPins {
    /// SCLK 0, MOSI 1, MISO 2, SS 3.
    fn default() -> Self {
        Self {
            sclk: 0,
            mosi: 1,
            miso: 2,
            ss: Some(3),
        }
    }
}

/// A bit-banged SPI master on four pins.
///
/// Holds the pin mapping, clock mode and select polarity. Pin state and
/// the device handle are borrowed per call.
#[derive(Debug, Clone)]
pub struct Spi {
    pins: SpiPins,
    mode: SpiMode,
    ss_active_high: bool,
}

// ---- Construction / Configuration ----

impl Spi {
    /// Configure the SPI pins and park the bus idle.
    ///
    /// SCLK, MOSI and SS become outputs and MISO an input; the clock is
    /// driven to its idle level and the select line deasserted, all in one
    /// flush. The select line defaults to active low.
    pub fn init<C: Channel>(
        bb: &mut BitbangContext,
        dev: &mut C,
        pins: SpiPins,
        mode: SpiMode,
    ) -> Result<Self> {
        let spi = Self {
            pins,
            mode,
            ss_active_high: false,
        };

        bb.set_direction(pins.sclk, true)?;
        bb.set_direction(pins.mosi, true)?;
        bb.set_direction(pins.miso, false)?;
        if let Some(ss) = pins.ss {
            bb.set_direction(ss, true)?;
            bb.set_pin(ss, !spi.ss_active_high)?;
        }
        bb.set_pin(pins.sclk, mode.cpol())?;
        bb.flush(dev)?;

        Ok(spi)
    }

    /// The pin mapping this driver was built with.
    pub fn pins(&self) -> SpiPins {
        self.pins
    }

    /// The current clock mode.
    pub fn mode(&self) -> SpiMode {
        self.mode
    }

    /// Change the clock mode and re-park the clock at its idle level.
    pub fn set_mode<C: Channel>(
        &mut self,
        bb: &mut BitbangContext,
        dev: &mut C,
        mode: SpiMode,
    ) -> Result<()> {
        self.mode = mode;
        bb.set_pin(self.pins.sclk, mode.cpol())?;
        bb.flush(dev)
    }

    /// Change the select line polarity and re-park it deasserted.
    pub fn set_ss_polarity<C: Channel>(
        &mut self,
        bb: &mut BitbangContext,
        dev: &mut C,
        active_high: bool,
    ) -> Result<()> {
        self.ss_active_high = active_high;
        self.disable(bb, dev)
    }
}

// ---- Select line ----

impl Spi {
    /// Assert the select line. No-op without a select pin.
    pub fn enable<C: Channel>(&self, bb: &mut BitbangContext, dev: &mut C) -> Result<()> {
        let Some(ss) = self.pins.ss else {
            return Ok(());
        };
        bb.set_pin(ss, self.ss_active_high)?;
        bb.flush(dev)
    }

    /// Deassert the select line. No-op without a select pin.
    pub fn disable<C: Channel>(&self, bb: &mut BitbangContext, dev: &mut C) -> Result<()> {
        let Some(ss) = self.pins.ss else {
            return Ok(());
        };
        bb.set_pin(ss, !self.ss_active_high)?;
        bb.flush(dev)
    }
}

// ---- Transfers ----

impl Spi {
    /// Shift `bits` bits (1-32) out of `data` MSB first while sampling the
    /// same number of bits back, with the select line handled by the
    /// caller.
    ///
    /// With CPHA=0 a data bit is on the line before the idle-to-active
    /// clock edge and MISO is sampled on that edge; the next bit rides the
    /// return edge. With CPHA=1 the data bit changes on the idle-to-active
    /// edge and MISO is sampled on the return edge. The sampled bits are
    /// packed MSB first into the returned word.
    pub fn transfer_raw<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        data: u32,
        bits: u8,
    ) -> Result<u32> {
        if bits < 1 || bits > 32 {
            return Err(Error::OutOfRange("bit count must be 1-32"));
        }
        let top = bits - 1;
        let cpol = self.mode.cpol();
        let cpha = self.mode.cpha();
        let mut read = 0u32;

        if !cpha {
            bb.set_pin(self.pins.mosi, data & (1 << top) != 0)?;
            bb.flush(dev)?;
        }

        for i in (0..=top).rev() {
            if cpha {
                bb.set_pin(self.pins.mosi, data & (1 << i) != 0)?;
            }
            bb.set_pin(self.pins.sclk, !cpol)?;
            bb.flush(dev)?;

            if !cpha {
                let level = bb.read_pin(dev, self.pins.miso)?;
                read = (read << 1) | u32::from(level);
                if i > 0 {
                    // Stage the next bit so it rides the return edge
                    bb.set_pin(self.pins.mosi, data & (1 << (i - 1)) != 0)?;
                }
            }

            bb.set_pin(self.pins.sclk, cpol)?;
            bb.flush(dev)?;

            if cpha {
                let level = bb.read_pin(dev, self.pins.miso)?;
                read = (read << 1) | u32::from(level);
            }
        }

        Ok(read)
    }

    /// [`transfer_raw`](Self::transfer_raw) wrapped in select assert and
    /// deassert. The select line is released even when the shift fails.
    pub fn transfer<C: Channel>(
        &self,
        bb: &mut BitbangContext,
        dev: &mut C,
        data: u32,
        bits: u8,
    ) -> Result<u32> {
        self.enable(bb, dev)?;
        let read = self.transfer_raw(bb, dev, data, bits);
        let deselect = self.disable(bb, dev);
        let read = read?;
        deselect?;
        Ok(read)
    }
}
