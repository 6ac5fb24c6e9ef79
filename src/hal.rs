//! `embedded-hal` 1.0 and `embedded-io` 0.6 trait implementations.
//!
//! This module provides trait implementations that let you drive
//! `embedded-hal` device drivers over bit-banged FTDI pins. Enable the
//! `embedded-hal` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ftdi-bitbang = { version = "0.1", features = ["embedded-hal"] }
//! ```
//!
//! # Provided implementations
//!
//! | Trait | Type | Notes |
//! |-------|------|-------|
//! | `embedded_hal::spi::SpiDevice` | [`FtdiSpiDevice`] | Wraps [`Spi`](crate::spi::Spi) + pins |
//! | `embedded_io::Read` | [`FtdiDevice`](crate::FtdiDevice) | Serial read |
//! | `embedded_io::Write` | [`FtdiDevice`](crate::FtdiDevice) | Serial write |

use crate::bitbang::{BitbangContext, Channel, PinMode};
use crate::device::FtdiDevice;
use crate::error::Error;
use crate::spi::{Spi, SpiMode, SpiPins};

// ---- Error conversion ----

/// Embedded-hal error kind mapping for FTDI errors.
impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        // embedded-hal SPI ErrorKind has no finer categories that map to
        // FTDI/USB errors, so everything maps to Other.
        embedded_hal::spi::ErrorKind::Other
    }
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::Transfer(nusb::transfer::TransferError::Cancelled) => {
                embedded_io::ErrorKind::TimedOut
            }
            Error::WriteZero => embedded_io::ErrorKind::WriteZero,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

// ---- embedded-io for FtdiDevice ----

impl embedded_io::ErrorType for FtdiDevice {
    type Error = Error;
}

impl embedded_io::Read for FtdiDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_data(buf)
    }
}

impl embedded_io::Write for FtdiDevice {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.write_data(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flush_tx()
    }
}

// ---- embedded-hal SPI ----

/// Wrapper that implements `embedded_hal::spi::SpiDevice` over bit-banged
/// pins.
///
/// This bundles the device, its [`BitbangContext`] pin state and a
/// [`Spi`](crate::spi::Spi) bus so the combined type satisfies the
/// `SpiDevice` trait.
///
/// # Example
///
/// ```no_run
/// use ftdi_bitbang::hal::FtdiSpiDevice;
/// use ftdi_bitbang::SpiMode;
///
/// let mut hal_spi = FtdiSpiDevice::open(0x0403, 0x6001, SpiMode::Mode0)?;
///
/// // Now use with any embedded-hal SPI driver:
/// use embedded_hal::spi::SpiDevice;
/// let mut buf = [0u8; 4];
/// hal_spi.transfer(&mut buf, &[0x9F, 0, 0, 0])?;
/// # Ok::<(), ftdi_bitbang::Error>(())
/// ```
pub struct FtdiSpiDevice<C = FtdiDevice> {
    dev: C,
    bb: BitbangContext,
    spi: Spi,
}

impl FtdiSpiDevice<FtdiDevice> {
    /// Open an FTDI device and configure it for bit-banged SPI.
    ///
    /// This is a convenience constructor that opens the device, enables
    /// asynchronous bitbang mode and parks the SPI bus on the default
    /// pins in a single call.
    pub fn open(vendor: u16, product: u16, mode: SpiMode) -> crate::error::Result<Self> {
        let mut dev = FtdiDevice::open(vendor, product)?;
        let mut bb = BitbangContext::init(&mut dev, PinMode::Bitbang)?;
        let spi = Spi::init(&mut bb, &mut dev, SpiPins::default(), mode)?;
        Ok(Self { dev, bb, spi })
    }
}

impl<C: Channel> FtdiSpiDevice<C> {
    /// Create from already-configured components.
    pub fn from_parts(dev: C, bb: BitbangContext, spi: Spi) -> Self {
        Self { dev, bb, spi }
    }

    /// Borrow the underlying device.
    pub fn device(&self) -> &C {
        &self.dev
    }

    /// Mutably borrow the underlying device.
    pub fn device_mut(&mut self) -> &mut C {
        &mut self.dev
    }

    /// Borrow the underlying pin state.
    pub fn context(&self) -> &BitbangContext {
        &self.bb
    }

    /// Mutably borrow the underlying pin state.
    pub fn context_mut(&mut self) -> &mut BitbangContext {
        &mut self.bb
    }

    /// Decompose into the underlying parts.
    pub fn into_parts(self) -> (C, BitbangContext, Spi) {
        (self.dev, self.bb, self.spi)
    }
}

impl<C: Channel> embedded_hal::spi::ErrorType for FtdiSpiDevice<C> {
    type Error = Error;
}

impl<C: Channel> embedded_hal::spi::SpiDevice for FtdiSpiDevice<C> {
    fn transaction(
        &mut self,
        operations: &mut [embedded_hal::spi::Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        use embedded_hal::spi::Operation;

        // Assert the select line at the start of the transaction
        self.spi.enable(&mut self.bb, &mut self.dev)?;

        let result = (|| -> crate::error::Result<()> {
            for op in operations.iter_mut() {
                match op {
                    Operation::Read(buf) => {
                        for slot in buf.iter_mut() {
                            *slot = self.spi.transfer_raw(&mut self.bb, &mut self.dev, 0, 8)?
                                as u8;
                        }
                    }
                    Operation::Write(buf) => {
                        for &byte in buf.iter() {
                            self.spi
                                .transfer_raw(&mut self.bb, &mut self.dev, byte.into(), 8)?;
                        }
                    }
                    Operation::Transfer(read, write) => {
                        // The longer buffer sets the length; missing write
                        // bytes go out as zeros, extra reads are dropped
                        for i in 0..read.len().max(write.len()) {
                            let out = write.get(i).copied().unwrap_or(0);
                            let got =
                                self.spi
                                    .transfer_raw(&mut self.bb, &mut self.dev, out.into(), 8)?;
                            if let Some(slot) = read.get_mut(i) {
                                *slot = got as u8;
                            }
                        }
                    }
                    Operation::TransferInPlace(buf) => {
                        for slot in buf.iter_mut() {
                            let got = self.spi.transfer_raw(
                                &mut self.bb,
                                &mut self.dev,
                                (*slot).into(),
                                8,
                            )?;
                            *slot = got as u8;
                        }
                    }
                    Operation::DelayNs(ns) => {
                        std::thread::sleep(std::time::Duration::from_nanos(u64::from(*ns)));
                    }
                }
            }
            Ok(())
        })();

        // Always release the select line, even on error
        let deselect = self.spi.disable(&mut self.bb, &mut self.dev);

        // Return the first error
        result?;
        deselect
    }
}
