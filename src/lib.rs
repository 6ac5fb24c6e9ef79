//! Bit-banged peripheral protocols over FTDI USB devices.
//!
//! This crate drives GPIO-style pins on FTDI USB-to-serial converter chips
//! (FT232R, FT2232H, FT4232H, FT232H, FT230X and friends) and builds
//! descendant protocols on top of them. It uses
//! [nusb](https://crates.io/crates/nusb) as the USB backend, so no C
//! dependencies or `libusb` are required.
//!
//! # Quick Start
//!
//! ```no_run
//! use ftdi_bitbang::{constants::pid, BitbangContext, FtdiDevice, PinMode, FTDI_VID};
//!
//! // Open the first FT232R connected and drive pin 0 high
//! let mut dev = FtdiDevice::open(FTDI_VID, pid::FT232)?;
//! let mut bb = BitbangContext::init(&mut dev, PinMode::Bitbang)?;
//! bb.set_direction(0, true)?;
//! bb.set_pin(0, true)?;
//! bb.flush(&mut dev)?;
//! # Ok::<(), ftdi_bitbang::Error>(())
//! ```
//!
//! # Features
//!
//! - **Device discovery**: Enumerate and filter connected FTDI devices,
//!   including a scan over every known FTDI product ID.
//! - **Pin state**: A shadowed 16-bit pin store that tracks values and
//!   directions and flushes only what changed ([`bitbang`]).
//! - **State persistence**: Save pin state per physical device and pick
//!   it up again in a later process ([`state_file`]).
//! - **HD44780**: Character LCDs on seven pins in 4-bit mode
//!   ([`hd44780`]).
//! - **SPI master**: Bit-banged SPI with all four clock modes
//!   ([`spi`]).
//! - **PIC programming**: Low-voltage ICSP entry, command and payload
//!   shifting, NVM reads ([`icsp`]).
//! - **Command scripts**: The `h3,l5` style textual pin language
//!   ([`command`]).
//! - **Capture**: Continuous pin sampling with edge triggers
//!   ([`capture`]).
//! - **`Read` / `Write` traits**: Use `FtdiDevice` anywhere
//!   `std::io::Read` or `std::io::Write` is expected.

mod baudrate;
pub mod bitbang;
pub mod capture;
pub mod command;
pub mod constants;
pub mod device;
pub mod device_info;
pub mod error;
#[cfg(feature = "embedded-hal")]
pub mod hal;
pub mod hd44780;
pub mod icsp;
pub mod spi;
pub mod state_file;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

// ---- Convenience re-exports ----

pub use bitbang::{BitbangContext, Channel, PinMode};
pub use capture::{Capture, CaptureConfig, Edge, Trigger};
pub use command::{parse_script, Command, CommandRunner, ScriptedCommand};
pub use constants::FTDI_VID;
pub use device::FtdiDevice;
pub use device_info::{find_all_ftdi, find_device, find_devices, DeviceFilter};
pub use error::{Error, Result};
pub use hd44780::{Hd44780, Hd44780Pins};
pub use icsp::{Icsp, IcspPins};
pub use spi::{Spi, SpiMode, SpiPins};
pub use state_file::DeviceIdentity;
pub use types::*;
