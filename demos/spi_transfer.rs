//! Bit-banged SPI example.
//!
//! Reads the JEDEC ID of a flash chip wired to the default SPI pins
//! (SCLK on pin 0, MOSI on 1, MISO on 2, SS on 3) of an FT232R.
//!
//! Usage: cargo run --example spi_transfer

use ftdi_bitbang::constants::{pid, FTDI_VID};
use ftdi_bitbang::{BitbangContext, FtdiDevice, PinMode, Spi, SpiMode, SpiPins};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut dev = FtdiDevice::open(FTDI_VID, pid::FT232)?;
    let mut bb = BitbangContext::init(&mut dev, PinMode::Bitbang)?;
    let spi = Spi::init(&mut bb, &mut dev, SpiPins::default(), SpiMode::Mode0)?;

    // 0x9F (read JEDEC ID) followed by three clocked-out reply bytes
    let reply = spi.transfer(&mut bb, &mut dev, 0x9F00_0000, 32)?;
    let [_, id0, id1, id2] = reply.to_be_bytes();
    println!("JEDEC ID: {id0:02x} {id1:02x} {id2:02x}");

    Ok(())
}
