//! HD44780 character LCD example.
//!
//! Drives a 4-bit HD44780 display wired to the default pins (D4-D7 on
//! pins 0-3, EN on 4, RW on 5, RS on 6) of an FT232R.
//!
//! Usage: cargo run --example lcd -- "Hello from Rust"

use ftdi_bitbang::constants::{pid, FTDI_VID};
use ftdi_bitbang::{BitbangContext, FtdiDevice, Hd44780, Hd44780Pins, PinMode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let text = std::env::args().nth(1).unwrap_or_else(|| "Hello from Rust".into());

    let mut dev = FtdiDevice::open(FTDI_VID, pid::FT232)?;
    let mut bb = BitbangContext::init(&mut dev, PinMode::Bitbang)?;

    println!("Resetting display...");
    let lcd = Hd44780::init(&mut bb, &mut dev, Hd44780Pins::default(), true)?;

    lcd.write_str(&mut bb, &mut dev, &text)?;
    lcd.goto_xy(&mut bb, &mut dev, 0, 1)?;
    lcd.write_str(&mut bb, &mut dev, "line two")?;

    println!("Done.");
    Ok(())
}
