//! Pin command script example.
//!
//! Runs a textual pin script against the first FT232R found, restoring
//! and saving the per-device pin state so repeated runs pick up where the
//! last one stopped.
//!
//! Usage: cargo run --example pins -- io=0f h0,l1 d=0.5 l0,h1 r

use std::io;

use ftdi_bitbang::command::{parse_script, CommandRunner};
use ftdi_bitbang::constants::{pid, FTDI_VID};
use ftdi_bitbang::{state_file, BitbangContext, DeviceIdentity, FtdiDevice, PinMode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let tokens: Vec<String> = std::env::args().skip(1).collect();
    let script = if tokens.is_empty() {
        parse_script(["io=ff", "h0", "d=0.5", "l0", "rb"])?
    } else {
        parse_script(&tokens)?
    };

    let mut dev = FtdiDevice::open(FTDI_VID, pid::FT232)?;
    println!("Chip type: {:?}", dev.chip_type());

    // Pick up the pin state a previous run left behind
    let identity = DeviceIdentity::from_device(&dev);
    let mut bb = state_file::load(&identity)
        .unwrap_or_else(|| BitbangContext::new(PinMode::Bitbang));
    bb.enable(&mut dev)?;

    let mut runner = CommandRunner::new();
    runner.run(&mut bb, &mut dev, &mut io::stdout(), &script)?;

    state_file::save(&identity, &bb)?;
    Ok(())
}
