//! Pin capture example.
//!
//! Samples all pins of an FT232R at 100 kHz and reports the first rising
//! edge seen on pin 0.
//!
//! Usage: cargo run --example capture

use std::thread;
use std::time::Duration;

use ftdi_bitbang::capture::{find_edge, Capture, CaptureConfig, Edge, Trigger};
use ftdi_bitbang::constants::{pid, FTDI_VID};
use ftdi_bitbang::FtdiDevice;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let dev = FtdiDevice::open(FTDI_VID, pid::FT232)?;
    let config = CaptureConfig {
        sample_rate: 100_000,
        chunk_size: 4096,
    };
    let capture = Capture::start(dev, config)?;
    println!("Sampling at {} Hz...", config.sample_rate);

    let trigger = Trigger {
        pin: 0,
        edge: Edge::Rising,
    };
    let mut previous = None;
    let mut sample_base = 0u64;

    for _ in 0..100 {
        let Some(chunk) = capture.pop_chunk() else {
            thread::sleep(Duration::from_millis(10));
            continue;
        };
        if let Some(at) = find_edge(previous, &chunk, trigger) {
            println!("Rising edge on pin 0 at sample {}", sample_base + at as u64);
            break;
        }
        previous = chunk.last().copied();
        sample_base += chunk.len() as u64;
    }

    capture.stop()?;
    Ok(())
}
