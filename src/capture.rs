//! Continuous pin sampling into fixed-size chunks.
//!
//! [`Capture::start`] puts the device into asynchronous bitbang mode with
//! all pins as inputs and spawns a reader thread that accumulates samples
//! into chunks of [`CaptureConfig::chunk_size`] bytes. Full chunks are
//! queued for [`Capture::pop_chunk`]; a partial chunk left over when the
//! capture stops is discarded. One byte holds the levels of pins 0-7 at
//! one sample point; the programmed baud rate is `sample_rate` divided by
//! the chip's fixed 20x bitbang oversampling.
//!
//! # Example
//!
//! ```no_run
//! use std::{thread, time::Duration};
//!
//! use ftdi_bitbang::capture::{find_edge, Capture, CaptureConfig, Edge, Trigger};
//! use ftdi_bitbang::FtdiDevice;
//!
//! let dev = FtdiDevice::open(0x0403, 0x6001)?;
//! let capture = Capture::start(dev, CaptureConfig::default())?;
//!
//! let trigger = Trigger { pin: 2, edge: Edge::Rising };
//! let mut previous = None;
//! for _ in 0..100 {
//!     let Some(chunk) = capture.pop_chunk() else {
//!         thread::sleep(Duration::from_millis(10));
//!         continue;
//!     };
//!     if let Some(at) = find_edge(previous, &chunk, trigger) {
//!         println!("edge at sample {at}");
//!     }
//!     previous = chunk.last().copied();
//! }
//! let _dev = capture.stop()?;
//! # Ok::<(), ftdi_bitbang::Error>(())
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::bitbang::Channel;
use crate::error::{Error, Result};
use crate::types::BitMode;

/// Sampling parameters for [`Capture::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Samples per second. The device baud rate is set to a twentieth of
    /// this, so rates below 20 are rejected.
    pub sample_rate: u32,
    /// Bytes per queued chunk.
    pub chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1_000_000,
            chunk_size: 4096,
        }
    }
}

/// Signal transition direction for [`Trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// An edge to look for in captured samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    /// Pin to watch, 0-7.
    pub pin: u8,
    /// Transition that fires the trigger.
    pub edge: Edge,
}

/// Find the first sample in `data` where the trigger edge occurs.
///
/// `previous` is the last sample of the preceding chunk, so edges spanning
/// a chunk boundary are still seen. Without it the first sample only
/// establishes the starting level and can never trigger itself. Pins
/// above 7 have no sample bit and never match.
pub fn find_edge(previous: Option<u8>, data: &[u8], trigger: Trigger) -> Option<usize> {
    if trigger.pin > 7 {
        return None;
    }
    let mask = 1u8 << trigger.pin;
    let mut last = previous.map(|sample| sample & mask != 0);
    for (i, &sample) in data.iter().enumerate() {
        let level = sample & mask != 0;
        if let Some(last) = last {
            let hit = match trigger.edge {
                Edge::Rising => !last && level,
                Edge::Falling => last && !level,
            };
            if hit {
                return Some(i);
            }
        }
        last = Some(level);
    }
    None
}

/// A running pin capture.
///
/// Owns the device for the duration of the capture; [`stop`](Capture::stop)
/// hands it back.
#[derive(Debug)]
pub struct Capture<C> {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    stop: Arc<AtomicBool>,
    reader: JoinHandle<Result<C>>,
}

impl<C: Channel + Send + 'static> Capture<C> {
    /// Configure the device for sampling and start the reader thread.
    ///
    /// The device is switched to asynchronous bitbang mode with every pin
    /// as input and its latency timer dropped to 1 ms so short reads
    /// drain quickly.
    pub fn start(mut dev: C, config: CaptureConfig) -> Result<Self> {
        if config.sample_rate < 20 {
            return Err(Error::InvalidArgument("sample rate must be at least 20"));
        }
        if config.chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size must be non-zero"));
        }

        dev.set_latency_timer(1)?;
        dev.set_bitmode(0, BitMode::Reset)?;
        dev.set_bitmode(0, BitMode::BitBang)?;
        dev.set_baudrate(config.sample_rate / 20)?;

        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let reader_queue = Arc::clone(&queue);
        let reader_stop = Arc::clone(&stop);
        let reader = thread::spawn(move || -> Result<C> {
            let mut chunk = vec![0u8; config.chunk_size];
            let mut filled = 0;
            while !reader_stop.load(Ordering::Relaxed) {
                let n = dev.read_data(&mut chunk[filled..])?;
                filled += n;
                if filled == chunk.len() {
                    let full = std::mem::replace(&mut chunk, vec![0u8; config.chunk_size]);
                    lock_queue(&reader_queue).push_back(full);
                    filled = 0;
                }
            }
            // A partially filled chunk is dropped here
            Ok(dev)
        });

        Ok(Self {
            queue,
            stop,
            reader,
        })
    }

    /// Take the oldest full chunk off the queue, if one is ready.
    pub fn pop_chunk(&self) -> Option<Vec<u8>> {
        lock_queue(&self.queue).pop_front()
    }

    /// Whether the reader thread is still sampling. Turns false once a
    /// read error ends the capture on its own.
    pub fn is_running(&self) -> bool {
        !self.reader.is_finished()
    }

    /// The shared run flag. Storing `true` from anywhere, a signal handler
    /// included, makes the reader thread wind down as if
    /// [`stop`](Capture::stop) had been called.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Stop sampling and return the device.
    ///
    /// If the reader thread already died on a read error, that error is
    /// returned and the device is gone with it. The device is left in
    /// bitbang mode either way.
    pub fn stop(self) -> Result<C> {
        self.stop.store(true, Ordering::Relaxed);
        match self.reader.join() {
            Ok(result) => result,
            Err(_) => Err(Error::DeviceUnavailable),
        }
    }
}

fn lock_queue(queue: &Mutex<VecDeque<Vec<u8>>>) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
    match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockChannel;
    use std::time::{Duration, Instant};

    fn wait_for_chunk<C: Channel + Send + 'static>(capture: &Capture<C>) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(chunk) = capture.pop_chunk() {
                return chunk;
            }
            assert!(Instant::now() < deadline, "no chunk within 5s");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn start_configures_device_for_sampling() {
        let mut dev = MockChannel::new();
        dev.stream_fill = Some(0xAA);

        let config = CaptureConfig {
            sample_rate: 1_000_000,
            chunk_size: 8,
        };
        let capture = Capture::start(dev, config).unwrap();
        assert!(capture.is_running());
        let chunk = wait_for_chunk(&capture);
        assert_eq!(chunk, vec![0xAA; 8]);

        let dev = capture.stop().unwrap();
        assert_eq!(dev.latencies, vec![1]);
        assert_eq!(
            dev.bitmodes,
            vec![(0, BitMode::Reset), (0, BitMode::BitBang)]
        );
        assert_eq!(dev.baudrates, vec![50_000]);
    }

    #[test]
    fn short_reads_accumulate_into_one_chunk() {
        let mut dev = MockChannel::new();
        dev.read_queue.extend([1, 2, 3]);
        dev.stream_fill = Some(0xBB);

        let config = CaptureConfig {
            sample_rate: 1_000_000,
            chunk_size: 8,
        };
        let capture = Capture::start(dev, config).unwrap();
        let chunk = wait_for_chunk(&capture);
        assert_eq!(chunk, vec![1, 2, 3, 0xBB, 0xBB, 0xBB, 0xBB, 0xBB]);
        capture.stop().unwrap();
    }

    #[test]
    fn stop_flag_winds_down_the_reader() {
        let mut dev = MockChannel::new();
        dev.stream_fill = Some(0x00);

        let capture = Capture::start(dev, CaptureConfig::default()).unwrap();
        capture.stop_flag().store(true, Ordering::Relaxed);

        let deadline = Instant::now() + Duration::from_secs(5);
        while capture.is_running() {
            assert!(Instant::now() < deadline, "reader ignored the flag");
            thread::sleep(Duration::from_millis(1));
        }
        capture.stop().unwrap();
    }

    #[test]
    fn read_error_ends_capture() {
        let mut dev = MockChannel::new();
        dev.fail_reads = true;

        let capture = Capture::start(dev, CaptureConfig::default()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while capture.is_running() {
            assert!(Instant::now() < deadline, "reader did not stop");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(capture.stop(), Err(Error::DeviceUnavailable)));
    }

    #[test]
    fn partial_chunk_is_discarded_on_stop() {
        let mut dev = MockChannel::new();
        dev.read_queue.extend([1, 2, 3, 4, 5]);

        let config = CaptureConfig {
            sample_rate: 1_000_000,
            chunk_size: 8,
        };
        let capture = Capture::start(dev, config).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(capture.pop_chunk().is_none());
        capture.stop().unwrap();
    }

    #[test]
    fn config_limits_are_enforced() {
        let config = CaptureConfig {
            sample_rate: 19,
            chunk_size: 8,
        };
        assert!(matches!(
            Capture::start(MockChannel::new(), config),
            Err(Error::InvalidArgument(_))
        ));

        let config = CaptureConfig {
            sample_rate: 20,
            chunk_size: 0,
        };
        assert!(matches!(
            Capture::start(MockChannel::new(), config),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rising_edge_is_found_after_priming() {
        let trigger = Trigger {
            pin: 0,
            edge: Edge::Rising,
        };
        assert_eq!(find_edge(None, &[0, 0, 1, 1], trigger), Some(2));
        // The first sample only sets the starting level
        assert_eq!(find_edge(None, &[1, 1, 1], trigger), None);
    }

    #[test]
    fn falling_edge_is_found() {
        let trigger = Trigger {
            pin: 0,
            edge: Edge::Falling,
        };
        assert_eq!(find_edge(None, &[1, 1, 0], trigger), Some(2));
        assert_eq!(find_edge(None, &[0, 1, 1], trigger), None);
    }

    #[test]
    fn previous_sample_carries_across_chunks() {
        let trigger = Trigger {
            pin: 0,
            edge: Edge::Rising,
        };
        assert_eq!(find_edge(Some(0), &[1, 1], trigger), Some(0));
        assert_eq!(find_edge(Some(1), &[1, 1], trigger), None);
    }

    #[test]
    fn trigger_watches_only_its_pin() {
        let trigger = Trigger {
            pin: 4,
            edge: Edge::Rising,
        };
        assert_eq!(find_edge(None, &[0x00, 0x10], trigger), Some(1));
        assert_eq!(find_edge(None, &[0x00, 0x08], trigger), None);
    }

    #[test]
    fn out_of_range_pin_never_matches() {
        let trigger = Trigger {
            pin: 8,
            edge: Edge::Rising,
        };
        assert_eq!(find_edge(None, &[0x00, 0xFF], trigger), None);
    }
}
