//! Test doubles shared by the unit tests: a recording [`Channel`]
//! implementation and helpers for decoding the recorded wire traffic.

use std::collections::VecDeque;

use crate::bitbang::Channel;
use crate::constants::mpsse;
use crate::error::{Error, Result};
use crate::types::BitMode;

/// A recording stand-in for an FTDI device.
///
/// Writes and configuration calls are captured for inspection; reads are
/// served from [`read_queue`](Self::read_queue), then from
/// [`stream_fill`](Self::stream_fill) if set.
#[derive(Debug, Default)]
pub(crate) struct MockChannel {
    /// Every bulk write payload, in call order.
    pub writes: Vec<Vec<u8>>,
    /// Every set_bitmode call as (bitmask, mode).
    pub bitmodes: Vec<(u8, BitMode)>,
    /// Every set_baudrate call.
    pub baudrates: Vec<u32>,
    /// Every set_latency_timer call.
    pub latencies: Vec<u8>,
    /// Bytes handed out by read_data.
    pub read_queue: VecDeque<u8>,
    /// When the queue is empty, fill whole read buffers with this byte.
    pub stream_fill: Option<u8>,
    /// Levels returned by the read-pins request.
    pub pin_levels: u8,
    /// Make every write fail without recording it.
    pub fail_writes: bool,
    /// Make every read fail.
    pub fail_reads: bool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Channel for MockChannel {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(Error::WriteZero);
        }
        self.writes.push(data.to_vec());
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.fail_reads {
            return Err(Error::DeviceUnavailable);
        }
        if !self.read_queue.is_empty() {
            let n = buf.len().min(self.read_queue.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.read_queue.pop_front().unwrap();
            }
            return Ok(n);
        }
        if let Some(fill) = self.stream_fill {
            buf.fill(fill);
            return Ok(buf.len());
        }
        Ok(0)
    }

    fn set_bitmode(&mut self, bitmask: u8, mode: BitMode) -> Result<()> {
        self.bitmodes.push((bitmask, mode));
        Ok(())
    }

    fn read_pins(&mut self) -> Result<u8> {
        Ok(self.pin_levels)
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<()> {
        self.baudrates.push(baudrate);
        Ok(())
    }

    fn set_latency_timer(&mut self, ms: u8) -> Result<()> {
        self.latencies.push(ms);
        Ok(())
    }
}

/// Replay recorded MPSSE traffic and return every successive
/// (value, direction) state of the low pin bank.
///
/// Panics on opcodes the pin layer does not emit, so a test fails loudly if
/// unexpected traffic appears.
pub(crate) fn low_bank_states(writes: &[Vec<u8>]) -> Vec<(u8, u8)> {
    let mut states = Vec::new();
    for write in writes {
        let mut bytes = write.iter().copied();
        while let Some(opcode) = bytes.next() {
            match opcode {
                mpsse::SET_BITS_LOW => {
                    let value = bytes.next().expect("value byte");
                    let direction = bytes.next().expect("direction byte");
                    states.push((value, direction));
                }
                mpsse::SET_BITS_HIGH => {
                    bytes.next().expect("value byte");
                    bytes.next().expect("direction byte");
                }
                mpsse::GET_BITS_LOW | mpsse::GET_BITS_HIGH => {
                    assert_eq!(bytes.next(), Some(mpsse::SEND_IMMEDIATE));
                }
                other => panic!("unexpected opcode {other:#04x}"),
            }
        }
    }
    states
}

/// Level history of one low-bank pin across a state sequence.
pub(crate) fn pin_history(states: &[(u8, u8)], pin: u8) -> Vec<bool> {
    states
        .iter()
        .map(|(value, _)| value & (1 << pin) != 0)
        .collect()
}

/// Count low-to-high transitions in a level history, starting from `initial`.
pub(crate) fn count_rising_edges(levels: &[bool], initial: bool) -> usize {
    let mut count = 0;
    let mut last = initial;
    for &level in levels {
        if level && !last {
            count += 1;
        }
        last = level;
    }
    count
}
