//! Property-based tests for the shadowed pin state.
//!
//! Uses `proptest` to drive random pin operation sequences and verify that
//! the dirty mask, the flushed wire traffic and the persisted state file
//! all agree with a direct model of the last flushed state.

use std::fs;

use ftdi_bitbang::constants::mpsse;
use ftdi_bitbang::types::{BitMode, ChipType};
use ftdi_bitbang::{state_file, BitbangContext, Channel, DeviceIdentity, PinMode, Result};
use proptest::prelude::*;

/// Minimal recording device; flushes land in `writes`.
#[derive(Debug, Default)]
struct RecordingChannel {
    writes: Vec<Vec<u8>>,
}

impl Channel for RecordingChannel {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writes.push(data.to_vec());
        Ok(())
    }

    fn read_data(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn set_bitmode(&mut self, _bitmask: u8, _mode: BitMode) -> Result<()> {
        Ok(())
    }

    fn read_pins(&mut self) -> Result<u8> {
        Ok(0)
    }

    fn set_baudrate(&mut self, _baudrate: u32) -> Result<()> {
        Ok(())
    }

    fn set_latency_timer(&mut self, _ms: u8) -> Result<()> {
        Ok(())
    }
}

/// One random pin manipulation.
#[derive(Debug, Clone, Copy)]
enum PinOp {
    SetPin { pin: u8, high: bool },
    SetDirection { pin: u8, output: bool },
    SetPins(u16),
    SetDirections(u16),
    Flush,
}

/// Plain mirror of what the pin store should hold after each operation.
struct Model {
    width_mask: u16,
    pin_count: u8,
    value: u16,
    direction: u16,
    sent_value: u16,
    sent_direction: u16,
}

impl Model {
    fn new(mode: PinMode) -> Self {
        let pin_count = match mode {
            PinMode::Bitbang => 8,
            PinMode::Mpsse => 16,
        };
        Self {
            width_mask: if pin_count == 8 { 0x00FF } else { 0xFFFF },
            pin_count,
            value: 0,
            direction: 0,
            sent_value: 0,
            sent_direction: 0,
        }
    }

    /// Apply one operation. Returns false when the store should reject it.
    fn apply(&mut self, op: PinOp) -> bool {
        match op {
            PinOp::SetPin { pin, high } => {
                if pin >= self.pin_count {
                    return false;
                }
                if high {
                    self.value |= 1 << pin;
                } else {
                    self.value &= !(1 << pin);
                }
            }
            PinOp::SetDirection { pin, output } => {
                if pin >= self.pin_count {
                    return false;
                }
                if output {
                    self.direction |= 1 << pin;
                } else {
                    self.direction &= !(1 << pin);
                }
            }
            PinOp::SetPins(values) => self.value = values & self.width_mask,
            PinOp::SetDirections(dirs) => self.direction = dirs & self.width_mask,
            PinOp::Flush => {
                self.sent_value = self.value;
                self.sent_direction = self.direction;
            }
        }
        true
    }

    fn dirty(&self) -> u16 {
        (self.value ^ self.sent_value) | (self.direction ^ self.sent_direction)
    }
}

fn mode_strategy() -> impl Strategy<Value = PinMode> {
    prop_oneof![Just(PinMode::Bitbang), Just(PinMode::Mpsse)]
}

fn op_strategy() -> impl Strategy<Value = PinOp> {
    prop_oneof![
        (0u8..16, any::<bool>()).prop_map(|(pin, high)| PinOp::SetPin { pin, high }),
        (0u8..16, any::<bool>()).prop_map(|(pin, output)| PinOp::SetDirection { pin, output }),
        any::<u16>().prop_map(PinOp::SetPins),
        any::<u16>().prop_map(PinOp::SetDirections),
        Just(PinOp::Flush),
    ]
}

/// Run one operation against the real store, flushing through `dev`.
fn apply(bb: &mut BitbangContext, dev: &mut RecordingChannel, op: PinOp) -> Result<()> {
    match op {
        PinOp::SetPin { pin, high } => bb.set_pin(pin, high),
        PinOp::SetDirection { pin, output } => bb.set_direction(pin, output),
        PinOp::SetPins(values) => {
            bb.set_pins(values);
            Ok(())
        }
        PinOp::SetDirections(dirs) => {
            bb.set_directions(dirs);
            Ok(())
        }
        PinOp::Flush => bb.flush(dev),
    }
}

proptest! {
    /// The dirty mask always equals the difference between current and
    /// last-flushed state, and invalid pins are rejected without side
    /// effects.
    #[test]
    fn dirty_mask_tracks_unflushed_changes(
        mode in mode_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..64),
    ) {
        let mut bb = BitbangContext::new(mode);
        let mut dev = RecordingChannel::default();
        let mut model = Model::new(mode);

        for op in ops {
            let accepted = model.apply(op);
            let result = apply(&mut bb, &mut dev, op);
            prop_assert_eq!(result.is_ok(), accepted, "acceptance mismatch for {:?}", op);
            prop_assert_eq!(bb.value(), model.value, "value mismatch after {:?}", op);
            prop_assert_eq!(bb.direction(), model.direction,
                "direction mismatch after {:?}", op);
            prop_assert_eq!(bb.dirty(), model.dirty(), "dirty mismatch after {:?}", op);
        }
    }

    /// A clean store never writes; flushing twice in a row sends nothing
    /// the second time.
    #[test]
    fn flush_is_idempotent(
        mode in mode_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..32),
    ) {
        let mut bb = BitbangContext::new(mode);
        let mut dev = RecordingChannel::default();

        for op in ops {
            let _ = apply(&mut bb, &mut dev, op);
        }
        bb.flush(&mut dev)?;
        prop_assert_eq!(bb.dirty(), 0);

        let writes_after_flush = dev.writes.len();
        bb.flush(&mut dev)?;
        prop_assert_eq!(dev.writes.len(), writes_after_flush,
            "second flush must not touch the device");
    }

    /// In the 16-pin mode a flush sends exactly the changed halves, with
    /// the current value and direction bytes.
    #[test]
    fn flush_sends_exactly_the_dirty_halves(
        values in any::<u16>(),
        dirs in any::<u16>(),
    ) {
        let mut bb = BitbangContext::new(PinMode::Mpsse);
        let mut dev = RecordingChannel::default();

        bb.set_pins(values);
        bb.set_directions(dirs);
        let dirty = bb.dirty();
        bb.flush(&mut dev)?;

        if dirty == 0 {
            prop_assert!(dev.writes.is_empty());
            return Ok(());
        }

        let buf = &dev.writes[0];
        let mut expected = Vec::new();
        if dirty & 0x00FF != 0 {
            expected.extend([mpsse::SET_BITS_LOW, values as u8, dirs as u8]);
        }
        if dirty & 0xFF00 != 0 {
            expected.extend([mpsse::SET_BITS_HIGH, (values >> 8) as u8, (dirs >> 8) as u8]);
        }
        prop_assert_eq!(buf, &expected);
    }

    /// Saving and reloading through the state file preserves value,
    /// direction, mode and the unflushed difference.
    #[test]
    fn state_file_round_trip(
        mode in mode_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..32),
    ) {
        let mut bb = BitbangContext::new(mode);
        let mut dev = RecordingChannel::default();
        for op in ops {
            let _ = apply(&mut bb, &mut dev, op);
        }

        let identity = DeviceIdentity::new(250, 99, &[250, 251, 252], 0, ChipType::Ft232R);
        let _ = fs::remove_file(identity.path());

        state_file::save(&identity, &bb)?;
        let loaded = state_file::load(&identity);
        let _ = fs::remove_file(identity.path());
        prop_assert!(loaded.is_some(), "saved state did not load");
        let loaded = loaded.unwrap();

        prop_assert_eq!(loaded.mode(), bb.mode());
        prop_assert_eq!(loaded.value(), bb.value());
        prop_assert_eq!(loaded.direction(), bb.direction());
        prop_assert_eq!(loaded.dirty(), bb.dirty());

        // The reloaded store flushes the same bytes as the original
        let mut dev_a = RecordingChannel::default();
        let mut dev_b = RecordingChannel::default();
        let mut original = bb;
        let mut reloaded = loaded;
        original.flush(&mut dev_a)?;
        reloaded.flush(&mut dev_b)?;
        prop_assert_eq!(dev_a.writes, dev_b.writes);
    }
}
