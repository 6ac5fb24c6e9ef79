//! Textual pin command parsing and execution.
//!
//! The command layer turns `(name, optional value)` pairs into typed
//! [`Command`] values at parse time and runs them strictly in order,
//! flushing pin state after every command unless the script marks more
//! commands as chained into the same flush. The first failure stops the
//! run.
//!
//! # Commands
//!
//! | Command    | Meaning |
//! |------------|---------|
//! | `io=HEX`   | set the direction word, 1 bits are outputs |
//! | `iod=DEC`  | same, decimal value |
//! | `oPIN`     | set one pin as output |
//! | `iPIN`     | set one pin as input |
//! | `w=HEX`    | set the pin value word |
//! | `wd=DEC`   | same, decimal value |
//! | `hPIN`     | drive one pin high (and as output) |
//! | `lPIN`     | drive one pin low (and as output) |
//! | `r`        | read pins, print hex |
//! | `rd`       | read pins, print decimal |
//! | `rb`       | read pins, print binary, 8 or 16 digits by mode |
//! | `rPIN`     | read one pin, print 0 or 1 |
//! | `d=SECS`   | sleep before the next command |
//! | `t=SECS`   | busy-wait until this long after the first command |
//!
//! In a script, commands joined with `,` share one flush at the end of
//! the group; `=` separates a command name from its value.
//!
//! # Example
//!
//! ```
//! use ftdi_bitbang::command::parse_script;
//!
//! let script = parse_script(["io=0f", "h0,l1", "d=0.01"])?;
//! assert_eq!(script.len(), 4);
//! # Ok::<(), ftdi_bitbang::Error>(())
//! ```

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use crate::bitbang::{BitbangContext, Channel, PinMode};
use crate::error::{Error, Result};

/// One parsed pin command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set the whole direction word (bit set = output).
    SetDirections(u16),
    /// Set one pin as output.
    SetPinOutput(u8),
    /// Set one pin as input.
    SetPinInput(u8),
    /// Set the whole pin value word.
    WriteValues(u16),
    /// Drive one pin high, making it an output.
    SetPinHigh(u8),
    /// Drive one pin low, making it an output.
    SetPinLow(u8),
    /// Read all pins and print them as hex.
    ReadHex,
    /// Read all pins and print them as decimal.
    ReadDec,
    /// Read all pins and print them as binary digits.
    ReadBin,
    /// Read one pin and print 0 or 1.
    ReadPin(u8),
    /// Sleep this long before the next command.
    Delay(Duration),
    /// Busy-wait until this long after the first executed command.
    DelayUntil(Duration),
}

impl Command {
    /// Parse one `(name, optional value)` pair.
    ///
    /// Unknown names, missing or unexpected values and malformed numbers
    /// all fail with [`Error::InvalidCommand`]; nothing is resolved at
    /// execution time.
    pub fn parse(name: &str, value: Option<&str>) -> Result<Self> {
        let invalid = || Error::InvalidCommand(join_pair(name, value));

        let word = |radix: u32| -> Result<u16> {
            let value = value.ok_or_else(invalid)?;
            u16::from_str_radix(value, radix).map_err(|_| invalid())
        };
        let seconds = || -> Result<Duration> {
            let value = value.ok_or_else(invalid)?;
            let secs: f64 = value.parse().map_err(|_| invalid())?;
            Duration::try_from_secs_f64(secs).map_err(|_| invalid())
        };

        match name {
            "io" => return Ok(Self::SetDirections(word(16)?)),
            "iod" => return Ok(Self::SetDirections(word(10)?)),
            "w" => return Ok(Self::WriteValues(word(16)?)),
            "wd" => return Ok(Self::WriteValues(word(10)?)),
            "r" if value.is_none() => return Ok(Self::ReadHex),
            "rd" if value.is_none() => return Ok(Self::ReadDec),
            "rb" if value.is_none() => return Ok(Self::ReadBin),
            "d" => return Ok(Self::Delay(seconds()?)),
            "t" => return Ok(Self::DelayUntil(seconds()?)),
            _ => {}
        }

        // Single-letter pin commands: oPIN, iPIN, hPIN, lPIN, rPIN
        if name.len() > 1 && value.is_none() {
            let (letter, digits) = name.split_at(1);
            if let Ok(pin) = digits.parse::<u8>() {
                match letter {
                    "o" => return Ok(Self::SetPinOutput(pin)),
                    "i" => return Ok(Self::SetPinInput(pin)),
                    "h" => return Ok(Self::SetPinHigh(pin)),
                    "l" => return Ok(Self::SetPinLow(pin)),
                    "r" => return Ok(Self::ReadPin(pin)),
                    _ => {}
                }
            }
        }

        Err(invalid())
    }
}

fn join_pair(name: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!("{name}={value}"),
        None => name.to_string(),
    }
}

/// A command plus its position in a flush group.
///
/// `chained` is true when more commands follow in the same group, so the
/// flush is deferred to the group's last command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedCommand {
    /// The parsed command.
    pub command: Command,
    /// More commands follow in the same flush group.
    pub chained: bool,
}

/// Parse a command script from whitespace-split tokens.
///
/// Within a token, `,` joins commands into one flush group and `=`
/// separates a name from its value.
pub fn parse_script<I>(tokens: I) -> Result<Vec<ScriptedCommand>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut script = Vec::new();
    for token in tokens {
        let pieces: Vec<&str> = token.as_ref().split(',').collect();
        for (i, piece) in pieces.iter().enumerate() {
            let (name, value) = match piece.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (*piece, None),
            };
            script.push(ScriptedCommand {
                command: Command::parse(name, value)?,
                chained: i + 1 < pieces.len(),
            });
        }
    }
    Ok(script)
}

/// Executes parsed commands against a pin state and device.
///
/// Remembers when the first command ran, which anchors
/// [`Command::DelayUntil`].
#[derive(Debug, Default)]
pub struct CommandRunner {
    started: Option<Instant>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute one command, printing read results to `out`.
    ///
    /// Flushing is the caller's business; [`run`](Self::run) handles it
    /// per flush group.
    pub fn run_one<C: Channel, W: Write>(
        &mut self,
        bb: &mut BitbangContext,
        dev: &mut C,
        out: &mut W,
        command: Command,
    ) -> Result<()> {
        let started = *self.started.get_or_insert_with(Instant::now);

        match command {
            Command::SetDirections(dirs) => bb.set_directions(dirs),
            Command::SetPinOutput(pin) => bb.set_direction(pin, true)?,
            Command::SetPinInput(pin) => bb.set_direction(pin, false)?,
            Command::WriteValues(values) => bb.set_pins(values),
            Command::SetPinHigh(pin) => {
                bb.set_direction(pin, true)?;
                bb.set_pin(pin, true)?;
            }
            Command::SetPinLow(pin) => {
                bb.set_direction(pin, true)?;
                bb.set_pin(pin, false)?;
            }
            Command::ReadHex => {
                let pins = bb.read(dev)?;
                match bb.mode() {
                    PinMode::Bitbang => writeln!(out, "{:02x}", pins as u8)?,
                    PinMode::Mpsse => writeln!(out, "{pins:04x}")?,
                }
            }
            Command::ReadDec => {
                let pins = bb.read(dev)?;
                writeln!(out, "{pins}")?;
            }
            Command::ReadBin => {
                let pins = bb.read(dev)?;
                match bb.mode() {
                    PinMode::Bitbang => writeln!(out, "{:08b}", pins as u8)?,
                    PinMode::Mpsse => writeln!(out, "{pins:016b}")?,
                }
            }
            Command::ReadPin(pin) => {
                let level = bb.read_pin(dev, pin)?;
                writeln!(out, "{}", u8::from(level))?;
            }
            Command::Delay(delay) => thread::sleep(delay),
            Command::DelayUntil(offset) => {
                let deadline = started + offset;
                while Instant::now() < deadline {
                    std::hint::spin_loop();
                }
            }
        }
        Ok(())
    }

    /// Execute a whole script in order, flushing after every command that
    /// does not chain into the next one. The first error aborts the rest
    /// of the script.
    pub fn run<C: Channel, W: Write>(
        &mut self,
        bb: &mut BitbangContext,
        dev: &mut C,
        out: &mut W,
        script: &[ScriptedCommand],
    ) -> Result<()> {
        for scripted in script {
            self.run_one(bb, dev, out, scripted.command)?;
            if !scripted.chained {
                bb.flush(dev)?;
            }
        }
        Ok(())
    }
}
