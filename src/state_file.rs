//! Per-device pin state persistence.
//!
//! Pin manipulation often happens through short-lived processes, each setting
//! a pin or two and exiting. To make those runs accumulate into one coherent
//! hardware state, the pin state is written to a small per-device file under
//! the system temporary directory and reloaded on the next start.
//!
//! The file is keyed by [`DeviceIdentity`]: bus number, device address, hub
//! port chain, interface number, chip type and the invoking user, so the
//! same physical endpoint always resolves to the same path and two users do
//! not clobber each other's state.
//!
//! Loading is deliberately forgiving: a missing, truncated or malformed file
//! just means starting from defaults. Saving reports its error but callers
//! are expected to treat it as non-fatal; the in-memory state is never
//! rolled back.
//!
//! # Example
//!
//! ```no_run
//! use ftdi_bitbang::constants::{pid, FTDI_VID};
//! use ftdi_bitbang::{state_file, BitbangContext, FtdiDevice, PinMode};
//!
//! let mut dev = FtdiDevice::open(FTDI_VID, pid::FT232H)?;
//! let identity = state_file::DeviceIdentity::from_device(&dev);
//!
//! let mut bb = match state_file::load(&identity) {
//!     Some(saved) => {
//!         saved.enable(&mut dev)?;
//!         saved
//!     }
//!     None => BitbangContext::init(&mut dev, PinMode::Mpsse)?,
//! };
//!
//! bb.set_direction(3, true)?;
//! bb.set_pin(3, true)?;
//! bb.flush(&mut dev)?;
//!
//! state_file::save(&identity, &bb)?;
//! # Ok::<(), ftdi_bitbang::Error>(())
//! ```

use std::env;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use crate::bitbang::BitbangContext;
use crate::device::FtdiDevice;
use crate::error::Result;
use crate::types::ChipType;

/// Identity of one physical device endpoint, keying its state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    busnum: u8,
    device_address: u8,
    port_chain: Vec<u32>,
    interface: u8,
    chip_type: ChipType,
    user: String,
}

impl DeviceIdentity {
    /// Build an identity from raw topology values.
    ///
    /// The user component is taken from the environment (`USER`, then
    /// `USERNAME`, else `"default"`).
    pub fn new(
        busnum: u8,
        device_address: u8,
        port_chain: &[u32],
        interface: u8,
        chip_type: ChipType,
    ) -> Self {
        Self {
            busnum,
            device_address,
            port_chain: port_chain.to_vec(),
            interface,
            chip_type,
            user: current_user(),
        }
    }

    /// Build the identity of an opened device.
    pub fn from_device(dev: &FtdiDevice) -> Self {
        Self::new(
            dev.busnum(),
            dev.device_address(),
            dev.port_chain(),
            dev.interface_num(),
            dev.chip_type(),
        )
    }

    /// The state file path for this identity, under the system temporary
    /// directory.
    pub fn path(&self) -> PathBuf {
        env::temp_dir().join(self.file_name())
    }

    fn file_name(&self) -> String {
        let ports = if self.port_chain.is_empty() {
            "root".to_owned()
        } else {
            self.port_chain
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(".")
        };
        format!(
            "ftdi-bitbang-state-{:03}.{:03}-{}-i{}-{}-{}",
            self.busnum,
            self.device_address,
            ports,
            self.interface,
            self.chip_type.short_name(),
            self.user,
        )
    }
}

/// The invoking user's login name, reduced to filename-safe characters.
fn current_user() -> String {
    let name = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_default();
    let safe: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if safe.is_empty() {
        "default".to_owned()
    } else {
        safe
    }
}

/// Load the persisted pin state for a device, if a usable record exists.
///
/// Any problem (no file, wrong size, unknown mode byte, I/O error) yields
/// `None`; unexpected errors are logged and swallowed so a damaged cache
/// never blocks the device itself.
pub fn load(identity: &DeviceIdentity) -> Option<BitbangContext> {
    let path = identity.path();
    let record = match fs::read(&path) {
        Ok(record) => record,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            log::warn!("ignoring unreadable state file {}: {e}", path.display());
            return None;
        }
    };
    match BitbangContext::from_record(&record) {
        Some(state) => {
            log::debug!("loaded pin state from {}", path.display());
            Some(state)
        }
        None => {
            log::warn!("ignoring malformed state file {}", path.display());
            None
        }
    }
}

/// Persist the pin state for a device, replacing any previous record.
///
/// The file is created with mode 0600 on Unix. Errors are returned for the
/// caller to report; the in-memory state is unaffected either way.
pub fn save(identity: &DeviceIdentity, state: &BitbangContext) -> Result<()> {
    let path = identity.path();
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&path)?;
    file.write_all(&state.to_record())?;
    log::debug!("saved pin state to {}", path.display());
    Ok(())
}
