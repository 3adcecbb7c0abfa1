//! Mode controller: moves a device between runtime and bootloader mode.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{DfuError, Result};

/// Settle time after the reset command when entering the bootloader.
pub const DETACH_RESET_SETTLE: Duration = Duration::from_millis(30);
/// Settle time after the unlock command.
pub const DETACH_UNLOCK_SETTLE: Duration = Duration::from_millis(100);
/// Settle time between commands when returning to runtime.
pub const ATTACH_SETTLE: Duration = Duration::from_micros(300);

/// Which firmware the device is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Runtime,
    Bootloader,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Runtime => write!(f, "runtime"),
            DeviceMode::Bootloader => write!(f, "bootloader"),
        }
    }
}

/// Mode flags read back from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFlags {
    pub raw: u16,
    pub mode: DeviceMode,
    /// The unlock command was accepted.
    pub unlocked: bool,
}

/// Primitive commands a device needs for mode transitions.
pub trait ModeCommands {
    /// Mode as of the last query.
    fn current_mode(&self) -> DeviceMode;

    /// Re-read the mode flags and remember the result.
    fn query_mode(&mut self) -> Result<ModeFlags>;

    fn reset(&mut self) -> Result<()>;

    fn unlock(&mut self) -> Result<()>;

    fn enable_report(&mut self) -> Result<()>;

    fn switch_to_runtime(&mut self) -> Result<()>;
}

/// Enter bootloader mode; nothing is sent if the device is already there.
pub fn detach<M: ModeCommands + ?Sized>(device: &mut M) -> Result<()> {
    if device.current_mode() == DeviceMode::Bootloader {
        debug!("already in bootloader mode, skipping");
        return Ok(());
    }

    info!("Resetting into bootloader");
    device.reset()?;
    thread::sleep(DETACH_RESET_SETTLE);
    device.unlock()?;
    thread::sleep(DETACH_UNLOCK_SETTLE);

    let flags = device.query_mode()?;
    if !flags.unlocked {
        return Err(DfuError::UnlockFailed(flags.raw));
    }
    Ok(())
}

/// Return to runtime mode; nothing is sent if the device is already there.
pub fn attach<M: ModeCommands + ?Sized>(device: &mut M) -> Result<()> {
    if device.current_mode() == DeviceMode::Runtime {
        debug!("already in runtime mode, skipping");
        return Ok(());
    }

    info!("Resetting into runtime");
    device.reset()?;
    thread::sleep(ATTACH_SETTLE);
    device.enable_report()?;
    thread::sleep(ATTACH_SETTLE);
    device.switch_to_runtime()?;

    let flags = device.query_mode()?;
    debug!(mode = %flags.mode, raw = %format!("{:#06x}", flags.raw), "Mode after attach");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records commands and answers queries from a script.
    struct FakeDevice {
        mode: DeviceMode,
        unlock_accepted: bool,
        commands: Vec<&'static str>,
    }

    impl FakeDevice {
        fn new(mode: DeviceMode) -> Self {
            Self {
                mode,
                unlock_accepted: true,
                commands: Vec::new(),
            }
        }
    }

    impl ModeCommands for FakeDevice {
        fn current_mode(&self) -> DeviceMode {
            self.mode
        }

        fn query_mode(&mut self) -> Result<ModeFlags> {
            self.commands.push("query");
            Ok(ModeFlags {
                raw: if self.unlock_accepted { 0x80 } else { 0 },
                mode: self.mode,
                unlocked: self.unlock_accepted,
            })
        }

        fn reset(&mut self) -> Result<()> {
            self.commands.push("reset");
            Ok(())
        }

        fn unlock(&mut self) -> Result<()> {
            self.commands.push("unlock");
            self.mode = DeviceMode::Bootloader;
            Ok(())
        }

        fn enable_report(&mut self) -> Result<()> {
            self.commands.push("enable_report");
            Ok(())
        }

        fn switch_to_runtime(&mut self) -> Result<()> {
            self.commands.push("switch");
            self.mode = DeviceMode::Runtime;
            Ok(())
        }
    }

    #[test]
    fn test_detach_sequence() {
        let mut dev = FakeDevice::new(DeviceMode::Runtime);
        detach(&mut dev).unwrap();
        assert_eq!(dev.commands, vec!["reset", "unlock", "query"]);
    }

    #[test]
    fn test_detach_unlock_rejected() {
        let mut dev = FakeDevice::new(DeviceMode::Runtime);
        dev.unlock_accepted = false;
        assert!(matches!(detach(&mut dev), Err(DfuError::UnlockFailed(0))));
    }

    #[test]
    fn test_attach_sequence() {
        let mut dev = FakeDevice::new(DeviceMode::Bootloader);
        attach(&mut dev).unwrap();
        assert_eq!(dev.commands, vec!["reset", "enable_report", "switch", "query"]);
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let mut dev = FakeDevice::new(DeviceMode::Bootloader);
        detach(&mut dev).unwrap();
        assert!(dev.commands.is_empty());

        let mut dev = FakeDevice::new(DeviceMode::Runtime);
        attach(&mut dev).unwrap();
        assert!(dev.commands.is_empty());
    }
}
