//! Updatable devices.
//!
//! [`Device`] is the capability interface front-ends drive; each protocol
//! provides one implementation over its own transport.

pub mod cros_ec;
pub mod elantp;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::events::{DfuObserver, TracingObserver};
use crate::firmware::{FirmwareContainer, SectionedImage};
use crate::protocol::constants::{ELAN_VENDOR_ID, GOOGLE_VENDOR_ID};
use crate::session::UpdateConfig;
use crate::state::DeviceMode;
use crate::transport::{NusbHidTransport, NusbTransport, ObservableTransport};

pub use cros_ec::CrosEcDevice;
pub use elantp::ElantpHidDevice;

/// Update protocol spoken by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// ChromeOS EC update over a USB bulk pipe.
    #[default]
    CrosEc,
    /// Elan touchpad IAP over HID feature reports.
    Elantp,
}

impl Protocol {
    pub fn default_vendor_id(&self) -> u16 {
        match self {
            Protocol::CrosEc => GOOGLE_VENDOR_ID,
            Protocol::Elantp => ELAN_VENDOR_ID,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::CrosEc => write!(f, "cros-ec"),
            Protocol::Elantp => write!(f, "elantp"),
        }
    }
}

/// Operations every updatable device supports.
pub trait Device {
    fn protocol(&self) -> Protocol;

    /// Query the device and learn its parameters.
    fn setup(&mut self) -> Result<()>;

    fn mode(&self) -> DeviceMode;

    /// Enter bootloader mode.
    fn detach(&mut self) -> Result<()>;

    /// Return to runtime mode.
    fn attach(&mut self) -> Result<()>;

    /// Let the device decide which sections it can take.
    fn prepare_firmware(&self, _firmware: &mut SectionedImage) -> Result<()> {
        Ok(())
    }

    fn write_firmware(
        &mut self,
        firmware: &dyn FirmwareContainer,
        observer: &dyn DfuObserver,
    ) -> Result<()>;

    /// Key/value summary of what the device reported.
    fn describe(&self) -> Vec<(&'static str, String)>;
}

/// Open the first matching device for `config.protocol`.
///
/// Bulk traffic is traced through [`TracingObserver`].
pub fn open(config: &UpdateConfig) -> Result<Box<dyn Device>> {
    let vid = config.vendor_id();
    info!(protocol = %config.protocol, vid = %format!("{:04X}", vid), "Opening device");
    let device: Box<dyn Device> = match config.protocol {
        Protocol::CrosEc => {
            let transport = NusbTransport::open(vid, config.product_id, config.timeouts)?;
            let transport = ObservableTransport::new(transport, Arc::new(TracingObserver));
            Box::new(CrosEcDevice::new(transport, config.clone()))
        }
        Protocol::Elantp => {
            let transport = NusbHidTransport::open(vid, config.product_id)?;
            Box::new(ElantpHidDevice::new(transport, config.clone()))
        }
    };
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names() {
        assert_eq!(Protocol::CrosEc.to_string(), "cros-ec");
        assert_eq!(Protocol::Elantp.default_vendor_id(), 0x04F3);
        assert_eq!(Protocol::default(), Protocol::CrosEc);
    }
}
