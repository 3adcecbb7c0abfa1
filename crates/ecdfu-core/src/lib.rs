//! ecdfu-core: firmware update engine for embedded controllers.
//!
//! Pushes firmware sections onto a microcontroller over a USB bulk pipe
//! (ChromeOS EC update protocol) or over HID feature reports (Elan touchpad
//! IAP), coping with short transfers, stale bytes on the pipe and devices
//! that silently reject bad requests.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, frame header and status structures
//! - **Transport**: Bulk and feature-report channels (nusb, mock)
//! - **State**: Handshake, block transfer, section iteration, mode control
//! - **Device**: Per-protocol implementations of the [`Device`] trait
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: Negotiated parameters and update configuration
//!
//! # Example
//!
//! ```no_run
//! use ecdfu_core::{SectionedImage, TracingObserver, UpdateConfig, device};
//!
//! let config = UpdateConfig::default();
//! let mut dev = device::open(&config)?;
//! dev.setup()?;
//!
//! let firmware = SectionedImage::from_specs(&["0x40000:ec.RW.bin"])?;
//! dev.write_firmware(&firmware, &TracingObserver)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod events;
pub mod firmware;
pub mod payload;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod state;
pub mod transport;
pub mod version;

// Re-exports for convenience
pub use device::{CrosEcDevice, Device, ElantpHidDevice, Protocol};
pub use error::{DfuError, ErrorKind, Result};
pub use events::{DfuEvent, DfuObserver, DfuPhase, NullObserver, TracingObserver};
pub use firmware::{FirmwareContainer, Section, SectionStatus, SectionedImage};
pub use retry::{RetryPolicy, retry};
pub use session::{Session, UpdateConfig};
pub use state::DeviceMode;
pub use transport::{
    BulkTransport, FeatureReportTransport, MockFeatureTransport, MockTransport, NusbHidTransport,
    NusbTransport, TransportError,
};
pub use version::{CrosEcVersionDecoder, FirmwareVersion, VersionDecoder};
