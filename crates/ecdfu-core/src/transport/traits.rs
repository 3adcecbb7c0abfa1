//! Transport layer abstraction.
//!
//! Defines the `BulkTransport` trait for the bulk update pipe and the
//! `FeatureReportTransport` trait for HID feature-report channels, allowing
//! different implementations (nusb, mock, etc.).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::constants::{BULK_RECV_TIMEOUT, BULK_SEND_TIMEOUT, FLUSH_TIMEOUT};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("No update interface found")]
    InterfaceNotFound,

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("wMaxPacketSize isn't valid: {0}")]
    InvalidPacketSize(usize),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Only received {actual}/{expected} bytes")]
    PartialRead { actual: usize, expected: usize },

    #[error("Flushing {0} bytes")]
    NotIdle(usize),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-direction timeouts of a bulk channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub send_ms: u64,
    pub recv_ms: u64,
    pub flush_ms: u64,
}

impl Timeouts {
    pub fn send(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }

    pub fn recv(&self) -> Duration {
        Duration::from_millis(self.recv_ms)
    }

    pub fn flush(&self) -> Duration {
        Duration::from_millis(self.flush_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            send_ms: BULK_SEND_TIMEOUT.as_millis() as u64,
            recv_ms: BULK_RECV_TIMEOUT.as_millis() as u64,
            flush_ms: FLUSH_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Abstract bulk pipe to the update interface.
///
/// Implementations own the claimed interface; dropping the transport
/// releases it.
pub trait BulkTransport: Send + Sync {
    /// Write all of `data` to the OUT endpoint as one transfer.
    fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max_len` bytes from the IN endpoint.
    ///
    /// Fewer bytes than `max_len` is a [`TransportError::PartialRead`]
    /// unless `allow_short` is set.
    fn read(&self, max_len: usize, allow_short: bool) -> Result<Vec<u8>, TransportError>;

    /// Discard stray bytes with a short read.
    ///
    /// Receiving anything means the channel was not idle and yields
    /// [`TransportError::NotIdle`]; a timeout means success.
    fn flush(&self) -> Result<(), TransportError>;

    /// Native packet size (wMaxPacketSize) of the endpoint.
    fn packet_size(&self) -> usize;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

/// Abstract HID feature-report channel.
pub trait FeatureReportTransport: Send + Sync {
    /// SET_FEATURE; `report[0]` is the report ID.
    fn set_feature(&self, report: &[u8]) -> Result<(), TransportError>;

    /// GET_FEATURE of `len` bytes for `report_id`, returned verbatim.
    fn get_feature(&self, report_id: u8, len: usize) -> Result<Vec<u8>, TransportError>;
}
