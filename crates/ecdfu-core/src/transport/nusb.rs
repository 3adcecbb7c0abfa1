//! nusb-based bulk transport to the EC update interface.

use nusb::transfer::{Bulk, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info, instrument, trace};

use super::traits::{BulkTransport, Timeouts, TransportError};
use crate::protocol::constants::{
    USB_CLASS_VENDOR_SPEC, USB_PROTOCOL_GOOGLE_UPDATE, USB_SUBCLASS_GOOGLE_UPDATE,
};

/// nusb-based bulk transport.
pub struct NusbTransport {
    interface: Interface,
    /// Endpoint number without the direction bit.
    ep_num: u8,
    /// wMaxPacketSize of the update endpoint.
    chunk_len: usize,
    timeouts: Timeouts,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open the first device from `vid` (and `pid`, if given) that exposes
    /// the update interface.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid)))]
    pub fn open(vid: u16, pid: Option<u16>, timeouts: Timeouts) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && pid.is_none_or(|p| d.product_id() == p))
            .ok_or(TransportError::DeviceNotFound {
                vid,
                pid: pid.unwrap_or(0),
            })?;

        Self::open_device_info(device_info, timeouts)
    }

    fn open_device_info(
        device_info: nusb::DeviceInfo,
        timeouts: Timeouts,
    ) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        // Locate the vendor-specific update interface and its endpoint
        let mut found: Option<(u8, u8, usize)> = None;
        for config in device.configurations() {
            for iface in config.interfaces() {
                for alt in iface.alt_settings() {
                    if alt.class() != USB_CLASS_VENDOR_SPEC
                        || alt.subclass() != USB_SUBCLASS_GOOGLE_UPDATE
                        || alt.protocol() != USB_PROTOCOL_GOOGLE_UPDATE
                    {
                        continue;
                    }
                    if let Some(ep) = alt.endpoints().next() {
                        found = Some((
                            alt.interface_number(),
                            ep.address() & 0x7F,
                            ep.max_packet_size(),
                        ));
                        break;
                    }
                }
            }
        }

        let (iface_idx, ep_num, chunk_len) = found.ok_or(TransportError::InterfaceNotFound)?;
        if chunk_len == 0 {
            return Err(TransportError::InvalidPacketSize(chunk_len));
        }

        let interface = device
            .detach_and_claim_interface(iface_idx)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: iface_idx,
                message: e.to_string(),
            })?;

        info!(
            interface = iface_idx,
            ep = %format!("0x{:02X}", ep_num),
            chunk_len,
            "Update interface claimed"
        );

        Ok(Self {
            interface,
            ep_num,
            chunk_len,
            timeouts,
            vid,
            pid,
        })
    }

    fn read_with_timeout(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, In>(self.ep_num | 0x80)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut reader = ep.reader(4096).with_read_timeout(timeout);
        let mut buf = vec![0u8; max_len];

        let n = reader.read(&mut buf).map_err(|e| map_io_error(e, timeout))?;
        buf.truncate(n);
        Ok(buf)
    }
}

fn map_io_error(e: io::Error, timeout: Duration) -> TransportError {
    if e.kind() == io::ErrorKind::TimedOut {
        TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        TransportError::Io(e)
    }
}

impl BulkTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(self.ep_num)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let timeout = self.timeouts.send();
        let mut writer = ep.writer(4096).with_write_timeout(timeout);
        writer
            .write_all(data)
            .map_err(|e| map_io_error(e, timeout))?;
        writer.flush().map_err(|e| map_io_error(e, timeout))?;

        trace!(bytes = ?data, "Write complete");
        Ok(())
    }

    #[instrument(skip(self))]
    fn read(&self, max_len: usize, allow_short: bool) -> Result<Vec<u8>, TransportError> {
        let buf = self.read_with_timeout(max_len, self.timeouts.recv())?;
        if buf.len() != max_len && !allow_short {
            return Err(TransportError::PartialRead {
                actual: buf.len(),
                expected: max_len,
            });
        }
        debug!(bytes_read = buf.len(), "Read complete");
        Ok(buf)
    }

    fn flush(&self) -> Result<(), TransportError> {
        match self.read_with_timeout(self.chunk_len, self.timeouts.flush()) {
            Ok(stray) => {
                debug!("flushing {} bytes", stray.len());
                Err(TransportError::NotIdle(stray.len()))
            }
            Err(TransportError::Timeout { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn packet_size(&self) -> usize {
        self.chunk_len
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
