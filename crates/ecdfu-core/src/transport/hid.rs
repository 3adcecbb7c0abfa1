//! HID feature-report transport over nusb control transfers.
//!
//! SET_REPORT / GET_REPORT with the feature report type are issued as
//! class requests to the claimed HID interface, which is what the kernel's
//! hidraw `HIDIOCSFEATURE` / `HIDIOCGFEATURE` do underneath.

use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{info, instrument, trace};

use super::traits::{FeatureReportTransport, TransportError};
use crate::protocol::constants::USB_CLASS_HID;

const HID_GET_REPORT: u8 = 0x01;
const HID_SET_REPORT: u8 = 0x09;
const HID_REPORT_TYPE_FEATURE: u16 = 0x03;

const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Feature-report channel to a HID interface.
pub struct NusbHidTransport {
    interface: Interface,
    interface_number: u8,
}

impl NusbHidTransport {
    /// Open the first HID interface of the matching device.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid)))]
    pub fn open(vid: u16, pid: Option<u16>) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && pid.is_none_or(|p| d.product_id() == p))
            .ok_or(TransportError::DeviceNotFound {
                vid,
                pid: pid.unwrap_or(0),
            })?;

        let interface_number = device_info
            .interfaces()
            .find(|i| i.class() == USB_CLASS_HID)
            .map(|i| i.interface_number())
            .ok_or(TransportError::InterfaceNotFound)?;

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device
            .detach_and_claim_interface(interface_number)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: interface_number,
                message: e.to_string(),
            })?;

        info!(
            vendor_id = %format!("{:04X}", device_info.vendor_id()),
            product_id = %format!("{:04X}", device_info.product_id()),
            interface = interface_number,
            "HID interface claimed"
        );

        Ok(Self {
            interface,
            interface_number,
        })
    }

    fn report_value(report_id: u8) -> u16 {
        (HID_REPORT_TYPE_FEATURE << 8) | report_id as u16
    }
}

impl FeatureReportTransport for NusbHidTransport {
    fn set_feature(&self, report: &[u8]) -> Result<(), TransportError> {
        let report_id = report.first().copied().unwrap_or(0);
        trace!(report = ?report, "SetFeature");
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: HID_SET_REPORT,
                    value: Self::report_value(report_id),
                    index: self.interface_number as u16,
                    data: report,
                },
                CONTROL_TIMEOUT,
            )
            .wait()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    fn get_feature(&self, report_id: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: HID_GET_REPORT,
                    value: Self::report_value(report_id),
                    index: self.interface_number as u16,
                    length: len as u16,
                },
                CONTROL_TIMEOUT,
            )
            .wait()
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        trace!(report = ?data, "GetFeature");
        Ok(data)
    }
}
