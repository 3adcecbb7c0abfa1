//! Elan touchpad updated through HID feature reports.
//!
//! Registers are read by sending a read command and fetching the answer
//! with GET_FEATURE; firmware goes out one 64-byte page per report, each
//! carrying its own checksum.

use std::thread;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{debug, info, instrument, trace};

use super::{Device, Protocol};
use crate::error::{DfuError, Result};
use crate::events::{DfuEvent, DfuObserver, DfuPhase};
use crate::firmware::FirmwareContainer;
use crate::payload::elan_checksum;
use crate::protocol::constants::*;
use crate::session::UpdateConfig;
use crate::state::{self, DeviceMode, ModeCommands, ModeFlags};
use crate::transport::FeatureReportTransport;

/// Waits of the page write loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElantpDelays {
    pub page_program: Duration,
    pub reset: Duration,
}

impl Default for ElantpDelays {
    fn default() -> Self {
        Self {
            page_program: ETP_PAGE_PROGRAM_DELAY,
            reset: ETP_RESET_DELAY,
        }
    }
}

/// Identification read during setup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElantpInfo {
    pub fw_version: u16,
    pub iap_version: u16,
    pub module_id: u16,
    pub hardware_id: u8,
    pub ic_type: u8,
}

impl ElantpInfo {
    /// Firmware version as shown to users.
    pub fn version(&self) -> String {
        format!("{:#06x}", self.fw_version)
    }

    pub fn bootloader_version(&self) -> String {
        format!("{:#06x}", self.iap_version)
    }
}

pub struct ElantpHidDevice<T: FeatureReportTransport> {
    transport: T,
    config: UpdateConfig,
    delays: ElantpDelays,
    iap_ctrl: u16,
    info: Option<ElantpInfo>,
}

impl<T: FeatureReportTransport> ElantpHidDevice<T> {
    pub fn new(transport: T, config: UpdateConfig) -> Self {
        Self {
            transport,
            config,
            delays: ElantpDelays::default(),
            // Runtime until the control word says otherwise
            iap_ctrl: ETP_FW_IAP_LAST_FIT,
            info: None,
        }
    }

    pub fn with_delays(mut self, delays: ElantpDelays) -> Self {
        self.delays = delays;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn info(&self) -> Option<&ElantpInfo> {
        self.info.as_ref()
    }

    pub fn iap_ctrl(&self) -> u16 {
        self.iap_ctrl
    }

    /// Bytes of flash the IC holds.
    pub fn firmware_size(&self) -> usize {
        self.config.ic_page_count as usize * ETP_FW_PAGE_SIZE
    }

    /// Read `len` bytes of register `reg`.
    fn read_cmd(&self, reg: u16, len: usize) -> Result<Vec<u8>> {
        let mut cmd = [ETP_REPORT_ID_CMD, 0x05, 0x03, 0, 0];
        LittleEndian::write_u16(&mut cmd[3..5], reg);
        trace!(cmd = ?cmd, "ReadCmd");
        self.transport.set_feature(&cmd)?;

        let reply = self
            .transport
            .get_feature(ETP_REPORT_ID_CMD, len + ETP_FEATURE_REPLY_PREFIX)?;
        if reply.len() < len + ETP_FEATURE_REPLY_PREFIX {
            return Err(DfuError::ResponseTooShort {
                actual: reply.len(),
                minimum: len + ETP_FEATURE_REPLY_PREFIX,
            });
        }
        Ok(reply[ETP_FEATURE_REPLY_PREFIX..ETP_FEATURE_REPLY_PREFIX + len].to_vec())
    }

    fn read_u16_le(&self, reg: u16) -> Result<u16> {
        Ok(LittleEndian::read_u16(&self.read_cmd(reg, 2)?))
    }

    fn read_u16_be(&self, reg: u16) -> Result<u16> {
        Ok(BigEndian::read_u16(&self.read_cmd(reg, 2)?))
    }

    fn write_cmd(&self, reg: u16, value: u16) -> Result<()> {
        let mut cmd = [ETP_REPORT_ID_CMD, 0, 0, 0, 0];
        LittleEndian::write_u16(&mut cmd[1..3], reg);
        LittleEndian::write_u16(&mut cmd[3..5], value);
        trace!(cmd = ?cmd, "WriteCmd");
        self.transport.set_feature(&cmd)?;
        Ok(())
    }

    /// Refresh the cached IAP control word.
    fn ensure_iap_ctrl(&mut self) -> Result<u16> {
        self.iap_ctrl = self.read_u16_le(ETP_I2C_IAP_CTRL_CMD)?;
        debug!(iap_ctrl = %format!("{:#06x}", self.iap_ctrl), mode = %self.current_mode(), "IAP control");
        Ok(self.iap_ctrl)
    }

    /// The image bytes to flash: the first needed section.
    fn select_image<'a>(&self, firmware: &'a dyn FirmwareContainer) -> Result<&'a [u8]> {
        let section = firmware
            .sections()
            .iter()
            .find(|s| s.is_needed())
            .ok_or(DfuError::NothingTransferred)?;
        let image = firmware
            .image_bytes(section.image_index)
            .ok_or(DfuError::MissingImage(section.image_index))?;
        if image.len() != section.size {
            return Err(DfuError::SizeMismatch {
                image: image.len(),
                section: section.size,
            });
        }
        Ok(image)
    }
}

/// Byte offset where programming starts, read from the image itself.
fn iap_start(image: &[u8]) -> Result<usize> {
    let at = ETP_IAP_START_ADDR * 2;
    if image.len() < at + 2 {
        return Err(DfuError::InvalidFirmware(format!(
            "image of {} bytes has no IAP start address",
            image.len()
        )));
    }
    // Stored in words
    let iap_addr = LittleEndian::read_u16(&image[at..at + 2]) as usize * 2;
    if iap_addr > image.len() {
        return Err(DfuError::InvalidFirmware(format!(
            "iap_addr invalid: {:#x}",
            iap_addr
        )));
    }
    Ok(iap_addr)
}

/// One page write report: ID, page bytes, then the page checksum.
fn page_report(page: &[u8], checksum: u16) -> Vec<u8> {
    let mut report = vec![0u8; ETP_FW_PAGE_SIZE + 3];
    report[0] = ETP_REPORT_ID_PAGE;
    report[1..1 + page.len()].copy_from_slice(page);
    LittleEndian::write_u16(&mut report[1 + page.len()..3 + page.len()], checksum);
    report
}

impl<T: FeatureReportTransport> ModeCommands for ElantpHidDevice<T> {
    /// Runtime firmware reports exactly LAST_FIT; any other word is IAP.
    fn current_mode(&self) -> DeviceMode {
        if self.iap_ctrl != ETP_FW_IAP_LAST_FIT {
            DeviceMode::Bootloader
        } else {
            DeviceMode::Runtime
        }
    }

    fn query_mode(&mut self) -> Result<ModeFlags> {
        let raw = self.ensure_iap_ctrl()?;
        Ok(ModeFlags {
            raw,
            mode: self.current_mode(),
            unlocked: raw & ETP_FW_IAP_CHECK_PW != 0,
        })
    }

    fn reset(&mut self) -> Result<()> {
        self.write_cmd(ETP_I2C_IAP_RESET_CMD, ETP_I2C_IAP_RESET)
    }

    fn unlock(&mut self) -> Result<()> {
        self.write_cmd(ETP_I2C_IAP_CMD, ETP_I2C_IAP_PASSWORD)
    }

    fn enable_report(&mut self) -> Result<()> {
        self.write_cmd(ETP_I2C_IAP_RESET_CMD, ETP_I2C_ENABLE_REPORT)
    }

    fn switch_to_runtime(&mut self) -> Result<()> {
        self.write_cmd(ETP_I2C_SET_MODE_CMD, ETP_I2C_PTP_MODE)
    }
}

impl<T: FeatureReportTransport> Device for ElantpHidDevice<T> {
    fn protocol(&self) -> Protocol {
        Protocol::Elantp
    }

    #[instrument(level = "info", skip(self))]
    fn setup(&mut self) -> Result<()> {
        let fw_version = self.read_u16_be(ETP_I2C_FW_VERSION_CMD)?;

        let iap_reg = if self.config.new_iap_pattern {
            ETP_I2C_NEW_IAP_VERSION_CMD
        } else {
            ETP_I2C_IAP_VERSION_CMD
        };
        let iap_version = self.read_u16_be(iap_reg)?;
        let module_id = self.read_u16_be(ETP_GET_MODULE_ID_CMD)?;
        let hardware_id = self.read_cmd(ETP_GET_HARDWARE_ID_CMD, 2)?[0];

        let osm = self.read_u16_le(ETP_I2C_OSM_VERSION_CMD)?;
        let ic_type = if osm == ETP_I2C_OSM_VERSION_CMD || osm == 0xFFFF {
            (self.read_u16_le(ETP_I2C_IAP_ICBODY_CMD)? & 0xFF) as u8
        } else {
            (osm >> 8) as u8
        };

        let info = ElantpInfo {
            fw_version,
            iap_version,
            module_id,
            hardware_id,
            ic_type,
        };
        info!(
            version = %info.version(),
            bootloader = %info.bootloader_version(),
            module = %format!("{:04X}", module_id),
            hw = %format!("{:02X}", hardware_id),
            ic_type = %format!("{:02X}", ic_type),
            firmware_size = self.firmware_size(),
            "Touchpad identified"
        );
        self.info = Some(info);

        self.ensure_iap_ctrl()?;
        Ok(())
    }

    fn mode(&self) -> DeviceMode {
        self.current_mode()
    }

    fn detach(&mut self) -> Result<()> {
        state::detach(self)
    }

    fn attach(&mut self) -> Result<()> {
        state::attach(self)
    }

    #[instrument(level = "info", skip_all)]
    fn write_firmware(
        &mut self,
        firmware: &dyn FirmwareContainer,
        observer: &dyn DfuObserver,
    ) -> Result<()> {
        let image = self.select_image(firmware)?;
        let iap_addr = iap_start(image)?;
        let pages: Vec<&[u8]> = image[iap_addr..].chunks(ETP_FW_PAGE_SIZE).collect();
        info!(
            iap_addr = %format!("{:#x}", iap_addr),
            pages = pages.len(),
            "Writing pages"
        );

        observer.on_event(&DfuEvent::PhaseChanged {
            from: DfuPhase::Detach,
            to: DfuPhase::Write,
        });

        let total = pages.len() as u64;
        let mut checksum: u16 = 0;
        for (i, page) in pages.iter().enumerate() {
            let page_sum = elan_checksum(page);
            self.transport.set_feature(&page_report(page, page_sum))?;
            thread::sleep(self.delays.page_program);

            let ctrl = self.ensure_iap_ctrl()?;
            if ctrl & (ETP_FW_IAP_PAGE_ERR | ETP_FW_IAP_INTF_ERR) != 0 {
                return Err(DfuError::IapWriteFailed(ctrl));
            }

            checksum = checksum.wrapping_add(page_sum);
            observer.on_event(&DfuEvent::Progress {
                operation: "page write".to_string(),
                current: i as u64 + 1,
                total,
            });
        }

        let device_sum = self.read_u16_le(ETP_I2C_IAP_CHECKSUM_CMD)?;
        if checksum != device_sum {
            return Err(DfuError::ChecksumMismatch {
                computed: checksum,
                device: device_sum,
            });
        }

        debug!("waiting for reset");
        thread::sleep(self.delays.reset);
        observer.on_event(&DfuEvent::Complete);
        Ok(())
    }

    fn describe(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("IapCtrl", format!("{:#x}", self.iap_ctrl)),
            ("IcPageCount", format!("{:#x}", self.config.ic_page_count)),
        ];
        if let Some(info) = &self.info {
            out.push(("Version", info.version()));
            out.push(("BootloaderVersion", info.bootloader_version()));
            out.push(("ModuleId", format!("{:04X}", info.module_id)));
            out.push(("HardwareId", format!("{:02X}", info.hardware_id)));
            out.push(("IcType", format!("{:02X}", info.ic_type)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::events::NullObserver;
    use crate::firmware::{SectionStatus, SectionedImage};
    use crate::transport::MockFeatureTransport;

    fn device(mock: MockFeatureTransport) -> ElantpHidDevice<MockFeatureTransport> {
        let config = UpdateConfig {
            protocol: Protocol::Elantp,
            ic_page_count: 0x200,
            ..Default::default()
        };
        ElantpHidDevice::new(mock, config).with_delays(ElantpDelays {
            page_program: Duration::ZERO,
            reset: Duration::ZERO,
        })
    }

    /// Image whose IAP start lies at byte 0x200 followed by `pages` pages.
    fn image(pages: usize) -> Vec<u8> {
        let mut data = vec![0u8; 0x200];
        LittleEndian::write_u16(&mut data[ETP_IAP_START_ADDR * 2..], 0x100);
        for p in 0..pages {
            data.extend((0..ETP_FW_PAGE_SIZE).map(|i| (p * 7 + i) as u8));
        }
        data
    }

    fn container(data: Vec<u8>) -> SectionedImage {
        let mut fw = SectionedImage::new();
        fw.add_section(0, data, SectionStatus::Needed);
        fw
    }

    #[test]
    fn test_setup_reads_identity() {
        let mock = MockFeatureTransport::new();
        mock.queue_register(&[0x00, 0x05]); // fw version, BE
        mock.queue_register(&[0x00, 0x01]); // IAP version
        mock.queue_register(&[0x12, 0x34]); // module id
        mock.queue_register(&[0x0A, 0x00]); // hardware id
        mock.queue_register_u16(0x0E01); // OSM version
        mock.queue_register_u16(ETP_FW_IAP_LAST_FIT);
        let mut dev = device(mock);

        dev.setup().unwrap();
        let info = dev.info().unwrap();
        assert_eq!(info.version(), "0x0005");
        assert_eq!(info.bootloader_version(), "0x0001");
        assert_eq!(info.module_id, 0x1234);
        assert_eq!(info.hardware_id, 0x0A);
        assert_eq!(info.ic_type, 0x0E);
        assert_eq!(dev.mode(), DeviceMode::Runtime);
        assert_eq!(dev.firmware_size(), 0x200 * 64);

        let reports = dev.transport().get_reports();
        assert_eq!(reports[0], vec![0x0D, 0x05, 0x03, 0x02, 0x01]);
        assert_eq!(reports[1], vec![0x0D, 0x05, 0x03, 0x10, 0x01]);
    }

    #[test]
    fn test_setup_ic_body_fallback() {
        let mock = MockFeatureTransport::new();
        for _ in 0..4 {
            mock.queue_register(&[0, 0]);
        }
        mock.queue_register_u16(0xFFFF); // OSM unreadable
        mock.queue_register_u16(0x0109); // IC body
        mock.queue_register_u16(0);
        let mut dev = device(mock);

        dev.setup().unwrap();
        assert_eq!(dev.info().unwrap().ic_type, 0x09);
        assert_eq!(dev.mode(), DeviceMode::Bootloader);
        assert_eq!(dev.transport().pending_registers(), 0);
    }

    #[test]
    fn test_write_pages_and_verify() {
        let data = image(2);
        let expected: u16 = data[0x200..]
            .chunks(64)
            .fold(0u16, |acc, p| acc.wrapping_add(elan_checksum(p)));

        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(0); // after page 1
        mock.queue_register_u16(0); // after page 2
        mock.queue_register_u16(expected);
        let mut dev = device(mock);

        dev.write_firmware(&container(data.clone()), &NullObserver)
            .unwrap();

        let reports = dev.transport().get_reports();
        let pages: Vec<_> = reports.iter().filter(|r| r[0] == 0x0B).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), 67);
        assert_eq!(&pages[0][1..65], &data[0x200..0x240]);
        let sum0 = elan_checksum(&data[0x200..0x240]);
        assert_eq!(&pages[0][65..67], &sum0.to_le_bytes());
    }

    #[test]
    fn test_short_last_page_is_padded() {
        let mut data = image(1);
        data.extend([0x5A; 10]);
        let tail_sum = elan_checksum(&[0x5A; 10]);
        let expected = elan_checksum(&data[0x200..0x240]).wrapping_add(tail_sum);

        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(0);
        mock.queue_register_u16(0);
        mock.queue_register_u16(expected);
        let mut dev = device(mock);

        dev.write_firmware(&container(data), &NullObserver).unwrap();

        let reports = dev.transport().get_reports();
        let last = reports.iter().filter(|r| r[0] == 0x0B).last().unwrap();
        assert_eq!(last.len(), 67);
        assert_eq!(&last[1..11], &[0x5A; 10]);
        assert_eq!(&last[11..13], &tail_sum.to_le_bytes());
        assert!(last[13..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_checksum_mismatch_fails() {
        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(0);
        mock.queue_register_u16(0xBEEF);
        let mut dev = device(mock);

        let err = dev
            .write_firmware(&container(image(1)), &NullObserver)
            .unwrap_err();
        assert!(matches!(err, DfuError::ChecksumMismatch { device: 0xBEEF, .. }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_page_error_stops_write() {
        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(ETP_FW_IAP_PAGE_ERR);
        let mut dev = device(mock);

        let err = dev
            .write_firmware(&container(image(3)), &NullObserver)
            .unwrap_err();
        assert!(matches!(err, DfuError::IapWriteFailed(ETP_FW_IAP_PAGE_ERR)));
        let pages = dev
            .transport()
            .get_reports()
            .iter()
            .filter(|r| r[0] == 0x0B)
            .count();
        assert_eq!(pages, 1);
    }

    #[test]
    fn test_invalid_iap_address() {
        let mut data = vec![0u8; 0x200];
        LittleEndian::write_u16(&mut data[ETP_IAP_START_ADDR * 2..], 0x4000);
        let mut dev = device(MockFeatureTransport::new());
        let err = dev
            .write_firmware(&container(data), &NullObserver)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(dev.transport().get_reports().is_empty());

        assert!(iap_start(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_no_needed_section() {
        let mut fw = SectionedImage::new();
        fw.add_section(0, image(1), SectionStatus::NotNeeded);
        let mut dev = device(MockFeatureTransport::new());
        let err = dev.write_firmware(&fw, &NullObserver).unwrap_err();
        assert!(matches!(err, DfuError::NothingTransferred));
    }

    #[test]
    fn test_detach_sequence() {
        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(ETP_FW_IAP_CHECK_PW);
        let mut dev = device(mock);
        assert_eq!(dev.mode(), DeviceMode::Runtime);

        dev.detach().unwrap();
        let reports = dev.transport().get_reports();
        assert_eq!(reports[0], vec![0x0D, 0x14, 0x03, 0xF0, 0xF0]);
        assert_eq!(reports[1], vec![0x0D, 0x11, 0x03, 0xA5, 0x1E]);
        assert_eq!(reports[2], vec![0x0D, 0x05, 0x03, 0x10, 0x03]);
        assert_eq!(dev.mode(), DeviceMode::Bootloader);
    }

    #[test]
    fn test_detach_without_password_flag() {
        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(0);
        let mut dev = device(mock);
        assert!(matches!(dev.detach(), Err(DfuError::UnlockFailed(0))));
    }

    #[test]
    fn test_attach_sequence() {
        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(0); // bootloader
        mock.queue_register_u16(ETP_FW_IAP_LAST_FIT);
        let mut dev = device(mock);
        dev.ensure_iap_ctrl().unwrap();
        dev.transport().clear_reports();

        dev.attach().unwrap();
        let reports = dev.transport().get_reports();
        assert_eq!(reports[0], vec![0x0D, 0x14, 0x03, 0xF0, 0xF0]);
        assert_eq!(reports[1], vec![0x0D, 0x14, 0x03, 0x00, 0x08]);
        assert_eq!(reports[2], vec![0x0D, 0x06, 0x03, 0x03, 0x00]);
        assert_eq!(dev.mode(), DeviceMode::Runtime);
    }

    #[test]
    fn test_last_fit_with_other_flags_is_bootloader() {
        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(ETP_FW_IAP_LAST_FIT | ETP_FW_IAP_CHECK_PW);
        mock.queue_register_u16(ETP_FW_IAP_LAST_FIT);
        let mut dev = device(mock);
        assert_eq!(dev.ensure_iap_ctrl().unwrap(), 0x0280);
        assert_eq!(dev.mode(), DeviceMode::Bootloader);
        dev.transport().clear_reports();

        dev.attach().unwrap();
        let reports = dev.transport().get_reports();
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0], vec![0x0D, 0x14, 0x03, 0xF0, 0xF0]);
        assert_eq!(dev.mode(), DeviceMode::Runtime);
    }

    #[test]
    fn test_mode_transitions_skip_when_already_there() {
        let mut dev = device(MockFeatureTransport::new());
        dev.attach().unwrap();
        assert!(dev.transport().get_reports().is_empty());

        let mock = MockFeatureTransport::new();
        mock.queue_register_u16(0);
        let mut dev = device(mock);
        dev.ensure_iap_ctrl().unwrap();
        dev.transport().clear_reports();
        dev.detach().unwrap();
        assert!(dev.transport().get_reports().is_empty());
    }
}
