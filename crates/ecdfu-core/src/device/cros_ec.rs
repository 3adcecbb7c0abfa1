//! ChromeOS EC device updated over the USB bulk pipe.

use tracing::{debug, info, instrument};

use super::{Device, Protocol};
use crate::error::{DfuError, Result};
use crate::events::{DfuEvent, DfuObserver, DfuPhase};
use crate::firmware::{FirmwareContainer, SectionedImage};
use crate::session::{Session, UpdateConfig};
use crate::state::{DeviceMode, TransferOptions, negotiate, write_sections};
use crate::transport::BulkTransport;
use crate::version::{CrosEcVersionDecoder, VersionDecoder};

pub struct CrosEcDevice<T: BulkTransport> {
    transport: T,
    config: UpdateConfig,
    decoder: Box<dyn VersionDecoder>,
    session: Option<Session>,
}

impl<T: BulkTransport> CrosEcDevice<T> {
    pub fn new(transport: T, config: UpdateConfig) -> Self {
        Self {
            transport,
            config,
            decoder: Box::new(CrosEcVersionDecoder),
            session: None,
        }
    }

    /// Use a different decoder for the reported version string.
    pub fn with_decoder(mut self, decoder: impl VersionDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Negotiated parameters, once `setup` succeeded.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn options(&self) -> TransferOptions {
        TransferOptions {
            block_policy: self.config.block_policy(),
            trim_trailing: self.config.trim_trailing,
        }
    }
}

impl<T: BulkTransport> Device for CrosEcDevice<T> {
    fn protocol(&self) -> Protocol {
        Protocol::CrosEc
    }

    #[instrument(level = "info", skip(self), fields(
        vid = %format!("{:04X}", self.transport.vendor_id()),
        pid = %format!("{:04X}", self.transport.product_id())
    ))]
    fn setup(&mut self) -> Result<()> {
        self.session = None;
        let session = negotiate(&self.transport, self.decoder.as_ref(), &self.config)?;
        info!(version = %session.version().triplet, "Device ready");
        self.session = Some(session);
        Ok(())
    }

    fn mode(&self) -> DeviceMode {
        // The update interface only exists while the EC accepts updates
        DeviceMode::Bootloader
    }

    fn detach(&mut self) -> Result<()> {
        debug!("update interface is always in update mode, skipping");
        Ok(())
    }

    fn attach(&mut self) -> Result<()> {
        debug!("update interface is always in update mode, skipping");
        Ok(())
    }

    fn prepare_firmware(&self, firmware: &mut SectionedImage) -> Result<()> {
        let session = self.session.as_ref().ok_or(DfuError::NotEstablished)?;
        firmware.pick_sections(session.writable_offset())?;
        Ok(())
    }

    fn write_firmware(
        &mut self,
        firmware: &dyn FirmwareContainer,
        observer: &dyn DfuObserver,
    ) -> Result<()> {
        let session = self.session.as_ref().ok_or(DfuError::NotEstablished)?;
        write_sections(&self.transport, session, firmware, self.options(), observer)?;
        observer.on_event(&DfuEvent::PhaseChanged {
            from: DfuPhase::Finish,
            to: DfuPhase::Complete,
        });
        observer.on_event(&DfuEvent::Complete);
        Ok(())
    }

    fn describe(&self) -> Vec<(&'static str, String)> {
        let Some(s) = &self.session else {
            return vec![("Protocol", self.protocol().to_string())];
        };
        vec![
            ("GitHash", s.version().hash.clone()),
            ("Dirty", s.version().dirty.to_string()),
            ("ProtocolVersion", s.protocol_version().to_string()),
            ("HeaderType", s.header_type().to_string()),
            ("MaxPDUSize", s.max_pdu_size().to_string()),
            ("FlashProtectionStatus", format!("{:#x}", s.flash_protection())),
            ("RawVersion", s.raw_version().to_string()),
            ("KeyVersion", s.key_version().to_string()),
            ("MinRollback", s.min_rollback().to_string()),
            ("WriteableOffset", format!("{:#x}", s.writable_offset())),
        ]
    }
}
