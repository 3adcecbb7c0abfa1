//! Negotiated session parameters and update configuration.

use serde::{Deserialize, Serialize};

use crate::device::Protocol;
use crate::protocol::constants::{MAX_BLOCK_XFER_RETRIES, SETUP_RETRY_COUNT};
use crate::protocol::FirstResponsePdu;
use crate::retry::RetryPolicy;
use crate::transport::Timeouts;
use crate::version::FirmwareVersion;

/// Parameters the device reported when the update session was opened.
///
/// Only the handshake creates a `Session`; afterwards it is read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    protocol_version: u16,
    header_type: u16,
    max_pdu_size: u32,
    writable_offset: u32,
    flash_protection: u32,
    min_rollback: i32,
    key_version: u32,
    version: FirmwareVersion,
    raw_version: String,
}

impl Session {
    pub(crate) fn from_response(pdu: &FirstResponsePdu, version: FirmwareVersion) -> Self {
        Self {
            protocol_version: pdu.protocol_version,
            header_type: pdu.header_type,
            max_pdu_size: pdu.maximum_pdu_size,
            writable_offset: pdu.offset,
            flash_protection: pdu.flash_protection,
            min_rollback: pdu.min_rollback,
            key_version: pdu.key_version,
            version,
            raw_version: pdu.version_str(),
        }
    }

    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    pub fn header_type(&self) -> u16 {
        self.header_type
    }

    /// Upper bound on the payload of one block.
    pub fn max_pdu_size(&self) -> u32 {
        self.max_pdu_size
    }

    /// Flash below this offset cannot be rewritten in this session.
    pub fn writable_offset(&self) -> u32 {
        self.writable_offset
    }

    pub fn flash_protection(&self) -> u32 {
        self.flash_protection
    }

    pub fn min_rollback(&self) -> i32 {
        self.min_rollback
    }

    pub fn key_version(&self) -> u32 {
        self.key_version
    }

    pub fn version(&self) -> &FirmwareVersion {
        &self.version
    }

    pub fn raw_version(&self) -> &str {
        &self.raw_version
    }
}

/// Configuration for an update run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub protocol: Protocol,
    /// Vendor ID to open; the protocol's default vendor when unset.
    pub vendor_id: Option<u16>,
    /// Product ID to open; any product of the vendor when unset.
    pub product_id: Option<u16>,
    /// Attempts for each handshake step.
    pub setup_retries: u32,
    /// Attempts for each block.
    pub block_retries: u32,
    /// Pause between attempts.
    pub retry_delay_ms: u64,
    /// Skip trailing erased bytes of each section.
    pub trim_trailing: bool,
    /// Flash pages of the touchpad IC.
    pub ic_page_count: u16,
    /// Touchpad reports its IAP version at the newer register.
    pub new_iap_pattern: bool,
    pub timeouts: Timeouts,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            vendor_id: None,
            product_id: None,
            setup_retries: SETUP_RETRY_COUNT,
            block_retries: MAX_BLOCK_XFER_RETRIES,
            retry_delay_ms: 0,
            trim_trailing: true,
            ic_page_count: 0,
            new_iap_pattern: false,
            timeouts: Timeouts::default(),
        }
    }
}

impl UpdateConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: UpdateConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn setup_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.setup_retries, self.retry_delay_ms)
    }

    pub fn block_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.block_retries, self.retry_delay_ms)
    }

    /// Vendor ID to look for.
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
            .unwrap_or_else(|| self.protocol.default_vendor_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = UpdateConfig::default();
        assert_eq!(config.setup_policy().attempts, 5);
        assert_eq!(config.block_policy().attempts, 10);
        assert!(config.trim_trailing);
        assert_eq!(config.timeouts.flush_ms, 10);
        assert_eq!(config.vendor_id(), 0x18D1);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = UpdateConfig {
            protocol: Protocol::Elantp,
            product_id: Some(0x3022),
            ic_page_count: 0x400,
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("protocol = \"elantp\""));
        let parsed: UpdateConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.vendor_id(), 0x04F3);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: UpdateConfig = toml::from_str("block_retries = 3\n").unwrap();
        assert_eq!(parsed.block_retries, 3);
        assert_eq!(parsed.setup_retries, 5);
        assert_eq!(parsed.protocol, Protocol::CrosEc);
    }

    #[test]
    fn test_config_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("ecdfu-config-{}.toml", std::process::id()));
        let config = UpdateConfig {
            retry_delay_ms: 20,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = UpdateConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
