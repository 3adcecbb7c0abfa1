//! Protocol constants for the EC update protocol and the Elan IAP protocol.
//!
//! Bulk-pipe values follow the ChromeOS `usb_updater2` framing; feature-report
//! values follow the Elan touchpad I2C-HID register map.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// Google Inc. Vendor ID
pub const GOOGLE_VENDOR_ID: u16 = 0x18D1;

/// ELAN Microelectronics Vendor ID
pub const ELAN_VENDOR_ID: u16 = 0x04F3;

/// Vendor-specific interface class of the update interface.
pub const USB_CLASS_VENDOR_SPEC: u8 = 0xFF;
/// Google update interface subclass.
pub const USB_SUBCLASS_GOOGLE_UPDATE: u8 = 0x53;
/// Google update interface protocol.
pub const USB_PROTOCOL_GOOGLE_UPDATE: u8 = 0xFF;

/// HID interface class.
pub const USB_CLASS_HID: u8 = 0x03;

// ============================================================================
// Bulk Timeouts and Retry Bounds
// ============================================================================

pub const SETUP_RETRY_COUNT: u32 = 5;
pub const MAX_BLOCK_XFER_RETRIES: u32 = 10;

pub const FLUSH_TIMEOUT: Duration = Duration::from_millis(10);
pub const BULK_SEND_TIMEOUT: Duration = Duration::from_millis(2000);
pub const BULK_RECV_TIMEOUT: Duration = Duration::from_millis(5000);

// ============================================================================
// Frame Layout (Host <-> Device, big-endian)
// ============================================================================

/// Update frame header: block_size + block_digest + block_base.
pub const UPDATE_FRAME_HEADER_SIZE: usize = 12;

/// Length of the version string carried in the start response.
pub const VERSION_STRING_LEN: usize = 32;

/// Full new-style start response.
pub const FIRST_RESPONSE_PDU_SIZE: usize = 4 + 2 + 2 + 4 + 4 + 4 + VERSION_STRING_LEN + 4 + 4;

/// Anything shorter than this is not a usable start response.
pub const MIN_START_RESPONSE_SIZE: usize = 8;

/// Legacy start response: a single response code.
pub const LEGACY_START_RESPONSE_SIZE: usize = 4;

/// Block status reply.
pub const BLOCK_REPLY_SIZE: usize = 4;

/// Supported protocol versions (inclusive).
pub const MIN_PROTOCOL_VERSION: u16 = 5;
pub const MAX_PROTOCOL_VERSION: u16 = 6;

/// Completion sentinel sent after the last section.
pub const UPDATE_DONE: u32 = 0xB007AB1E; // 'BOOTABLE'

/// Value of erased flash; trailing runs of it are not transferred.
pub const ERASED_FILL: u8 = 0xFF;

// ============================================================================
// Elan IAP Registers (feature-report variant, little-endian)
// ============================================================================

/// Report ID for register commands.
pub const ETP_REPORT_ID_CMD: u8 = 0x0D;
/// Report ID for page writes.
pub const ETP_REPORT_ID_PAGE: u8 = 0x0B;

/// Bytes preceding the register payload in a GET_FEATURE reply.
pub const ETP_FEATURE_REPLY_PREFIX: usize = 3;

pub const ETP_I2C_FW_VERSION_CMD: u16 = 0x0102;
pub const ETP_I2C_IAP_VERSION_CMD: u16 = 0x0110;
pub const ETP_I2C_NEW_IAP_VERSION_CMD: u16 = 0x0111;
pub const ETP_I2C_OSM_VERSION_CMD: u16 = 0x0103;
pub const ETP_I2C_IAP_ICBODY_CMD: u16 = 0x0110;
pub const ETP_GET_MODULE_ID_CMD: u16 = 0x0101;
pub const ETP_GET_HARDWARE_ID_CMD: u16 = 0x0100;
pub const ETP_I2C_IAP_CTRL_CMD: u16 = 0x0310;
pub const ETP_I2C_IAP_CMD: u16 = 0x0311;
pub const ETP_I2C_IAP_RESET_CMD: u16 = 0x0314;
pub const ETP_I2C_IAP_CHECKSUM_CMD: u16 = 0x0315;
pub const ETP_I2C_SET_MODE_CMD: u16 = 0x0306;

pub const ETP_I2C_IAP_RESET: u16 = 0xF0F0;
pub const ETP_I2C_IAP_PASSWORD: u16 = 0x1EA5;
pub const ETP_I2C_ENABLE_REPORT: u16 = 0x0800;
/// Precision touchpad mode, selected when returning to runtime.
pub const ETP_I2C_PTP_MODE: u16 = 0x0003;

// IAP control word bits
pub const ETP_FW_IAP_INTF_ERR: u16 = 1 << 4;
pub const ETP_FW_IAP_PAGE_ERR: u16 = 1 << 5;
pub const ETP_FW_IAP_CHECK_PW: u16 = 1 << 7;
pub const ETP_FW_IAP_LAST_FIT: u16 = 1 << 9;

/// Word offset of the IAP start address inside the image.
pub const ETP_IAP_START_ADDR: usize = 0x0083;

/// Flash page size of the touchpad IC.
pub const ETP_FW_PAGE_SIZE: usize = 64;

/// Time the IC needs to program one page.
pub const ETP_PAGE_PROGRAM_DELAY: Duration = Duration::from_millis(35);
/// Time the IC needs to reboot after a verified write.
pub const ETP_RESET_DELAY: Duration = Duration::from_millis(1200);
