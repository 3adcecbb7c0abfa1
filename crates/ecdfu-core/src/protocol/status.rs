//! Block status reply parsing.
//!
//! After every block the device answers with a status word. Devices are
//! allowed to answer short, so the reply is zero-padded before decoding.

use std::fmt;

use super::constants::BLOCK_REPLY_SIZE;

/// Status codes reported by the EC update firmware.
pub const UPDATE_SUCCESS: u32 = 0;
pub const UPDATE_BAD_ADDR: u32 = 1;
pub const UPDATE_ERASE_FAILURE: u32 = 2;
pub const UPDATE_DATA_ERROR: u32 = 3;
pub const UPDATE_WRITE_FAILURE: u32 = 4;
pub const UPDATE_VERIFY_ERROR: u32 = 5;
pub const UPDATE_GEN_ERROR: u32 = 6;
pub const UPDATE_MALLOC_ERROR: u32 = 7;
pub const UPDATE_ROLLBACK_ERROR: u32 = 8;
pub const UPDATE_RATE_LIMIT_ERROR: u32 = 9;
pub const UPDATE_RWSIG_BUSY: u32 = 10;

/// Parsed status reply for one block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlockStatus {
    value: u32,
    /// Number of bytes the device actually sent.
    len: u8,
}

impl BlockStatus {
    /// Decode a reply of up to four bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(BLOCK_REPLY_SIZE);
        let mut word = [0u8; BLOCK_REPLY_SIZE];
        word[..len].copy_from_slice(&bytes[..len]);
        Self {
            value: u32::from_be_bytes(word),
            len: len as u8,
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    /// The device sent nothing at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_success(&self) -> bool {
        !self.is_empty() && self.value == UPDATE_SUCCESS
    }

    /// Human-readable name of the status, when known.
    pub fn describe(&self) -> &'static str {
        // Single-byte replies carry the code in the top byte.
        let code = if self.len == 1 {
            self.value >> 24
        } else {
            self.value
        };
        match code {
            UPDATE_SUCCESS => "success",
            UPDATE_BAD_ADDR => "bad address",
            UPDATE_ERASE_FAILURE => "erase failure",
            UPDATE_DATA_ERROR => "data error",
            UPDATE_WRITE_FAILURE => "write failure",
            UPDATE_VERIFY_ERROR => "verify error",
            UPDATE_GEN_ERROR => "generic error",
            UPDATE_MALLOC_ERROR => "allocation failure",
            UPDATE_ROLLBACK_ERROR => "rollback rejected",
            UPDATE_RATE_LIMIT_ERROR => "rate limited",
            UPDATE_RWSIG_BUSY => "rwsig busy",
            _ => "unknown",
        }
    }
}

impl fmt::Debug for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockStatus({:#010X} '{}', {} bytes)",
            self.value,
            self.describe(),
            self.len
        )
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} ({})", self.value, self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_word() {
        let status = BlockStatus::from_bytes(&[0, 0, 0, 0]);
        assert!(status.is_success());
        assert_eq!(status.len(), 4);
    }

    #[test]
    fn test_empty_reply_is_not_success() {
        let status = BlockStatus::from_bytes(&[]);
        assert!(status.is_empty());
        assert!(!status.is_success());
        assert_eq!(status.value(), 0);
    }

    #[test]
    fn test_short_error_reply() {
        let status = BlockStatus::from_bytes(&[UPDATE_WRITE_FAILURE as u8]);
        assert!(!status.is_success());
        assert_eq!(status.len(), 1);
        assert_eq!(status.describe(), "write failure");
    }

    #[test]
    fn test_full_error_reply() {
        let status = BlockStatus::from_bytes(&UPDATE_ROLLBACK_ERROR.to_be_bytes());
        assert_eq!(status.value(), UPDATE_ROLLBACK_ERROR);
        assert_eq!(status.describe(), "rollback rejected");
    }
}
