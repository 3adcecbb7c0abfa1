//! Frame structures for the bulk update protocol.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::{Cursor, Read};
use thiserror::Error;

use super::constants::{
    FIRST_RESPONSE_PDU_SIZE, LEGACY_START_RESPONSE_SIZE, MIN_START_RESPONSE_SIZE,
    UPDATE_DONE, UPDATE_FRAME_HEADER_SIZE, VERSION_STRING_LEN,
};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Update frame header (12 bytes).
///
/// Precedes every PDU sent to the device. The start request is a bare
/// header whose `block_size` equals the header size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateFrameHeader {
    /// Total frame size, including this header.
    pub block_size: u32,
    /// Four bytes of the block digest, or 0 where ignored.
    pub block_digest: u32,
    /// Flash address this block is written to.
    pub block_base: u32,
}

impl UpdateFrameHeader {
    pub const SIZE: usize = UPDATE_FRAME_HEADER_SIZE;

    /// Header of a block carrying `payload_size` bytes to `block_base`.
    pub fn for_block(block_base: u32, payload_size: usize) -> Self {
        Self {
            block_size: (Self::SIZE + payload_size) as u32,
            block_digest: 0,
            block_base,
        }
    }

    /// Header-only frame that opens an update session.
    pub fn start_request() -> Self {
        Self {
            block_size: Self::SIZE as u32,
            ..Default::default()
        }
    }

    /// Payload bytes announced by this header.
    pub fn payload_size(&self) -> usize {
        (self.block_size as usize).saturating_sub(Self::SIZE)
    }

    pub fn to_bytes(&self) -> [u8; UPDATE_FRAME_HEADER_SIZE] {
        let mut buf = [0u8; UPDATE_FRAME_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], self.block_size);
        BigEndian::write_u32(&mut buf[4..8], self.block_digest);
        BigEndian::write_u32(&mut buf[8..12], self.block_base);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            block_size: cursor.read_u32::<BigEndian>()?,
            block_digest: cursor.read_u32::<BigEndian>()?,
            block_base: cursor.read_u32::<BigEndian>()?,
        })
    }
}

/// New-style reply to the start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstResponsePdu {
    pub return_value: u32,
    pub header_type: u16,
    pub protocol_version: u16,
    pub maximum_pdu_size: u32,
    pub flash_protection: u32,
    /// Offset of the region that is not currently running.
    pub offset: u32,
    /// NUL-padded version string of that region.
    pub version: [u8; VERSION_STRING_LEN],
    /// Minimum rollback version RO will accept.
    pub min_rollback: i32,
    /// RO public key version.
    pub key_version: u32,
}

impl FirstResponsePdu {
    pub const SIZE: usize = FIRST_RESPONSE_PDU_SIZE;

    /// Parse a (possibly truncated) response; missing trailing fields read as zero.
    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        let mut full = [0u8; FIRST_RESPONSE_PDU_SIZE];
        let n = data.len().min(Self::SIZE);
        full[..n].copy_from_slice(&data[..n]);

        let mut cursor = Cursor::new(&full[..]);
        let return_value = cursor.read_u32::<BigEndian>()?;
        let header_type = cursor.read_u16::<BigEndian>()?;
        let protocol_version = cursor.read_u16::<BigEndian>()?;
        let maximum_pdu_size = cursor.read_u32::<BigEndian>()?;
        let flash_protection = cursor.read_u32::<BigEndian>()?;
        let offset = cursor.read_u32::<BigEndian>()?;
        let mut version = [0u8; VERSION_STRING_LEN];
        cursor.read_exact(&mut version)?;
        let min_rollback = cursor.read_i32::<BigEndian>()?;
        let key_version = cursor.read_u32::<BigEndian>()?;

        Ok(Self {
            return_value,
            header_type,
            protocol_version,
            maximum_pdu_size,
            flash_protection,
            offset,
            version,
            min_rollback,
            key_version,
        })
    }

    pub fn to_bytes(&self) -> [u8; FIRST_RESPONSE_PDU_SIZE] {
        let mut buf = [0u8; FIRST_RESPONSE_PDU_SIZE];
        BigEndian::write_u32(&mut buf[0..4], self.return_value);
        BigEndian::write_u16(&mut buf[4..6], self.header_type);
        BigEndian::write_u16(&mut buf[6..8], self.protocol_version);
        BigEndian::write_u32(&mut buf[8..12], self.maximum_pdu_size);
        BigEndian::write_u32(&mut buf[12..16], self.flash_protection);
        BigEndian::write_u32(&mut buf[16..20], self.offset);
        buf[20..52].copy_from_slice(&self.version);
        BigEndian::write_i32(&mut buf[52..56], self.min_rollback);
        BigEndian::write_u32(&mut buf[56..60], self.key_version);
        buf
    }

    /// Version string up to the first NUL.
    pub fn version_str(&self) -> String {
        let end = self
            .version
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.version.len());
        String::from_utf8_lossy(&self.version[..end]).into_owned()
    }
}

/// Reply to the start request, in whichever format the device used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartResponse {
    /// Old firmware answers with a bare response code.
    Legacy { response_code: u32 },
    Pdu(FirstResponsePdu),
}

impl StartResponse {
    /// Decode based on the number of bytes actually received.
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < LEGACY_START_RESPONSE_SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: LEGACY_START_RESPONSE_SIZE,
                actual: data.len(),
            });
        }
        if data.len() < MIN_START_RESPONSE_SIZE {
            return Ok(Self::Legacy {
                response_code: BigEndian::read_u32(&data[..LEGACY_START_RESPONSE_SIZE]),
            });
        }
        Ok(Self::Pdu(FirstResponsePdu::from_bytes(data)?))
    }
}

/// Completion sentinel frame.
pub fn done_frame() -> [u8; 4] {
    UPDATE_DONE.to_be_bytes()
}
