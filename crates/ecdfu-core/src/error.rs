//! Error types for update operations.

use thiserror::Error;

use crate::firmware::ContainerError;
use crate::protocol::BlockStatus;
use crate::transport::TransportError;
use crate::version::VersionError;

/// Result type for update operations.
pub type Result<T> = std::result::Result<T, DfuError>;

/// Broad classification of a failure, used to decide how it is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout or partial transfer on the channel.
    Transport,
    /// The device answered, but with something we cannot accept.
    Protocol,
    /// The firmware supplied by the caller is inconsistent.
    Data,
    /// Failure of an optional step; logged, never propagated.
    BestEffort,
}

#[derive(Error, Debug)]
pub enum DfuError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<DfuError>,
    },

    #[error("Unexpected response size {actual}, need at least {minimum}")]
    ResponseTooShort { actual: usize, minimum: usize },

    #[error("Unsupported protocol version {0}")]
    UnsupportedProtocol(u16),

    #[error("Target reporting error {0}")]
    TargetError(u32),

    #[error("Device reported maximum PDU size of 0")]
    InvalidPduSize,

    #[error("Failed parsing device's version {raw:?}: {source}")]
    Version {
        raw: String,
        #[source]
        source: VersionError,
    },

    #[error("Update session not established")]
    NotEstablished,

    #[error("Zero bytes received for block reply")]
    EmptyReply,

    #[error("Block status {0}")]
    BlockStatus(BlockStatus),

    #[error("Failed to transfer block at {address:#x}, {remaining} bytes to go: {source}")]
    BlockFailed {
        address: u32,
        remaining: usize,
        #[source]
        source: Box<DfuError>,
    },

    #[error("Checksum failed {computed:#06x} != {device:#06x}")]
    ChecksumMismatch { computed: u16, device: u16 },

    #[error("IAP reports failed write: {0:#x}")]
    IapWriteFailed(u16),

    #[error("Unexpected IAP password, control word {0:#06x}")]
    UnlockFailed(u16),

    #[error("Image and section sizes do not match: image = {image} bytes vs section size = {section} bytes")]
    SizeMismatch { image: usize, section: usize },

    #[error("Offset {offset} plus payload size {len} exceeds image size {image}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        image: usize,
    },

    #[error("Section at {base:#x} with {len} bytes overflows the address space")]
    AddressOverflow { base: u32, len: usize },

    #[error("Failed to find section image {0}")]
    MissingImage(usize),

    #[error("Invalid firmware: {0}")]
    InvalidFirmware(String),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("No sections transferred")]
    NothingTransferred,

    #[error("Completion signal failed: {0}")]
    CompletionSignal(TransportError),
}

impl DfuError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DfuError::Transport(_) => ErrorKind::Transport,
            DfuError::RetriesExhausted { source, .. } | DfuError::BlockFailed { source, .. } => {
                source.kind()
            }
            DfuError::ResponseTooShort { .. }
            | DfuError::UnsupportedProtocol(_)
            | DfuError::TargetError(_)
            | DfuError::InvalidPduSize
            | DfuError::Version { .. }
            | DfuError::NotEstablished
            | DfuError::EmptyReply
            | DfuError::BlockStatus(_)
            | DfuError::ChecksumMismatch { .. }
            | DfuError::IapWriteFailed(_)
            | DfuError::UnlockFailed(_) => ErrorKind::Protocol,
            DfuError::SizeMismatch { .. }
            | DfuError::OutOfBounds { .. }
            | DfuError::AddressOverflow { .. }
            | DfuError::MissingImage(_)
            | DfuError::InvalidFirmware(_)
            | DfuError::Container(_)
            | DfuError::NothingTransferred => ErrorKind::Data,
            DfuError::CompletionSignal(_) => ErrorKind::BestEffort,
        }
    }

    /// Innermost error, looking through retry and block wrappers.
    pub fn root(&self) -> &DfuError {
        match self {
            DfuError::RetriesExhausted { source, .. } | DfuError::BlockFailed { source, .. } => {
                source.root()
            }
            other => other,
        }
    }
}
