//! Block transfer engine for the bulk pipe.

use tracing::{debug, trace};

use crate::error::{DfuError, Result};
use crate::events::{DfuEvent, DfuObserver};
use crate::firmware::{FirmwareContainer, Section};
use crate::payload::{BlockInfo, BlockIterator, trim_trailing};
use crate::protocol::constants::BLOCK_REPLY_SIZE;
use crate::protocol::{BlockStatus, UpdateFrameHeader};
use crate::retry::{RetryPolicy, retry};
use crate::session::Session;
use crate::transport::{BulkTransport, TransportError};

/// Section write settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub block_policy: RetryPolicy,
    pub trim_trailing: bool,
}

/// Send one block: header, payload in packet-sized pieces, then await the
/// status reply.
pub fn transfer_block<T: BulkTransport + ?Sized>(
    transport: &T,
    payload: &[u8],
    block: &BlockInfo,
) -> Result<()> {
    let end = block.offset + block.len;
    if end > payload.len() {
        return Err(DfuError::OutOfBounds {
            offset: block.offset,
            len: block.len,
            image: payload.len(),
        });
    }
    let chunk_len = transport.packet_size();
    if chunk_len == 0 {
        return Err(TransportError::InvalidPacketSize(chunk_len).into());
    }

    let header = UpdateFrameHeader::for_block(block.address, block.len);
    transport.write(&header.to_bytes())?;

    for chunk in payload[block.offset..end].chunks(chunk_len) {
        transport.write(chunk)?;
    }

    let reply = transport.read(BLOCK_REPLY_SIZE, true)?;
    let status = BlockStatus::from_bytes(&reply);
    trace!(address = %format!("{:#x}", block.address), status = %status, "Block reply");
    if status.is_empty() {
        return Err(DfuError::EmptyReply);
    }
    if !status.is_success() {
        return Err(DfuError::BlockStatus(status));
    }
    Ok(())
}

/// Write one section, block by block. Returns the number of payload bytes
/// sent.
pub fn transfer_section<T, C>(
    transport: &T,
    session: &Session,
    firmware: &C,
    index: usize,
    section: &Section,
    options: TransferOptions,
    observer: &dyn DfuObserver,
) -> Result<usize>
where
    T: BulkTransport + ?Sized,
    C: FirmwareContainer + ?Sized,
{
    let image = firmware
        .image_bytes(section.image_index)
        .ok_or(DfuError::MissingImage(section.image_index))?;
    if image.len() != section.size {
        return Err(DfuError::SizeMismatch {
            image: image.len(),
            section: section.size,
        });
    }

    let payload = if options.trim_trailing {
        trim_trailing(image)
    } else {
        image
    };
    let trimmed = section.size - payload.len();
    debug!("trimmed {} trailing bytes", trimmed);

    if section.offset as u64 + payload.len() as u64 > u32::MAX as u64 + 1 {
        return Err(DfuError::AddressOverflow {
            base: section.offset,
            len: payload.len(),
        });
    }

    observer.on_event(&DfuEvent::SectionStarted {
        index,
        address: section.offset,
        size: section.size,
        trimmed,
    });
    debug!(
        "sending {:#x} bytes to {:#x}",
        payload.len(),
        section.offset
    );

    let blocks = BlockIterator::new(
        section.offset,
        payload.len(),
        session.max_pdu_size() as usize,
    );
    let total = payload.len() as u64;
    for block in blocks {
        let remaining = payload.len() - block.offset;
        retry(&mut (), "block transfer", options.block_policy, |_| {
            transfer_block(transport, payload, &block)
        })
        .map_err(|e| DfuError::BlockFailed {
            address: block.address,
            remaining,
            source: Box::new(e),
        })?;

        observer.on_event(&DfuEvent::Progress {
            operation: format!("section {index}"),
            current: (block.offset + block.len) as u64,
            total,
        });
    }

    Ok(payload.len())
}
