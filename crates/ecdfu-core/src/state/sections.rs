//! Section iteration and the completion sentinel.

use tracing::{debug, info, instrument, warn};

use super::block::{TransferOptions, transfer_section};
use crate::error::{DfuError, Result};
use crate::events::{DfuEvent, DfuObserver, DfuPhase};
use crate::firmware::FirmwareContainer;
use crate::protocol::header::done_frame;
use crate::session::Session;
use crate::transport::BulkTransport;

/// Write every needed section in container order, then signal completion.
///
/// Returns the number of sections transferred.
#[instrument(level = "info", skip_all)]
pub fn write_sections<T, C>(
    transport: &T,
    session: &Session,
    firmware: &C,
    options: TransferOptions,
    observer: &dyn DfuObserver,
) -> Result<usize>
where
    T: BulkTransport + ?Sized,
    C: FirmwareContainer + ?Sized,
{
    observer.on_event(&DfuEvent::PhaseChanged {
        from: DfuPhase::Handshake,
        to: DfuPhase::Write,
    });

    let mut transferred = 0;
    for (index, section) in firmware.sections().iter().enumerate() {
        if !section.is_needed() {
            debug!(index, status = %section.status, "Skipping section");
            continue;
        }
        transfer_section(transport, session, firmware, index, section, options, observer)?;
        transferred += 1;
    }

    observer.on_event(&DfuEvent::PhaseChanged {
        from: DfuPhase::Write,
        to: DfuPhase::Finish,
    });
    if let Err(e) = send_done(transport) {
        debug!(kind = ?e.kind(), "error on transfer of done: {}", e);
    }

    if transferred == 0 {
        warn!("No needed sections in firmware");
        return Err(DfuError::NothingTransferred);
    }

    info!(sections = transferred, "Sections written");
    Ok(transferred)
}

/// Send the completion sentinel; the one-byte reply is discarded.
pub fn send_done<T: BulkTransport + ?Sized>(transport: &T) -> Result<()> {
    transport
        .write(&done_frame())
        .map_err(DfuError::CompletionSignal)?;
    transport.read(1, false).map_err(DfuError::CompletionSignal)?;
    Ok(())
}
