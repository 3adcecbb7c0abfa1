//! Event system for UI decoupling.
//!
//! Allows CLI/GUI front-ends to subscribe to update events without
//! tight coupling to the protocol logic.

use std::fmt;

/// Phases of an update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuPhase {
    /// Switching into bootloader mode.
    Detach,
    /// Negotiating session parameters.
    Handshake,
    /// Writing firmware blocks.
    Write,
    /// Sending the completion sentinel.
    Finish,
    /// All operations complete.
    Complete,
}

impl fmt::Display for DfuPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfuPhase::Detach => write!(f, "Detach"),
            DfuPhase::Handshake => write!(f, "Handshake"),
            DfuPhase::Write => write!(f, "Write"),
            DfuPhase::Finish => write!(f, "Finish"),
            DfuPhase::Complete => write!(f, "Complete"),
        }
    }
}

/// Events emitted during an update.
#[derive(Debug, Clone)]
pub enum DfuEvent {
    /// Phase changed.
    PhaseChanged { from: DfuPhase, to: DfuPhase },
    /// A section is about to be written.
    SectionStarted {
        index: usize,
        address: u32,
        size: usize,
        trimmed: usize,
    },
    /// Bytes written so far for the current operation.
    Progress {
        operation: String,
        current: u64,
        total: u64,
    },
    /// Raw packet sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// All operations completed successfully.
    Complete,
}

/// Packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving update events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait DfuObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DfuEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DfuObserver for NullObserver {
    fn on_event(&self, _event: &DfuEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DfuObserver for TracingObserver {
    fn on_event(&self, event: &DfuEvent) {
        match event {
            DfuEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            DfuEvent::SectionStarted {
                index,
                address,
                size,
                trimmed,
            } => {
                tracing::info!(
                    index,
                    address = %format!("{:#x}", address),
                    size,
                    trimmed,
                    "Writing section"
                );
            }
            DfuEvent::Progress {
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            DfuEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "USB Packet");
            }
            DfuEvent::Complete => {
                tracing::info!("Update complete");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Observer that keeps every event, for assertions in tests.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<DfuEvent>>,
    }

    impl DfuObserver for RecordingObserver {
        fn on_event(&self, event: &DfuEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
