//! Transport wrapper that emits packet events.

use std::sync::Arc;

use super::traits::{BulkTransport, TransportError};
use crate::events::{DfuEvent, DfuObserver, PacketDirection};

/// Bytes of each packet copied into the event.
const PACKET_PREVIEW_LEN: usize = 32;

/// Bulk transport that reports every successful transfer to an observer.
pub struct ObservableTransport<T: BulkTransport, O: DfuObserver> {
    inner: T,
    observer: Arc<O>,
}

impl<T: BulkTransport, O: DfuObserver> ObservableTransport<T, O> {
    pub fn new(inner: T, observer: Arc<O>) -> Self {
        Self { inner, observer }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn emit(&self, direction: PacketDirection, data: &[u8]) {
        self.observer.on_event(&DfuEvent::Packet {
            direction,
            length: data.len(),
            data: Some(data.iter().take(PACKET_PREVIEW_LEN).cloned().collect()),
        });
    }
}

impl<T: BulkTransport, O: DfuObserver> BulkTransport for ObservableTransport<T, O> {
    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let res = self.inner.write(data);
        if res.is_ok() {
            self.emit(PacketDirection::Tx, data);
        }
        res
    }

    fn read(&self, max_len: usize, allow_short: bool) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read(max_len, allow_short);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.emit(PacketDirection::Rx, data);
        }
        res
    }

    fn flush(&self) -> Result<(), TransportError> {
        self.inner.flush()
    }

    fn packet_size(&self) -> usize {
        self.inner.packet_size()
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::recording::RecordingObserver;
    use crate::transport::MockTransport;

    #[test]
    fn test_packets_are_reported() {
        let mock = MockTransport::new();
        mock.queue_reply(&[0, 0, 0, 0]);
        let observer = Arc::new(RecordingObserver::default());
        let transport = ObservableTransport::new(mock, observer.clone());

        transport.write(&[1, 2, 3]).unwrap();
        transport.read(4, true).unwrap();
        // A failed read emits nothing
        assert!(transport.read(4, true).is_err());

        let events = observer.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            DfuEvent::Packet {
                direction: PacketDirection::Tx,
                length: 3,
                ..
            }
        ));
        assert!(matches!(
            events[1],
            DfuEvent::Packet {
                direction: PacketDirection::Rx,
                length: 4,
                ..
            }
        ));
        assert_eq!(transport.inner().get_writes().len(), 1);
    }
}
